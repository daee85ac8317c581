use std::sync::Arc;

use async_trait::async_trait;

use super::JitSignature;
use crate::node::Handler;

/// Produces a specialized handler for a hot signature
///
/// Implementations must only return handlers that are observationally
/// equivalent to `generic`. Returning `None` marks the signature as not
/// worth specializing.
#[async_trait]
pub trait Specializer: Send + Sync {
    async fn specialize(
        &self,
        signature: &JitSignature,
        generic: Arc<dyn Handler>,
    ) -> Option<Arc<dyn Handler>>;
}

/// Asks the handler for its own specialization
///
/// Handlers without one are pinned as-is, which still spares the dispatcher
/// the node's aspect lookup on every hit.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerSpecializer;

#[async_trait]
impl Specializer for HandlerSpecializer {
    async fn specialize(
        &self,
        signature: &JitSignature,
        generic: Arc<dyn Handler>,
    ) -> Option<Arc<dyn Handler>> {
        match generic.specialize() {
            Some(specialized) => {
                tracing::debug!(signature = %signature, "handler provided its own specialization");
                Some(specialized)
            }
            None => Some(generic),
        }
    }
}
