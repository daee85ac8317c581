//! The async handler seam every aspect, pipeline and agent implements

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::HandlerError;
use crate::core::types::{Observer, Value};
use crate::operad::Signature;
use crate::path::Path;

pub type HandlerResult = Result<Value, HandlerError>;

/// Per-call information handed to a handler
#[derive(Debug, Clone)]
pub struct CallContext {
    pub observer: Observer,
    /// The path being served, when invoked through the dispatcher
    pub path: Option<Path>,
    /// Segments past the matched node prefix
    pub subpath: Vec<String>,
}

impl CallContext {
    pub fn new(observer: Observer) -> Self {
        Self {
            observer,
            path: None,
            subpath: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: Path, subpath: Vec<String>) -> Self {
        self.path = Some(path);
        self.subpath = subpath;
        self
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(Observer::guest())
    }
}

/// Anything the dispatcher can invoke
///
/// Handlers may suspend on I/O; the dispatcher holds no lock across `call`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, cx: &CallContext, input: Value) -> HandlerResult;

    /// Shapes used to type-check compositions
    fn signature(&self) -> Signature {
        Signature::any()
    }

    /// An observationally equivalent, faster handler, if one exists
    fn specialize(&self) -> Option<Arc<dyn Handler>> {
        None
    }
}

/// Handler backed by an async closure
pub struct FnHandler<F, Fut> {
    f: F,
    signature: Signature,
    _future: PhantomData<fn() -> Fut>,
}

/// Wrap an async closure `(CallContext, Value) -> HandlerResult`
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(CallContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler {
        f,
        signature: Signature::any(),
        _future: PhantomData,
    }
}

impl<F, Fut> FnHandler<F, Fut> {
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F, Fut>
where
    F: Fn(CallContext, Value) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, cx: &CallContext, input: Value) -> HandlerResult {
        (self.f)(cx.clone(), input).await
    }

    fn signature(&self) -> Signature {
        self.signature.clone()
    }
}

/// Handler backed by a synchronous function of the input alone
pub struct PureFn<F> {
    f: F,
    signature: Signature,
}

pub fn pure_fn<F>(f: F) -> PureFn<F>
where
    F: Fn(Value) -> HandlerResult + Send + Sync,
{
    PureFn {
        f,
        signature: Signature::any(),
    }
}

impl<F> PureFn<F> {
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }
}

#[async_trait]
impl<F> Handler for PureFn<F>
where
    F: Fn(Value) -> HandlerResult + Send + Sync,
{
    async fn call(&self, _cx: &CallContext, input: Value) -> HandlerResult {
        (self.f)(input)
    }

    fn signature(&self) -> Signature {
        self.signature.clone()
    }
}
