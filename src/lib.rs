//! Agentese - semantic path routing and capability-aware dispatch
//!
//! Callers address capabilities by path (`world.house.manifest`) instead of
//! by endpoint. The crate parses the path, resolves it against a registry of
//! nodes, filters aspects by the observer's archetype and dispatches to the
//! handler, optionally through a composed pipeline, a state-dependent agent
//! or a JIT-specialized fast path.

pub mod affordance;
pub mod core;
pub mod dispatch;
pub mod jit;
pub mod node;
pub mod operad;
pub mod path;
pub mod poly;
pub mod registry;

pub use crate::core::config::{DispatchConfig, JitConfig};
pub use crate::core::error::{
    AffordanceDenied, CompositionError, CompositionLawViolation, DispatchError, HandlerError,
    InvocationError, ParseError, RegistryError, ResolutionError,
};
pub use crate::core::types::{Archetype, Arguments, Observer, Value};
pub use dispatch::{Discovery, Dispatcher};
pub use node::{AspectCategory, AspectMetadata, CallContext, Effect, Handler, Node, StaticNode};
pub use operad::{Composition, LawVerifier, Operad, Shape};
pub use path::{Context, Path};
pub use poly::PolyAgent;
pub use registry::NodeRegistry;
