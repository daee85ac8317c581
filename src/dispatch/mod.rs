//! Aspect dispatch: the single entry point collaborators call
//!
//! `invoke` parses the path, resolves the node, checks affordances and
//! required archetypes, then serves the call from the JIT cache or the
//! node's generic handler. Apart from JIT hit bookkeeping the dispatcher has
//! no side effects of its own; everything else happens inside handlers.

mod builtin;

use std::sync::Arc;

use serde::Serialize;

use crate::affordance::{AffordanceResolver, ArchetypeTable};
use crate::core::config::DispatchConfig;
use crate::core::error::{
    AffordanceDenied, DenialReason, DispatchError, InvocationError, ResolutionError, Result,
};
use crate::core::types::{Arguments, Observer, Value};
use crate::jit::{JitSignature, JitSpecializer, Observation, Specializer};
use crate::node::{CallContext, Node};
use crate::path::Path;
use crate::registry::{NodeRegistry, Resolved};
use builtin::{describe, Builtin};

/// One discovery result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discovery {
    pub path: String,
    pub affordances: Vec<String>,
}

struct DispatcherInner {
    registry: Arc<NodeRegistry>,
    affordances: AffordanceResolver,
    jit: JitSpecializer,
    config: DispatchConfig,
}

/// Cheaply cloneable handle to a registry, affordance table and JIT cache
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

pub struct DispatcherBuilder {
    registry: Arc<NodeRegistry>,
    config: DispatchConfig,
    table: ArchetypeTable,
    specializer: Option<Arc<dyn Specializer>>,
}

impl DispatcherBuilder {
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Additive archetype grant, see [`ArchetypeTable::grant`]
    pub fn grant<I, S>(mut self, archetype: impl Into<String>, aspects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table.grant(archetype, aspects);
        self
    }

    pub fn specializer(mut self, specializer: Arc<dyn Specializer>) -> Self {
        self.specializer = Some(specializer);
        self
    }

    pub fn build(self) -> Dispatcher {
        let jit = match self.specializer {
            Some(specializer) => JitSpecializer::with_specializer(self.config.jit.clone(), specializer),
            None => JitSpecializer::new(self.config.jit.clone()),
        };
        let affordances =
            AffordanceResolver::new(self.table, self.config.unrestricted_archetype.as_str());

        Dispatcher {
            inner: Arc::new(DispatcherInner {
                registry: self.registry,
                affordances,
                jit,
                config: self.config,
            }),
        }
    }
}

impl Dispatcher {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self::builder(registry).build()
    }

    pub fn builder(registry: Arc<NodeRegistry>) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            config: DispatchConfig::default(),
            table: ArchetypeTable::new(),
            specializer: None,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.inner.registry
    }

    pub fn jit(&self) -> &JitSpecializer {
        &self.inner.jit
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    pub fn affordance_resolver(&self) -> &AffordanceResolver {
        &self.inner.affordances
    }

    /// Affordances the observer may actually invoke on the node
    pub fn invocable(&self, node: &dyn Node, observer: &Observer) -> Vec<String> {
        self.inner
            .affordances
            .resolve(node, &observer.archetype)
            .into_iter()
            .filter(|aspect| {
                describe(node, aspect)
                    .map(|metadata| self.inner.affordances.permits(&metadata, observer))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Parse, resolve and dispatch a path string
    pub async fn invoke(&self, path: &str, observer: &Observer, args: Arguments) -> Result<Value> {
        let path = Path::parse(path)?;
        self.invoke_path(&path, observer, args).await
    }

    pub async fn invoke_path(
        &self,
        path: &Path,
        observer: &Observer,
        args: Arguments,
    ) -> Result<Value> {
        let resolved = self.inner.registry.resolve(path)?;
        self.dispatch(&resolved, path, observer, args).await
    }

    /// Dispatch an already-resolved node
    ///
    /// Path bracket parameters are merged into the arguments as defaults;
    /// explicit arguments win.
    pub async fn dispatch(
        &self,
        resolved: &Resolved,
        path: &Path,
        observer: &Observer,
        args: Arguments,
    ) -> Result<Value> {
        let node = resolved.node.as_ref();
        let aspect = path.aspect();

        let declared = node.metadata(aspect).cloned();
        let builtin = Builtin::select(aspect, declared.is_some());
        let metadata = match (builtin, declared) {
            (Some(builtin), _) => builtin.metadata(),
            (None, Some(metadata)) => metadata,
            (None, None) => {
                return Err(ResolutionError::UnknownAspect {
                    prefix: resolved.prefix.clone(),
                    aspect: aspect.to_string(),
                }
                .into());
            }
        };

        let visible = self.inner.affordances.resolve(node, &observer.archetype);
        if !visible.iter().any(|name| name == aspect) {
            tracing::debug!(path = %path, archetype = %observer.archetype, "aspect not afforded");
            return Err(self.denied(path, observer, DenialReason::NotAfforded).into());
        }

        if !self.inner.affordances.permits(&metadata, observer) {
            tracing::debug!(path = %path, archetype = %observer.archetype, "required archetype missing");
            let required = metadata.required_archetypes.iter().cloned().collect();
            return Err(self
                .denied(path, observer, DenialReason::MissingArchetype(required))
                .into());
        }

        if let Some(builtin) = builtin {
            return Ok(builtin.answer(self, resolved, observer));
        }

        let mut merged = Arguments::new();
        for (key, value) in path.params() {
            merged.insert(key.clone(), Value::String(value.clone()));
        }
        merged.extend(args);

        let signature = JitSignature::new(
            &resolved.prefix,
            resolved.generation,
            &resolved.subpath,
            aspect,
            &merged,
        );
        let cx = CallContext::new(observer.clone()).with_path(path.clone(), resolved.subpath.clone());
        let input = Value::Object(merged);

        let outcome = match self.inner.jit.lookup(&signature) {
            Some(specialized) => specialized.call(&cx, input).await,
            None => {
                let generic = node.resolve_aspect(aspect).ok_or_else(|| {
                    ResolutionError::UnknownAspect {
                        prefix: resolved.prefix.clone(),
                        aspect: aspect.to_string(),
                    }
                })?;
                let kept = (metadata.idempotent && self.inner.jit.config().enabled)
                    .then(|| input.clone());
                let outcome = generic.call(&cx, input).await;
                // A dispatch dropped mid-call never gets here and records nothing
                let observation = kept.map(|input| Observation::new(&cx, input, &outcome));
                self.inner.jit.record_hit(&signature, &generic, observation);
                outcome
            }
        };

        outcome.map_err(|source| {
            tracing::debug!(path = %path, error = %source, "handler failed");
            DispatchError::from(InvocationError {
                path: path.to_string(),
                aspect: aspect.to_string(),
                source,
            })
        })
    }

    fn denied(&self, path: &Path, observer: &Observer, reason: DenialReason) -> AffordanceDenied {
        AffordanceDenied {
            path: path.to_string(),
            aspect: path.aspect().to_string(),
            archetype: observer.archetype.to_string(),
            reason,
        }
    }

    /// JIT signature a call would be keyed under
    pub fn signature(&self, path: &str, args: &Arguments) -> Result<JitSignature> {
        let path = Path::parse(path)?;
        let resolved = self.inner.registry.resolve(&path)?;
        let mut merged = Arguments::new();
        for (key, value) in path.params() {
            merged.insert(key.clone(), Value::String(value.clone()));
        }
        merged.extend(args.clone());
        Ok(JitSignature::new(
            &resolved.prefix,
            resolved.generation,
            &resolved.subpath,
            path.aspect(),
            &merged,
        ))
    }

    /// Enumerate invokable paths matching a glob pattern
    ///
    /// Node-level matches carry the observer's invocable aspects; aspect-level
    /// matches (`world.house.*`) are listed only when invocable and carry
    /// that single aspect. Never has side effects.
    pub fn query(
        &self,
        pattern: &str,
        observer: &Observer,
        limit: Option<usize>,
        offset: usize,
    ) -> Vec<Discovery> {
        let limit = limit.unwrap_or(self.inner.config.query_limit);
        self.inner
            .registry
            .query(pattern)
            .filter_map(|(path, node)| {
                let invocable = self.invocable(node.as_ref(), observer);
                if path == node.prefix() {
                    return Some(Discovery {
                        path,
                        affordances: invocable,
                    });
                }
                let aspect = path.rsplit('.').next()?.to_string();
                invocable.contains(&aspect).then(|| Discovery {
                    path,
                    affordances: vec![aspect],
                })
            })
            .skip(offset)
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::HandlerError;
    use crate::node::{pure_fn, AspectMetadata, StaticNode};
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        let registry = Arc::new(NodeRegistry::new());
        registry
            .register(Arc::new(
                StaticNode::builder("world.house")
                    .description("A small house")
                    .aspect("manifest", AspectMetadata::read_only("Look at it"), pure_fn(|_| Ok(json!("a house"))))
                    .aspect(
                        "paint",
                        AspectMetadata::mutating("Paint a wall"),
                        pure_fn(|input| {
                            input
                                .get("color")
                                .cloned()
                                .ok_or_else(|| HandlerError::invalid("color is required"))
                        }),
                    )
                    .build(),
            ))
            .unwrap();
        registry
            .register(Arc::new(StaticNode::builder("world.garden").build()))
            .unwrap();
        Dispatcher::new(registry)
    }

    #[tokio::test]
    async fn test_path_params_are_default_arguments() {
        let dispatcher = dispatcher();
        let observer = Observer::guest();

        let out = dispatcher
            .invoke("world.house.paint[color=red]", &observer, Arguments::new())
            .await
            .unwrap();
        assert_eq!(out, json!("red"));

        let mut args = Arguments::new();
        args.insert("color".into(), json!("blue"));
        let out = dispatcher
            .invoke("world.house.paint[color=red]", &observer, args)
            .await
            .unwrap();
        assert_eq!(out, json!("blue"));
    }

    #[tokio::test]
    async fn test_handler_failure_is_invocation_error() {
        let err = dispatcher()
            .invoke("world.house.paint", &Observer::guest(), Arguments::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        match err {
            DispatchError::Invocation(e) => {
                assert_eq!(e.path, "world.house.paint");
                assert!(matches!(e.source, HandlerError::InvalidArguments(_)));
            }
            other => panic!("expected invocation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_aspect() {
        let err = dispatcher()
            .invoke("world.house.fly", &Observer::guest(), Arguments::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Resolution(ResolutionError::UnknownAspect { .. })
        ));
    }

    #[tokio::test]
    async fn test_builtin_manifest_for_undeclared() {
        let out = dispatcher()
            .invoke("world.garden.manifest", &Observer::guest(), Arguments::new())
            .await
            .unwrap();
        assert_eq!(out["path"], json!("world.garden"));
        assert_eq!(
            out["aspects"],
            json!(["manifest", "witness", "affordances", "help"])
        );
    }

    #[tokio::test]
    async fn test_help_is_generated_from_metadata() {
        let out = dispatcher()
            .invoke("world.house.help", &Observer::guest(), Arguments::new())
            .await
            .unwrap();
        let names: Vec<&str> = out["aspects"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["manifest", "witness", "affordances", "help", "paint"]);
        assert_eq!(out["aspects"][0]["description"], json!("Look at it"));
        assert_eq!(out["aspects"][4]["category"], json!("mutating"));
    }

    #[tokio::test]
    async fn test_witness_lists_registration() {
        let out = dispatcher()
            .invoke("world.house.witness", &Observer::guest(), Arguments::new())
            .await
            .unwrap();
        assert_eq!(out["history"][0]["action"], json!("registered"));
        assert_eq!(out["history"][0]["revision"], json!(1));
    }

    #[test]
    fn test_query_pagination() {
        let dispatcher = dispatcher();
        let observer = Observer::guest();

        let all = dispatcher.query("world.*", &observer, None, 0);
        assert_eq!(all.len(), 2);

        let page = dispatcher.query("world.*", &observer, Some(1), 1);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].path, "world.garden");

        let aspects = dispatcher.query("world.house.*", &observer, None, 0);
        let paths: Vec<&str> = aspects.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["world.house.manifest", "world.house.paint"]);
    }

    #[test]
    fn test_signature_includes_param_keys() {
        let dispatcher = dispatcher();
        let signature = dispatcher
            .signature("world.house.paint[color=red]", &Arguments::new())
            .unwrap();
        assert_eq!(signature.as_str(), "world.house#1.paint(color)");
    }
}
