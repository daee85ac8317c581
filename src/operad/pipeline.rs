//! `a.b.c >> d.e.f` pipelines of routed dispatches

use async_trait::async_trait;

use super::expr::Composition;
use crate::core::error::{CompositionError, HandlerError};
use crate::core::types::{Arguments, Value};
use crate::dispatch::Dispatcher;
use crate::node::{CallContext, Handler, HandlerResult};
use crate::path::Path;

/// Unit that re-enters the dispatcher, so every step is access-checked
/// against the caller's observer
struct RoutedUnit {
    dispatcher: Dispatcher,
    path: Path,
}

/// Records pass through as arguments; any other value becomes `{"input": v}`
fn into_arguments(input: Value) -> Arguments {
    match input {
        Value::Object(map) => map,
        Value::Null => Arguments::new(),
        other => {
            let mut args = Arguments::new();
            args.insert("input".to_string(), other);
            args
        }
    }
}

#[async_trait]
impl Handler for RoutedUnit {
    async fn call(&self, cx: &CallContext, input: Value) -> HandlerResult {
        self.dispatcher
            .invoke_path(&self.path, &cx.observer, into_arguments(input))
            .await
            .map_err(|source| HandlerError::Routed {
                path: self.path.to_string(),
                source: Box::new(source),
            })
    }
}

impl Composition {
    /// Right-nested sequence of routed units from `>>`-separated paths
    ///
    /// Paths are parsed now but resolved per call, so the pipeline follows
    /// later registrations.
    pub fn pipeline(dispatcher: &Dispatcher, expression: &str) -> Result<Composition, CompositionError> {
        if expression.trim().is_empty() {
            return Err(CompositionError::EmptyPipeline);
        }

        let mut units = Vec::new();
        for (step, raw) in split_steps(expression).into_iter().enumerate() {
            let path = Path::parse(raw.trim())
                .map_err(|source| CompositionError::Pipeline { step, source })?;
            units.push(Composition::unit(
                path.to_string(),
                RoutedUnit {
                    dispatcher: dispatcher.clone(),
                    path,
                },
            ));
        }

        let mut units = units.into_iter().rev();
        let mut expr = units.next().ok_or(CompositionError::EmptyPipeline)?;
        for unit in units {
            expr = Composition::sequence(unit, expr)?;
        }
        Ok(expr)
    }
}

/// Split on `>>` outside of `[...]`; parameter values may contain `>`
fn split_steps(expression: &str) -> Vec<&str> {
    let mut steps = Vec::new();
    let mut in_params = false;
    let mut start = 0;
    let mut chars = expression.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '[' => in_params = true,
            ']' => in_params = false,
            '>' if !in_params && matches!(chars.peek(), Some((_, '>'))) => {
                steps.push(&expression[start..i]);
                chars.next();
                start = i + 2;
            }
            _ => {}
        }
    }
    steps.push(&expression[start..]);
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{DispatchError, ParseError};
    use crate::core::types::Observer;
    use crate::node::{pure_fn, AspectMetadata, StaticNode};
    use crate::registry::NodeRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn dispatcher() -> Dispatcher {
        let registry = Arc::new(NodeRegistry::new());
        registry
            .register(Arc::new(
                StaticNode::builder("concept.text")
                    .aspect(
                        "upper",
                        AspectMetadata::read_only("Uppercase"),
                        pure_fn(|args: Value| {
                            let text = args["input"].as_str().unwrap_or_default();
                            Ok(json!(text.to_uppercase()))
                        }),
                    )
                    .aspect(
                        "exclaim",
                        AspectMetadata::read_only("Add emphasis"),
                        pure_fn(|args: Value| {
                            let text = args["input"].as_str().unwrap_or_default();
                            Ok(json!(format!("{}!", text)))
                        }),
                    )
                    .aspect(
                        "redact",
                        AspectMetadata::mutating("Redact").requires("censor"),
                        pure_fn(|_| Ok(json!("[redacted]"))),
                    )
                    .build(),
            ))
            .unwrap();
        Dispatcher::new(registry)
    }

    #[tokio::test]
    async fn test_pipeline_routes_each_step() {
        let dispatcher = dispatcher();
        let pipeline =
            Composition::pipeline(&dispatcher, "concept.text.upper >> concept.text.exclaim").unwrap();
        assert_eq!(
            pipeline.to_string(),
            "(concept.text.upper >> concept.text.exclaim)"
        );

        let cx = CallContext::new(Observer::guest());
        let out = pipeline.call(&cx, json!("hi")).await.unwrap();
        assert_eq!(out, json!("HI!"));
    }

    #[tokio::test]
    async fn test_pipeline_steps_are_access_checked() {
        let dispatcher = dispatcher();
        let pipeline =
            Composition::pipeline(&dispatcher, "concept.text.upper >> concept.text.redact").unwrap();

        let err = pipeline
            .call(&CallContext::new(Observer::guest()), json!("hi"))
            .await
            .unwrap_err();
        match err {
            HandlerError::Routed { path, source } => {
                assert_eq!(path, "concept.text.redact");
                assert!(matches!(*source, DispatchError::Denied(_)));
            }
            other => panic!("expected routed error, got {:?}", other),
        }

        let censor = CallContext::new(Observer::new("c", "censor"));
        assert_eq!(
            pipeline.call(&censor, json!("hi")).await.unwrap(),
            json!("[redacted]")
        );
    }

    #[tokio::test]
    async fn test_arrows_inside_params_do_not_split() {
        assert_eq!(
            split_steps("a.b.c[x=>>] >> a.b.d"),
            vec!["a.b.c[x=>>] ", " a.b.d"]
        );

        let dispatcher = dispatcher();
        let pipeline = Composition::pipeline(
            &dispatcher,
            "concept.text.upper[mark=>>] >> concept.text.exclaim",
        )
        .unwrap();
        assert_eq!(pipeline.units(), 2);
        assert_eq!(
            pipeline.to_string(),
            "(concept.text.upper[mark=>>] >> concept.text.exclaim)"
        );
        let out = pipeline
            .call(&CallContext::new(Observer::guest()), json!("hi"))
            .await
            .unwrap();
        assert_eq!(out, json!("HI!"));
    }

    #[test]
    fn test_malformed_pipelines() {
        let dispatcher = dispatcher();
        assert_eq!(
            Composition::pipeline(&dispatcher, "  ").unwrap_err(),
            CompositionError::EmptyPipeline
        );
        assert_eq!(
            Composition::pipeline(&dispatcher, "concept.text.upper >> ").unwrap_err(),
            CompositionError::Pipeline {
                step: 1,
                source: ParseError::Empty
            }
        );
    }
}
