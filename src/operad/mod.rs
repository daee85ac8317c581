//! Composition algebra over handlers
//!
//! Expressions are built from `id`, `seq`, `par`, `alt` and `map` and are
//! type-checked with [`Shape`] signatures when constructed. Evaluation only
//! happens when the resulting [`Composition`] is invoked as a handler.

pub mod expr;
pub mod laws;
pub mod pipeline;
pub mod shape;

use crate::core::error::{CompositionError, VerifyError};
pub use expr::{Composition, Unit};
pub use laws::{Law, LawReport, LawVerifier};
pub use shape::{Shape, Signature};

/// A named combinator with fixed arity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub arity: usize,
    pub description: &'static str,
}

const STANDARD_OPERATIONS: [Operation; 5] = [
    Operation {
        name: "id",
        arity: 0,
        description: "Pass the input through unchanged",
    },
    Operation {
        name: "seq",
        arity: 2,
        description: "Feed the first output into the second",
    },
    Operation {
        name: "par",
        arity: 2,
        description: "Run both on the same input, output the pair",
    },
    Operation {
        name: "alt",
        arity: 2,
        description: "Fall back to the second on failure of the first",
    },
    Operation {
        name: "map",
        arity: 1,
        description: "Apply element-wise over a list",
    },
];

/// The operations and laws of the composition algebra
#[derive(Debug, Clone)]
pub struct Operad {
    operations: Vec<Operation>,
}

impl Operad {
    pub fn standard() -> Self {
        Self {
            operations: STANDARD_OPERATIONS.to_vec(),
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn laws(&self) -> &'static [Law] {
        &Law::ALL
    }

    /// Apply an operation by name
    pub fn compose(
        &self,
        name: &str,
        operands: Vec<Composition>,
    ) -> Result<Composition, CompositionError> {
        let operation = self
            .get(name)
            .ok_or_else(|| CompositionError::UnknownOperation(name.to_string()))?;
        if operands.len() != operation.arity {
            return Err(CompositionError::Arity {
                operation: name.to_string(),
                expected: operation.arity,
                got: operands.len(),
            });
        }

        let mut operands = operands.into_iter();
        let mut next = || operands.next().unwrap_or(Composition::Id);
        match operation.name {
            "id" => Ok(Composition::id()),
            "seq" => Composition::sequence(next(), next()),
            "par" => Composition::parallel(next(), next()),
            "alt" => Composition::alternative(next(), next()),
            "map" => Ok(Composition::map(next())),
            other => Err(CompositionError::UnknownOperation(other.to_string())),
        }
    }

    /// Like [`Operad::compose`], but only returns an expression whose
    /// operands pass `verifier`
    pub async fn compose_verified(
        &self,
        name: &str,
        operands: Vec<Composition>,
        verifier: &LawVerifier,
    ) -> Result<Composition, VerifyError> {
        let expr = self.compose(name, operands.clone())?;
        verifier.verified(expr, &operands).await
    }
}

impl Default for Operad {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Value;
    use crate::node::{pure_fn, CallContext};
    use serde_json::json;

    fn echo(name: &str) -> Composition {
        Composition::unit(name, pure_fn(Ok))
    }

    #[test]
    fn test_standard_operations() {
        let operad = Operad::standard();
        let names: Vec<&str> = operad.operations().iter().map(|op| op.name).collect();
        assert_eq!(names, vec!["id", "seq", "par", "alt", "map"]);
        assert_eq!(operad.get("par").unwrap().arity, 2);
        assert_eq!(operad.laws().len(), 3);
    }

    #[test]
    fn test_compose_checks_name_and_arity() {
        let operad = Operad::standard();
        assert_eq!(
            operad.compose("fold", vec![]).unwrap_err(),
            CompositionError::UnknownOperation("fold".into())
        );
        assert_eq!(
            operad.compose("seq", vec![echo("a")]).unwrap_err(),
            CompositionError::Arity {
                operation: "seq".into(),
                expected: 2,
                got: 1
            }
        );
    }

    #[tokio::test]
    async fn test_compose_by_name() {
        let operad = Operad::standard();
        let par = operad.compose("par", vec![echo("a"), echo("b")]).unwrap();
        let mapped = operad.compose("map", vec![par]).unwrap();
        assert_eq!(mapped.to_string(), "map((a & b))");

        let out = mapped
            .eval(&CallContext::default(), json!([1, 2]))
            .await
            .unwrap();
        assert_eq!(out, json!([[1, 1], [2, 2]]));
    }

    #[tokio::test]
    async fn test_compose_verified_rejects_unlawful_operands() {
        use std::sync::atomic::{AtomicI64, Ordering};
        use std::sync::Arc;

        let operad = Operad::standard();
        let verifier = LawVerifier::new(vec![json!(1), json!(2)]);

        let seq = operad
            .compose_verified("seq", vec![echo("a"), echo("b")], &verifier)
            .await
            .unwrap();
        assert_eq!(seq.to_string(), "(a >> b)");

        let calls = Arc::new(AtomicI64::new(0));
        let tick = {
            let calls = calls.clone();
            Composition::unit(
                "tick",
                pure_fn(move |v: Value| {
                    Ok(json!(v.as_i64().unwrap_or(0) + calls.fetch_add(1, Ordering::SeqCst)))
                }),
            )
        };
        let err = operad
            .compose_verified("seq", vec![tick, echo("b")], &verifier)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Violation(_)));
    }
}
