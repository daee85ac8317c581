//! Empirical verification of the category laws

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde_json::json;

use super::expr::Composition;
use crate::core::error::{CompositionLawViolation, VerifyError};
use crate::core::types::{Observer, Value};
use crate::jit::same_outcome;
use crate::node::{CallContext, HandlerResult};
use crate::operad::Shape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Law {
    /// `id >> f == f`
    LeftIdentity,
    /// `f >> id == f`
    RightIdentity,
    /// `(f >> g) >> h == f >> (g >> h)`
    Associativity,
}

impl Law {
    pub const ALL: [Law; 3] = [Law::LeftIdentity, Law::RightIdentity, Law::Associativity];
}

impl fmt::Display for Law {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Law::LeftIdentity => f.write_str("left identity"),
            Law::RightIdentity => f.write_str("right identity"),
            Law::Associativity => f.write_str("associativity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LawReport {
    pub laws: Vec<Law>,
    /// Sample inputs evaluated on both sides, summed over all checks
    pub samples_checked: usize,
}

/// Checks laws by evaluating both sides on the same sample inputs
///
/// Each side is evaluated once per sample, left first. A unit with hidden
/// state will therefore usually show up as a violation.
pub struct LawVerifier {
    samples: Vec<Value>,
    cx: CallContext,
}

impl LawVerifier {
    pub fn new(samples: Vec<Value>) -> Self {
        Self {
            samples,
            cx: CallContext::default(),
        }
    }

    /// Reproducible mixed-shape samples
    pub fn with_generated_samples(seed: u64, count: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let samples = (0..count).map(|_| sample(&mut rng)).collect();
        Self::new(samples)
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.cx = CallContext::new(observer);
        self
    }

    pub fn samples(&self) -> &[Value] {
        &self.samples
    }

    fn samples_for<'a>(&'a self, input: &'a Shape) -> impl Iterator<Item = &'a Value> + 'a {
        self.samples
            .iter()
            .filter(move |value| Shape::of(value).fits(input))
    }

    async fn compare(
        &self,
        law: Law,
        left: &Composition,
        right: &Composition,
    ) -> Result<usize, VerifyError> {
        let input_shape = left.signature().input;
        let mut checked = 0;
        for input in self.samples_for(&input_shape) {
            let lhs = left.eval(&self.cx, input.clone()).await;
            let rhs = right.eval(&self.cx, input.clone()).await;
            if !same_outcome(&lhs, &rhs) {
                return Err(CompositionLawViolation {
                    law,
                    expression: format!("{} vs {}", left, right),
                    input: input.clone(),
                    left: render(&lhs),
                    right: render(&rhs),
                }
                .into());
            }
            checked += 1;
        }
        if checked == 0 {
            return Err(VerifyError::NoSamples { law, input_shape });
        }
        Ok(checked)
    }

    /// Left and right identity for `f`
    pub async fn verify_identity(&self, f: &Composition) -> Result<usize, VerifyError> {
        let left = Composition::sequence(Composition::id(), f.clone())?;
        let right = Composition::sequence(f.clone(), Composition::id())?;
        let mut checked = self.compare(Law::LeftIdentity, &left, f).await?;
        checked += self.compare(Law::RightIdentity, &right, f).await?;
        Ok(checked)
    }

    pub async fn verify_associativity(
        &self,
        f: &Composition,
        g: &Composition,
        h: &Composition,
    ) -> Result<usize, VerifyError> {
        let left = Composition::sequence(Composition::sequence(f.clone(), g.clone())?, h.clone())?;
        let right = Composition::sequence(f.clone(), Composition::sequence(g.clone(), h.clone())?)?;
        self.compare(Law::Associativity, &left, &right).await
    }

    /// Identity for every unit, associativity for every consecutive triple
    pub async fn verify_laws(&self, units: &[Composition]) -> Result<LawReport, VerifyError> {
        let mut laws = Vec::new();
        let mut samples_checked = 0;

        for unit in units {
            samples_checked += self.verify_identity(unit).await?;
        }
        if !units.is_empty() {
            laws.extend([Law::LeftIdentity, Law::RightIdentity]);
        }

        for window in units.windows(3) {
            samples_checked += self
                .verify_associativity(&window[0], &window[1], &window[2])
                .await?;
        }
        if units.len() >= 3 {
            laws.push(Law::Associativity);
        }

        tracing::debug!(laws = laws.len(), samples_checked, "composition laws hold");
        Ok(LawReport {
            laws,
            samples_checked,
        })
    }

    /// Hands `expr` back only if the laws hold for `units`
    ///
    /// `units` are the operands `expr` was built from, in order.
    pub async fn verified(
        &self,
        expr: Composition,
        units: &[Composition],
    ) -> Result<Composition, VerifyError> {
        let units = if units.is_empty() {
            std::slice::from_ref(&expr)
        } else {
            units
        };
        let report = self.verify_laws(units).await?;
        tracing::debug!(expression = %expr, samples = report.samples_checked, "composition verified");
        Ok(expr)
    }
}

fn render(outcome: &HandlerResult) -> String {
    match outcome {
        Ok(value) => value.to_string(),
        Err(err) => format!("error: {}", err),
    }
}

fn sample(rng: &mut ChaCha8Rng) -> Value {
    match rng.gen_range(0..6) {
        0 => Value::Null,
        1 => json!(rng.gen_bool(0.5)),
        2 => json!(rng.gen_range(-1000i64..1000)),
        3 => {
            let len = rng.gen_range(0..8);
            let text: String = (0..len).map(|_| rng.sample(Alphanumeric) as char).collect();
            json!(text)
        }
        4 => {
            let len = rng.gen_range(0..5);
            let items: Vec<i64> = (0..len).map(|_| rng.gen_range(-100..100)).collect();
            json!(items)
        }
        _ => json!({ "n": rng.gen_range(0i64..100) }),
    }
}
