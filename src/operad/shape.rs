//! Coarse value shapes used to type-check compositions at build time

use std::fmt;

use serde::Serialize;

use crate::core::types::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Any,
    Null,
    Bool,
    Number,
    Text,
    List(Box<Shape>),
    Record,
}

impl Shape {
    pub fn list(inner: Shape) -> Self {
        Shape::List(Box::new(inner))
    }

    /// Whether a value of shape `self` may flow into an input of shape `input`
    pub fn fits(&self, input: &Shape) -> bool {
        match (self, input) {
            (Shape::Any, _) | (_, Shape::Any) => true,
            (Shape::List(a), Shape::List(b)) => a.fits(b),
            (a, b) => a == b,
        }
    }

    /// The more specific of two compatible shapes
    pub fn meet(&self, other: &Shape) -> Shape {
        match (self, other) {
            (Shape::Any, s) | (s, Shape::Any) => s.clone(),
            (Shape::List(a), Shape::List(b)) => Shape::list(a.meet(b)),
            (a, _) => a.clone(),
        }
    }

    pub fn of(value: &Value) -> Shape {
        match value {
            Value::Null => Shape::Null,
            Value::Bool(_) => Shape::Bool,
            Value::Number(_) => Shape::Number,
            Value::String(_) => Shape::Text,
            Value::Array(items) => {
                let inner = items
                    .iter()
                    .map(Shape::of)
                    .reduce(|a, b| if a == b { a } else { Shape::Any })
                    .unwrap_or(Shape::Any);
                Shape::list(inner)
            }
            Value::Object(_) => Shape::Record,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Any => f.write_str("any"),
            Shape::Null => f.write_str("null"),
            Shape::Bool => f.write_str("bool"),
            Shape::Number => f.write_str("number"),
            Shape::Text => f.write_str("text"),
            Shape::List(inner) => write!(f, "list<{}>", inner),
            Shape::Record => f.write_str("record"),
        }
    }
}

/// Input and output shape of a dispatchable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Signature {
    pub input: Shape,
    pub output: Shape,
}

impl Signature {
    pub fn new(input: Shape, output: Shape) -> Self {
        Self { input, output }
    }

    pub fn any() -> Self {
        Self::new(Shape::Any, Shape::Any)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.input, self.output)
    }
}
