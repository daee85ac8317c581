//! Composition expressions and their evaluation

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::shape::{Shape, Signature};
use crate::core::error::{CompositionError, HandlerError};
use crate::core::types::Value;
use crate::node::{CallContext, Handler, HandlerResult};

type EvalFuture<'a> = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'a>>;

/// A named leaf handler
#[derive(Clone)]
pub struct Unit {
    pub name: String,
    pub handler: Arc<dyn Handler>,
}

/// Immutable expression tree over units
///
/// Building an expression never invokes anything. Combinators that can be
/// ill-typed are only reachable through the checked constructors.
#[derive(Clone)]
pub enum Composition {
    Id,
    Unit(Unit),
    Sequence(Arc<Composition>, Arc<Composition>),
    /// Both sides get the same input; output is `[left, right]`
    Parallel(Arc<Composition>, Arc<Composition>),
    /// Right side runs with the same input if the left side fails
    Alternative(Arc<Composition>, Arc<Composition>),
    /// Element-wise over a list, preserving length and order
    Map(Arc<Composition>),
}

impl Composition {
    pub fn id() -> Self {
        Composition::Id
    }

    pub fn unit(name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self::unit_arc(name, Arc::new(handler))
    }

    pub fn unit_arc(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Composition::Unit(Unit {
            name: name.into(),
            handler,
        })
    }

    pub fn sequence(first: Composition, second: Composition) -> Result<Self, CompositionError> {
        let out = first.signature().output;
        let input = second.signature().input;
        if !out.fits(&input) {
            return Err(CompositionError::TypeMismatch {
                combinator: "sequence",
                output: out,
                input,
            });
        }
        Ok(Composition::Sequence(Arc::new(first), Arc::new(second)))
    }

    /// `self >> next`
    pub fn then(self, next: Composition) -> Result<Self, CompositionError> {
        Self::sequence(self, next)
    }

    pub fn parallel(left: Composition, right: Composition) -> Result<Self, CompositionError> {
        let (l, r) = (left.signature(), right.signature());
        if !l.input.fits(&r.input) {
            return Err(CompositionError::TypeMismatch {
                combinator: "parallel",
                output: l.input,
                input: r.input,
            });
        }
        Ok(Composition::Parallel(Arc::new(left), Arc::new(right)))
    }

    pub fn alternative(primary: Composition, fallback: Composition) -> Result<Self, CompositionError> {
        let (p, f) = (primary.signature(), fallback.signature());
        if !p.input.fits(&f.input) {
            return Err(CompositionError::TypeMismatch {
                combinator: "alternative",
                output: p.input,
                input: f.input,
            });
        }
        if !f.output.fits(&p.output) {
            return Err(CompositionError::TypeMismatch {
                combinator: "alternative",
                output: f.output,
                input: p.output,
            });
        }
        Ok(Composition::Alternative(Arc::new(primary), Arc::new(fallback)))
    }

    pub fn map(inner: Composition) -> Self {
        Composition::Map(Arc::new(inner))
    }

    pub fn is_id(&self) -> bool {
        matches!(self, Composition::Id)
    }

    pub fn signature(&self) -> Signature {
        match self {
            Composition::Id => Signature::any(),
            Composition::Unit(unit) => unit.handler.signature(),
            Composition::Sequence(a, b) => {
                let (sa, sb) = (a.signature(), b.signature());
                let input = if a.is_id() { sb.input.clone() } else { sa.input.clone() };
                let output = if b.is_id() { sa.output } else { sb.output };
                Signature::new(input, output)
            }
            Composition::Parallel(a, b) => {
                let (sa, sb) = (a.signature(), b.signature());
                let output = if sa.output == sb.output {
                    Shape::list(sa.output)
                } else {
                    Shape::list(Shape::Any)
                };
                Signature::new(sa.input.meet(&sb.input), output)
            }
            Composition::Alternative(a, b) => {
                let (sa, sb) = (a.signature(), b.signature());
                Signature::new(sa.input.meet(&sb.input), sa.output.meet(&sb.output))
            }
            Composition::Map(inner) => {
                let s = inner.signature();
                Signature::new(Shape::list(s.input), Shape::list(s.output))
            }
        }
    }

    /// Drop identities and right-associate sequences
    ///
    /// The result evaluates the same units in the same order.
    pub fn normalize(&self) -> Composition {
        match self {
            Composition::Id | Composition::Unit(_) => self.clone(),
            Composition::Sequence(a, b) => {
                let (a, b) = (a.normalize(), b.normalize());
                match (a.is_id(), b.is_id()) {
                    (true, _) => b,
                    (_, true) => a,
                    _ => associate_right(a, b),
                }
            }
            Composition::Parallel(a, b) => {
                Composition::Parallel(Arc::new(a.normalize()), Arc::new(b.normalize()))
            }
            Composition::Alternative(a, b) => {
                Composition::Alternative(Arc::new(a.normalize()), Arc::new(b.normalize()))
            }
            Composition::Map(inner) => Composition::Map(Arc::new(inner.normalize())),
        }
    }

    /// Number of units in the tree
    pub fn units(&self) -> usize {
        match self {
            Composition::Id => 0,
            Composition::Unit(_) => 1,
            Composition::Sequence(a, b)
            | Composition::Parallel(a, b)
            | Composition::Alternative(a, b) => a.units() + b.units(),
            Composition::Map(inner) => inner.units(),
        }
    }

    pub fn eval<'a>(&'a self, cx: &'a CallContext, input: Value) -> EvalFuture<'a> {
        Box::pin(async move {
            match self {
                Composition::Id => Ok(input),
                Composition::Unit(unit) => unit.handler.call(cx, input).await,
                Composition::Sequence(a, b) => {
                    let mid = a.eval(cx, input).await?;
                    b.eval(cx, mid).await
                }
                Composition::Parallel(a, b) => {
                    let (left, right) = tokio::join!(a.eval(cx, input.clone()), b.eval(cx, input));
                    Ok(Value::Array(vec![left?, right?]))
                }
                Composition::Alternative(a, b) => match a.eval(cx, input.clone()).await {
                    Ok(value) => Ok(value),
                    Err(err) => {
                        tracing::debug!(expression = %self, error = %err, "falling back");
                        b.eval(cx, input).await
                    }
                },
                Composition::Map(inner) => {
                    let items = match input {
                        Value::Array(items) => items,
                        other => {
                            return Err(HandlerError::invalid(format!(
                                "map expects a list, got {}",
                                Shape::of(&other)
                            )));
                        }
                    };
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(inner.eval(cx, item).await?);
                    }
                    Ok(Value::Array(out))
                }
            }
        })
    }
}

fn associate_right(a: Composition, b: Composition) -> Composition {
    match a {
        Composition::Sequence(x, y) => {
            let rest = associate_right(Composition::clone(&y), b);
            Composition::Sequence(x, Arc::new(rest))
        }
        a => Composition::Sequence(Arc::new(a), Arc::new(b)),
    }
}

#[async_trait]
impl Handler for Composition {
    async fn call(&self, cx: &CallContext, input: Value) -> HandlerResult {
        self.eval(cx, input).await
    }

    fn signature(&self) -> Signature {
        Composition::signature(self)
    }

    fn specialize(&self) -> Option<Arc<dyn Handler>> {
        match self {
            Composition::Unit(unit) => unit.handler.specialize(),
            _ => Some(Arc::new(self.normalize())),
        }
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Composition::Id => f.write_str("id"),
            Composition::Unit(unit) => f.write_str(&unit.name),
            Composition::Sequence(a, b) => write!(f, "({} >> {})", a, b),
            Composition::Parallel(a, b) => write!(f, "({} & {})", a, b),
            Composition::Alternative(a, b) => write!(f, "({} | {})", a, b),
            Composition::Map(inner) => write!(f, "map({})", inner),
        }
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Composition({}: {})", self, self.signature())
    }
}
