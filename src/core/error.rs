//! Error taxonomy for parsing, resolution, access control and invocation
//!
//! Each category is surfaced to the immediate caller untouched. Only
//! [`InvocationError`] is considered transient; the core never retries.

use thiserror::Error;

use crate::core::types::Value;
use crate::operad::{Law, Shape};

/// Malformed path string. Always caller-fixable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty path")]
    Empty,

    #[error("Unknown context '{0}' (expected world, self, concept, void or time)")]
    UnknownContext(String),

    #[error("Path '{0}' needs a context, at least one node segment and an aspect")]
    MissingAspect(String),

    #[error("Malformed path '{input}' at offset {offset}")]
    Malformed { input: String, offset: usize },

    #[error("Malformed parameter block in '{0}'")]
    MalformedParams(String),

    #[error("Duplicate parameter key '{key}' in '{input}'")]
    DuplicateKey { input: String, key: String },
}

/// No node or aspect matched the requested path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No node registered for path '{path}'")]
    NoNode { path: String },

    #[error("Node '{prefix}' does not declare aspect '{aspect}'")]
    UnknownAspect { prefix: String, aspect: String },
}

/// Why an existing aspect was withheld from an observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The aspect is not in the observer's affordance set
    NotAfforded,
    /// The aspect requires one of these archetypes or permission tags
    MissingArchetype(Vec<String>),
}

/// The aspect exists but the observer may not invoke it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Archetype '{archetype}' may not invoke '{aspect}' on '{path}'")]
pub struct AffordanceDenied {
    pub path: String,
    pub aspect: String,
    pub archetype: String,
    pub reason: DenialReason,
}

/// Failure reported by a handler
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// A state-dependent agent refused an input outside its directions
    #[error("Input {input} is not a valid direction in state {state} (valid: {})", .valid.join(", "))]
    Rejected {
        input: String,
        state: String,
        valid: Vec<String>,
    },

    /// A routed pipeline step failed inside the dispatcher
    #[error("Routed step '{path}' failed: {source}")]
    Routed {
        path: String,
        #[source]
        source: Box<DispatchError>,
    },
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// A handler failed while serving a dispatched aspect
#[derive(Error, Debug)]
#[error("Invocation of '{aspect}' on '{path}' failed: {source}")]
pub struct InvocationError {
    pub path: String,
    pub aspect: String,
    #[source]
    pub source: HandlerError,
}

/// The law verifier found inputs on which two sides of a law disagree
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{law} violated by {expression} on input {input}: {left} != {right}")]
pub struct CompositionLawViolation {
    pub law: Law,
    pub expression: String,
    pub input: Value,
    pub left: String,
    pub right: String,
}

/// A composition could not be built
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionError {
    #[error("{combinator}: output {output} does not fit input {input}")]
    TypeMismatch {
        combinator: &'static str,
        output: Shape,
        input: Shape,
    },

    #[error("Unknown operad operation '{0}'")]
    UnknownOperation(String),

    #[error("Operation '{operation}' takes {expected} operands, got {got}")]
    Arity {
        operation: String,
        expected: usize,
        got: usize,
    },

    #[error("Pipeline step {step} is not a valid path: {source}")]
    Pipeline {
        step: usize,
        #[source]
        source: ParseError,
    },

    #[error("Empty pipeline")]
    EmptyPipeline,
}

/// Result of running the law verifier
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error(transparent)]
    Violation(#[from] CompositionLawViolation),

    #[error(transparent)]
    IllTyped(#[from] CompositionError),

    #[error("No sample fits input {input_shape}; {law} was not checked")]
    NoSamples { law: Law, input_shape: Shape },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Prefix '{prefix}' is already bound to a different node")]
    AlreadyRegistered { prefix: String },

    #[error("Invalid node prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Everything `invoke` can return
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Forbidden: {0}")]
    Denied(#[from] AffordanceDenied),

    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

impl DispatchError {
    /// Only handler failures may be transient
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Invocation(_))
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
