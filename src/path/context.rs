//! The five fixed top-level namespaces

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::ParseError;

/// Top-level context every path lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    /// External entities (`world.*`)
    World,
    /// Internal state of the caller (`self.*`)
    #[serde(rename = "self")]
    Internal,
    /// Abstract concepts (`concept.*`)
    Concept,
    /// Entropy and randomness (`void.*`)
    Void,
    /// Temporal operations (`time.*`)
    Time,
}

impl Context {
    pub const ALL: [Context; 5] = [
        Context::World,
        Context::Internal,
        Context::Concept,
        Context::Void,
        Context::Time,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Context::World => "world",
            Context::Internal => "self",
            Context::Concept => "concept",
            Context::Void => "void",
            Context::Time => "time",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.token() == token)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Context {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| ParseError::UnknownContext(s.to_string()))
    }
}
