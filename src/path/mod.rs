//! Path values: `context.segment...aspect[key=value,...]`
//!
//! Parsing is pure and total for the grammar in [`parser`]. Rendering a
//! parsed path (via `Display`) and parsing it again yields an equal value;
//! parameters render sorted by key.

pub mod context;
pub mod glob;
pub mod parser;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::core::error::ParseError;
pub use context::Context;
pub use glob::Pattern;
pub use parser::{parse_path, parse_prefix};

/// A parsed path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub(crate) context: Context,
    pub(crate) segments: Vec<String>,
    pub(crate) aspect: String,
    pub(crate) params: BTreeMap<String, String>,
}

impl Path {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parse_path(input)
    }

    pub fn context(&self) -> Context {
        self.context
    }

    /// Node segments between the context and the aspect
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn aspect(&self) -> &str {
        &self.aspect
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// `context.segment...` without the aspect, e.g. `world.house`
    pub fn node_prefix(&self) -> String {
        let mut prefix = self.context.token().to_string();
        for segment in &self.segments {
            prefix.push('.');
            prefix.push_str(segment);
        }
        prefix
    }

    /// Context token followed by node segments
    pub fn prefix_segments(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.context.token()).chain(self.segments.iter().map(String::as_str))
    }

    /// Same node, different aspect
    pub fn with_aspect(&self, aspect: impl Into<String>) -> Self {
        Self {
            aspect: aspect.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_prefix(), self.aspect)?;
        if !self.params.is_empty() {
            f.write_str("[")?;
            for (i, (key, value)) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}={}", key, value)?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_path(s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_canonical() {
        let path = Path::parse("time.trace.window[z=1,a=2]").unwrap();
        assert_eq!(path.to_string(), "time.trace.window[a=2,z=1]");
        assert_eq!(Path::parse(&path.to_string()).unwrap(), path);
    }

    #[test]
    fn test_prefix_segments() {
        let path = Path::parse("world.house.kitchen.manifest").unwrap();
        let segments: Vec<&str> = path.prefix_segments().collect();
        assert_eq!(segments, vec!["world", "house", "kitchen"]);
        assert_eq!(path.node_prefix(), "world.house.kitchen");
    }

    #[test]
    fn test_with_aspect_keeps_params() {
        let path = Path::parse("void.entropy.sip[amount=3]").unwrap();
        let help = path.with_aspect("help");
        assert_eq!(help.to_string(), "void.entropy.help[amount=3]");
    }
}
