//! Single-segment wildcard patterns for discovery queries

use super::parser::is_segment_char;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Wildcard,
}

/// A dot-separated pattern where `*` matches exactly one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    tokens: Vec<Token>,
}

impl Pattern {
    /// Returns `None` for an empty or malformed pattern, which matches nothing
    pub fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return None;
        }

        let mut tokens = Vec::new();
        for part in pattern.split('.') {
            if part == "*" {
                tokens.push(Token::Wildcard);
            } else if !part.is_empty() && part.chars().all(is_segment_char) {
                tokens.push(Token::Literal(part.to_string()));
            } else {
                return None;
            }
        }
        Some(Self { tokens })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Match the first `segments.len()` tokens against `segments`
    pub fn matches_leading<'a, I>(&self, segments: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut count = 0;
        for (token, segment) in self.tokens.iter().zip(segments) {
            count += 1;
            if let Token::Literal(literal) = token {
                if literal != segment {
                    return false;
                }
            }
        }
        count > 0
    }

    /// Whether the token at `index` accepts `segment`
    pub fn matches_at(&self, index: usize, segment: &str) -> bool {
        match self.tokens.get(index) {
            Some(Token::Wildcard) => true,
            Some(Token::Literal(literal)) => literal == segment,
            None => false,
        }
    }
}
