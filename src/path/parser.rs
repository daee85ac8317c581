//! nom grammar for path strings
//!
//! ```text
//! path    := segment ("." segment)* params?
//! params  := "[" key "=" value ("," key "=" value)* "]"
//! ```
//!
//! The structural grammar is deliberately loose about the first segment and
//! the segment count; [`parse_path`] enforces those afterwards so callers get
//! a specific [`ParseError`] instead of a generic offset.

use std::collections::BTreeMap;

use nom::bytes::complete::take_while1;
use nom::character::complete::char;
use nom::combinator::{all_consuming, opt};
use nom::multi::separated_list1;
use nom::sequence::{delimited, separated_pair};
use nom::{IResult, Parser};

use super::{Context, Path};
use crate::core::error::ParseError;

struct RawPath<'a> {
    segments: Vec<&'a str>,
    params: Option<Vec<(&'a str, &'a str)>>,
}

pub(crate) fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn segment(input: &str) -> IResult<&str, &str> {
    take_while1(is_segment_char).parse(input)
}

fn value(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !matches!(c, ',' | '[' | ']' | '=')).parse(input)
}

fn param(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(segment, char('='), value).parse(input)
}

fn params(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    delimited(char('['), separated_list1(char(','), param), char(']')).parse(input)
}

fn raw_path(input: &str) -> IResult<&str, RawPath<'_>> {
    (separated_list1(char('.'), segment), opt(params))
        .map(|(segments, params)| RawPath { segments, params })
        .parse(input)
}

/// Parse a full path string into a [`Path`]
pub fn parse_path(input: &str) -> Result<Path, ParseError> {
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let raw = match all_consuming(raw_path).parse(input) {
        Ok((_, raw)) => raw,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            if e.input.starts_with('[') {
                return Err(ParseError::MalformedParams(input.to_string()));
            }
            return Err(ParseError::Malformed {
                input: input.to_string(),
                offset: input.len() - e.input.len(),
            });
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(ParseError::Malformed {
                input: input.to_string(),
                offset: input.len(),
            });
        }
    };

    let (context_token, rest) = raw
        .segments
        .split_first()
        .ok_or(ParseError::Empty)?;
    let context: Context = context_token.parse()?;

    // context + at least one node segment + aspect
    let Some((aspect, node_segments)) = rest.split_last() else {
        return Err(ParseError::MissingAspect(input.to_string()));
    };
    if node_segments.is_empty() {
        return Err(ParseError::MissingAspect(input.to_string()));
    }

    let mut map = BTreeMap::new();
    for (key, value) in raw.params.unwrap_or_default() {
        let value = value.trim();
        if value.is_empty() {
            return Err(ParseError::MalformedParams(input.to_string()));
        }
        if map.insert(key.to_string(), value.to_string()).is_some() {
            return Err(ParseError::DuplicateKey {
                input: input.to_string(),
                key: key.to_string(),
            });
        }
    }

    Ok(Path {
        context,
        segments: node_segments.iter().map(|s| s.to_string()).collect(),
        aspect: aspect.to_string(),
        params: map,
    })
}

/// Parse a node prefix such as `world.house` (no aspect, no parameters)
pub fn parse_prefix(input: &str) -> Result<(Context, Vec<String>), String> {
    let (rest, segments) = separated_list1(char('.'), segment)
        .parse(input)
        .map_err(|_| "expected dot-separated segments".to_string())?;
    if !rest.is_empty() {
        return Err(format!("unexpected trailing input '{}'", rest));
    }

    let (context, tail) = segments
        .split_first()
        .ok_or_else(|| "empty prefix".to_string())?;
    let context = Context::from_token(context)
        .ok_or_else(|| format!("unknown context '{}'", context))?;
    if tail.is_empty() {
        return Err("a prefix needs at least one segment after the context".into());
    }

    Ok((context, tail.iter().map(|s| s.to_string()).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_path() {
        let path = parse_path("world.house.manifest").unwrap();
        assert_eq!(path.context(), Context::World);
        assert_eq!(path.segments(), &["house".to_string()]);
        assert_eq!(path.aspect(), "manifest");
        assert!(path.params().is_empty());
    }

    #[test]
    fn test_nested_segments_and_params() {
        let path = parse_path("self.memory.episodes.recall[limit=5,topic=rust]").unwrap();
        assert_eq!(path.context(), Context::Internal);
        assert_eq!(path.node_prefix(), "self.memory.episodes");
        assert_eq!(path.aspect(), "recall");
        assert_eq!(path.param("limit"), Some("5"));
        assert_eq!(path.param("topic"), Some("rust"));
    }

    #[test]
    fn test_param_values_are_trimmed() {
        let path = parse_path("concept.poem.refine[tone= wistful ]").unwrap();
        assert_eq!(path.param("tone"), Some("wistful"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_path(""), Err(ParseError::Empty));
    }

    #[test]
    fn test_unknown_context() {
        assert_eq!(
            parse_path("galaxy.star.manifest"),
            Err(ParseError::UnknownContext("galaxy".into()))
        );
    }

    #[test]
    fn test_missing_aspect() {
        assert!(matches!(
            parse_path("world.house"),
            Err(ParseError::MissingAspect(_))
        ));
        assert!(matches!(parse_path("world"), Err(ParseError::MissingAspect(_))));
    }

    #[test]
    fn test_empty_segment_reports_offset() {
        assert_eq!(
            parse_path("world..manifest"),
            Err(ParseError::Malformed {
                input: "world..manifest".into(),
                offset: 5
            })
        );
    }

    #[test]
    fn test_malformed_brackets() {
        for input in [
            "world.house.manifest[",
            "world.house.manifest[]",
            "world.house.manifest[a]",
            "world.house.manifest[a=1",
            "world.house.manifest[a=1,]",
            "world.house.manifest[a= ]",
        ] {
            assert_eq!(
                parse_path(input),
                Err(ParseError::MalformedParams(input.into())),
                "input {input}"
            );
        }
    }

    #[test]
    fn test_trailing_input_after_params() {
        assert!(matches!(
            parse_path("world.house.manifest[a=1]x"),
            Err(ParseError::Malformed { offset: 25, .. })
        ));
    }

    #[test]
    fn test_duplicate_keys() {
        assert_eq!(
            parse_path("world.house.manifest[a=1,a=2]"),
            Err(ParseError::DuplicateKey {
                input: "world.house.manifest[a=1,a=2]".into(),
                key: "a".into()
            })
        );
    }

    #[test]
    fn test_prefix_parsing() {
        let (context, segments) = parse_prefix("world.house.kitchen").unwrap();
        assert_eq!(context, Context::World);
        assert_eq!(segments, vec!["house", "kitchen"]);

        assert!(parse_prefix("world").is_err());
        assert!(parse_prefix("world.house[a=1]").is_err());
        assert!(parse_prefix("attic.house").is_err());
    }
}
