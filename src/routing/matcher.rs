//! Route pattern matching.
//!
//! # Responsibilities
//! - Parse `/literal/:param/literal` patterns into segments
//! - Match a URL path segment by segment, capturing named parameters
//!
//! # Design Decisions
//! - Segment counts must be equal; there are no wildcards or optional parts
//! - Literal segments compare byte for byte (case-sensitive, no decoding)
//! - A parameter segment matches any single segment, including an empty one
//! - No regex to guarantee O(segments) matching

use std::fmt;

use crate::http::Params;

/// Marker that turns a pattern segment into a named parameter.
pub const PARAM_MARKER: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// Parsed route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let segments = raw
            .split('/')
            .map(|segment| match segment.strip_prefix(PARAM_MARKER) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match `path`, returning the captured parameters on success.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut params = Params::new();
        let mut parts = path.split('/');

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Param(name) => params.insert(name.as_str(), part),
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for PathPattern {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for PathPattern {
    fn from(value: String) -> Self {
        Self::parse(value)
    }
}
