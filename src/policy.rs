//! Path patterns and the public/protected rule table evaluated before the
//! authentication filter.
//!
//! Patterns follow the Ant style used by the services behind the gateway:
//! `/auth/**` matches `/auth` and everything beneath it, `*` matches exactly
//! one segment, anything else compares literally.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    descendants: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path pattern {pattern:?}: {reason}")]
pub struct PatternError {
    pub pattern: String,
    pub reason: &'static str,
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let fail = |reason| PatternError {
            pattern: raw.to_string(),
            reason,
        };

        if !raw.starts_with('/') {
            return Err(fail("must start with '/'"));
        }

        let mut parts: Vec<&str> = split_segments(raw).collect();
        let descendants = parts.last() == Some(&"**");
        if descendants {
            parts.pop();
        }

        let segments = parts
            .into_iter()
            .map(|part| match part {
                "*" => Ok(Segment::Any),
                "**" => Err(fail("'**' is only allowed as the last segment")),
                literal => Ok(Segment::Literal(literal.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
            descendants,
        })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PathPattern {
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = split_segments(path).collect();

        if parts.len() < self.segments.len()
            || (!self.descendants && parts.len() != self.segments.len())
        {
            return false;
        }

        self.segments
            .iter()
            .zip(&parts)
            .all(|(segment, part)| match segment {
                Segment::Any => true,
                Segment::Literal(literal) => literal == part,
            })
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

/// Canonical form of a request path, shared by the policy, the route table
/// and the upstream URL. Empty segments collapse; a trailing slash is kept.
///
/// Returns `None` for paths a downstream URL parser could resolve to a
/// different location: dot segments (literal or percent-encoded),
/// backslashes and encoded separators.
pub fn normalize_path(path: &str) -> Option<String> {
    let mut normalized = String::with_capacity(path.len());
    for part in split_segments(path) {
        if is_ambiguous_segment(part) {
            return None;
        }
        normalized.push('/');
        normalized.push_str(part);
    }
    if normalized.is_empty() || path.ends_with('/') {
        normalized.push('/');
    }
    Some(normalized)
}

fn is_ambiguous_segment(segment: &str) -> bool {
    let lower = segment.to_ascii_lowercase();
    if lower.contains('\\') || lower.contains("%2f") || lower.contains("%5c") {
        return true;
    }
    matches!(lower.replace("%2e", ".").as_str(), "." | "..")
}

/// Parses a comma separated pattern list, skipping blanks.
pub fn parse_patterns(list: &str) -> Result<Vec<PathPattern>, PatternError> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::parse)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

/// Ordered rule table. The first matching rule decides; unmatched paths
/// require authentication.
#[derive(Debug, Clone, Default)]
pub struct SecurityPolicy {
    rules: Vec<(PathPattern, Access)>,
}

impl SecurityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_public_paths(patterns: impl IntoIterator<Item = PathPattern>) -> Self {
        patterns
            .into_iter()
            .fold(Self::new(), |policy, pattern| policy.rule(pattern, Access::Public))
    }

    pub fn rule(mut self, pattern: PathPattern, access: Access) -> Self {
        self.rules.push((pattern, access));
        self
    }

    pub fn access(&self, path: &str) -> Access {
        self.rules
            .iter()
            .find(|(pattern, _)| pattern.matches(path))
            .map(|(_, access)| *access)
            .unwrap_or(Access::Authenticated)
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.access(path) == Access::Public
    }
}
