//! Field paths into JSON values
//!
//! A [`FieldPath`] is an ordered list of object keys and array indices,
//! rendered in dotted form (`findings.0.confidence`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Object property
    Key(String),
    /// Array element
    Index(usize),
}

impl PathSegment {
    /// Whether this segment addresses an array element
    #[inline]
    #[must_use]
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }

    /// Key name, if this is a key segment
    #[inline]
    #[must_use]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(k) => Some(k),
            Self::Index(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => f.write_str(k),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        Self::Key(s.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// Ordered path from the root of a value to a nested field
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(Vec<PathSegment>);

impl PartialOrd for PathSegment {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PathSegment {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Self::Index(a), Self::Index(b)) => a.cmp(b),
            (Self::Key(a), Self::Key(b)) => a.cmp(b),
            (Self::Index(_), Self::Key(_)) => std::cmp::Ordering::Less,
            (Self::Key(_), Self::Index(_)) => std::cmp::Ordering::Greater,
        }
    }
}

impl FieldPath {
    /// Empty path addressing the root value
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build from segments
    #[inline]
    #[must_use]
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Parse dotted notation; all-digit segments become indices
    #[must_use]
    pub fn parse_dotted(s: &str) -> Self {
        if s.is_empty() {
            return Self::root();
        }
        Self(
            s.split('.')
                .map(|seg| match seg.parse::<usize>() {
                    Ok(i) => PathSegment::Index(i),
                    Err(_) => PathSegment::Key(seg.to_string()),
                })
                .collect(),
        )
    }

    /// Child path with an extra key
    #[must_use]
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.0.push(PathSegment::Key(key.into()));
        next
    }

    /// Child path with an extra index
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.0.push(PathSegment::Index(index));
        next
    }

    /// Path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Final segment
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Nearest key segment, searching from the end
    ///
    /// `findings.0` resolves to `findings`, which is what field-name lookups want.
    #[must_use]
    pub fn last_key(&self) -> Option<&str> {
        self.0.iter().rev().find_map(PathSegment::as_key)
    }

    /// Path without its final segment
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this is the root path
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl<S: Into<PathSegment>> FromIterator<S> for FieldPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_roundtrip() {
        let path = FieldPath::parse_dotted("findings.0.confidence");
        assert_eq!(path.len(), 3);
        assert_eq!(path.segments()[1], PathSegment::Index(0));
        assert_eq!(path.to_string(), "findings.0.confidence");
    }

    #[test]
    fn last_key_skips_indices() {
        let path = FieldPath::root().key("findings").index(2);
        assert_eq!(path.last_key(), Some("findings"));
        assert!(path.last().is_some_and(PathSegment::is_index));
    }

    #[test]
    fn parent_of_root_is_none() {
        assert!(FieldPath::root().parent().is_none());
        let path = FieldPath::root().key("a").key("b");
        assert_eq!(path.parent(), Some(FieldPath::root().key("a")));
    }

    #[test]
    fn root_display() {
        assert_eq!(FieldPath::root().to_string(), "<root>");
    }
}
