//! Identifier - Composite identifiers for remote objects
//!
//! The log service has no single-field primary key spanning project,
//! resource and sub-resource, so remote objects are addressed by several
//! key fields joined with ':' (e.g., "project:dashboard" or
//! "project:config:machine_group"). Each resource type has a fixed arity.

use crate::provider::ProviderError;

/// Separator between identifier segments
pub const SEPARATOR: char = ':';

/// Errors from parsing or building a composite identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("Invalid identifier '{raw}': expected {expected} segments separated by ':', got {actual}")]
    SegmentCount {
        raw: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid identifier '{raw}': segment {index} is empty")]
    EmptySegment { raw: String, index: usize },

    #[error("Identifier segment '{segment}' must not contain ':'")]
    SeparatorInSegment { segment: String },
}

impl From<IdentifierError> for ProviderError {
    fn from(err: IdentifierError) -> Self {
        ProviderError::validation(err.to_string()).with_cause(err)
    }
}

/// A parsed composite identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    parts: Vec<String>,
}

impl CompositeId {
    /// Parse `raw`, requiring exactly `arity` non-empty segments
    pub fn parse(raw: &str, arity: usize) -> Result<Self, IdentifierError> {
        let parts: Vec<String> = raw.split(SEPARATOR).map(str::to_string).collect();
        if parts.len() != arity {
            return Err(IdentifierError::SegmentCount {
                raw: raw.to_string(),
                expected: arity,
                actual: parts.len(),
            });
        }
        if let Some(index) = parts.iter().position(|p| p.is_empty()) {
            return Err(IdentifierError::EmptySegment {
                raw: raw.to_string(),
                index,
            });
        }
        Ok(Self { parts })
    }

    /// Parse `raw` into exactly `N` segments
    pub fn split<const N: usize>(raw: &str) -> Result<[String; N], IdentifierError> {
        let id = Self::parse(raw, N)?;
        let actual = id.parts.len();
        id.parts
            .try_into()
            .map_err(|_| IdentifierError::SegmentCount {
                raw: raw.to_string(),
                expected: N,
                actual,
            })
    }

    /// Build an identifier from its segments
    pub fn from_parts<I, S>(parts: I) -> Result<Self, IdentifierError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        for (index, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(IdentifierError::EmptySegment {
                    raw: parts.join(":"),
                    index,
                });
            }
            if part.contains(SEPARATOR) {
                return Err(IdentifierError::SeparatorInSegment {
                    segment: part.clone(),
                });
            }
        }
        Ok(Self { parts })
    }

    /// Rebuild the identifier string
    pub fn build(&self) -> String {
        self.parts.join(":")
    }

    pub fn arity(&self) -> usize {
        self.parts.len()
    }

    pub fn part(&self, index: usize) -> Option<&str> {
        self.parts.get(index).map(String::as_str)
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

impl std::fmt::Display for CompositeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.build())
    }
}
