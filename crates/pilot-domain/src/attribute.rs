//! Scheduler-visible attributes produced by a resolved launch.
//!
//! The engine only builds the triples; publishing them is the job of the
//! scheduler integration.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Integer,
    QuotedString,
    RawExpression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
    pub kind: AttributeKind,
}

impl Attribute {
    #[must_use]
    pub fn quoted(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: AttributeKind::QuotedString,
        }
    }

    #[must_use]
    pub fn raw(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: AttributeKind::RawExpression,
        }
    }

    #[must_use]
    pub fn integer(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
            kind: AttributeKind::Integer,
        }
    }
}

/// Renders the attribute as a ClassAd assignment.
impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AttributeKind::QuotedString => {
                let escaped = self.value.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "{} = \"{escaped}\"", self.key)
            }
            AttributeKind::Integer | AttributeKind::RawExpression => {
                write!(f, "{} = {}", self.key, self.value)
            }
        }
    }
}
