//! Bind-mount specifications in the runtime's `src[:dst[:opt]]` form.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::DomainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpec {
    pub source: String,
    pub destination: Option<String>,
    pub options: Option<String>,
}

impl BindSpec {
    /// The in-sandbox path this spec claims; the source when no destination
    /// is given.
    #[must_use]
    pub fn target(&self) -> &str {
        self.destination.as_deref().unwrap_or(&self.source)
    }
}

impl FromStr for BindSpec {
    type Err = DomainError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| DomainError::InvalidBindSpec {
            spec: raw.to_string(),
            reason,
        };
        let mut parts = raw.trim().splitn(3, ':');
        let source = parts.next().unwrap_or_default();
        if source.is_empty() {
            return Err(invalid("missing source path"));
        }
        let destination = parts.next().filter(|d| !d.is_empty());
        let options = parts.next().filter(|o| !o.is_empty());
        if options.is_some() && destination.is_none() {
            return Err(invalid("options given without a destination"));
        }
        Ok(Self {
            source: source.to_string(),
            destination: destination.map(str::to_string),
            options: options.map(str::to_string),
        })
    }
}

impl fmt::Display for BindSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)?;
        if let Some(destination) = &self.destination {
            write!(f, ":{destination}")?;
            if let Some(options) = &self.options {
                write!(f, ":{options}")?;
            }
        }
        Ok(())
    }
}

/// Ordered list of bind specs; order matters because the runtime lets the
/// first spec for a destination win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindList(Vec<BindSpec>);

impl BindList {
    /// Parses a comma-joined list, skipping blank entries and returning the
    /// entries that failed to parse alongside the list.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> (Self, Vec<DomainError>) {
        let mut specs = Vec::new();
        let mut rejected = Vec::new();
        for segment in raw.split(',').filter(|s| !s.trim().is_empty()) {
            match segment.parse::<BindSpec>() {
                Ok(spec) => specs.push(spec),
                Err(err) => rejected.push(err),
            }
        }
        (Self(specs), rejected)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BindSpec> {
        self.0.iter()
    }

    pub fn push(&mut self, spec: BindSpec) {
        self.0.push(spec);
    }

    pub fn extend(&mut self, other: BindList) {
        self.0.extend(other.0);
    }
}

impl FromIterator<BindSpec> for BindList {
    fn from_iter<T: IntoIterator<Item = BindSpec>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for BindList {
    type Item = BindSpec;
    type IntoIter = std::vec::IntoIter<BindSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for BindList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, spec) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{spec}")?;
        }
        Ok(())
    }
}

impl Serialize for BindList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_forms() {
        let spec: BindSpec = "/cvmfs".parse().unwrap();
        assert_eq!(spec.target(), "/cvmfs");
        let spec: BindSpec = "/data:/mnt/data".parse().unwrap();
        assert_eq!(spec.target(), "/mnt/data");
        let spec: BindSpec = "/data:/mnt/data:ro".parse().unwrap();
        assert_eq!(spec.options.as_deref(), Some("ro"));
        assert_eq!(spec.to_string(), "/data:/mnt/data:ro");
    }

    #[test]
    fn rejects_missing_source() {
        assert!(":/x".parse::<BindSpec>().is_err());
        assert!("/a::ro".parse::<BindSpec>().is_err());
    }

    #[test]
    fn lenient_list_keeps_order_and_reports_bad_entries() {
        let (list, rejected) = BindList::parse_lenient("/b:/x, ,/a,:/bad,/c:/y:ro");
        assert_eq!(list.to_string(), "/b:/x,/a,/c:/y:ro");
        assert_eq!(rejected.len(), 1);
    }
}
