//! Privilege mode classification from a sandbox's user-namespace mapping.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeMode {
    Unprivileged,
    Privileged,
    Fakeroot,
    Unknown,
}

impl PrivilegeMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PrivilegeMode::Unprivileged => "unprivileged",
            PrivilegeMode::Privileged => "privileged",
            PrivilegeMode::Fakeroot => "fakeroot",
            PrivilegeMode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PrivilegeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of `/proc/self/uid_map`: the id inside the namespace, the id it
/// maps to outside, and the range length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapping {
    pub inner: u64,
    pub outer: u64,
    pub count: u64,
}

impl IdMapping {
    /// Parses a mapping line with fields separated by commas and/or
    /// whitespace (`0,1000,1`, `         0       1000          1`,
    /// `,0,0,4294967295`).
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .map(str::parse::<u64>);
        let inner = fields.next()?.ok()?;
        let outer = fields.next()?.ok()?;
        let count = fields.next()?.ok()?;
        Some(Self {
            inner,
            outer,
            count,
        })
    }

    #[must_use]
    pub fn classify(&self) -> PrivilegeMode {
        match (self.inner, self.outer) {
            (0, 0) => PrivilegeMode::Privileged,
            (0, _) => PrivilegeMode::Fakeroot,
            _ => PrivilegeMode::Unprivileged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(line: &str) -> PrivilegeMode {
        IdMapping::parse(line).expect("mapping").classify()
    }

    #[test]
    fn classifies_mapping_lines() {
        assert_eq!(classify("0,0,4294967295"), PrivilegeMode::Privileged);
        assert_eq!(classify("0,1000,1"), PrivilegeMode::Fakeroot);
        assert_eq!(classify("1000,0,1"), PrivilegeMode::Unprivileged);
    }

    #[test]
    fn accepts_proc_spacing() {
        assert_eq!(
            classify("         0          0 4294967295"),
            PrivilegeMode::Privileged
        );
        assert_eq!(classify(",0,1000,1"), PrivilegeMode::Fakeroot);
    }

    #[test]
    fn rejects_partial_lines() {
        assert!(IdMapping::parse("").is_none());
        assert!(IdMapping::parse("0,0").is_none());
        assert!(IdMapping::parse("a,b,c").is_none());
    }
}
