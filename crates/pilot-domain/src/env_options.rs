//! The container environment option vocabulary.
//!
//! A raw option string such as `clear,keepall` is normalised into an
//! [`EnvOptionSet`]: `clear` pulls in `clearall,gwmsset,osgset,condorset`,
//! `osgset` pulls in `condorset`, an empty string means `clearpaths`, and
//! `keepall` is dropped when any `clear*` option is present.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnvOption {
    ClearAll,
    CondorSet,
    OsgSet,
    GwmsSet,
    Clear,
    ClearPaths,
    KeepAll,
}

impl EnvOption {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EnvOption::ClearAll => "clearall",
            EnvOption::CondorSet => "condorset",
            EnvOption::OsgSet => "osgset",
            EnvOption::GwmsSet => "gwmsset",
            EnvOption::Clear => "clear",
            EnvOption::ClearPaths => "clearpaths",
            EnvOption::KeepAll => "keepall",
        }
    }

    fn is_clearing(self) -> bool {
        matches!(
            self,
            EnvOption::Clear | EnvOption::ClearAll | EnvOption::ClearPaths
        )
    }
}

impl FromStr for EnvOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "clearall" => EnvOption::ClearAll,
            "condorset" => EnvOption::CondorSet,
            "osgset" => EnvOption::OsgSet,
            "gwmsset" => EnvOption::GwmsSet,
            "clear" => EnvOption::Clear,
            "clearpaths" => EnvOption::ClearPaths,
            "keepall" => EnvOption::KeepAll,
            other => return Err(other.to_string()),
        })
    }
}

impl fmt::Display for EnvOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOptionSet {
    options: BTreeSet<EnvOption>,
}

impl EnvOptionSet {
    /// Normalises a raw comma-separated option string.
    ///
    /// Unknown tokens are dropped with a warning, never an error.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        let mut options = BTreeSet::new();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.parse::<EnvOption>() {
                Ok(option) => {
                    options.insert(option);
                }
                Err(unknown) => warn!(option = %unknown, "ignoring unknown container env option"),
            }
        }
        if options.is_empty() {
            options.insert(EnvOption::ClearPaths);
            return Self { options };
        }
        if options.contains(&EnvOption::Clear) {
            options.extend([
                EnvOption::ClearAll,
                EnvOption::GwmsSet,
                EnvOption::OsgSet,
                EnvOption::CondorSet,
            ]);
        }
        if options.contains(&EnvOption::OsgSet) {
            options.insert(EnvOption::CondorSet);
        }
        if options.contains(&EnvOption::KeepAll) && options.iter().any(|o| o.is_clearing()) {
            warn!(
                options = raw,
                "keepall conflicts with clearing options; keepall will be ignored"
            );
            options.remove(&EnvOption::KeepAll);
        }
        Self { options }
    }

    #[must_use]
    pub fn contains(&self, option: EnvOption) -> bool {
        self.options.contains(&option)
    }

    /// True when the host search paths must be cleared.
    #[must_use]
    pub fn clears_paths(&self) -> bool {
        self.contains(EnvOption::ClearAll) || self.contains(EnvOption::ClearPaths)
    }

    pub fn iter(&self) -> impl Iterator<Item = EnvOption> + '_ {
        self.options.iter().copied()
    }
}

impl fmt::Display for EnvOptionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.options.iter().map(|o| o.as_str()).collect();
        f.write_str(&joined.join(","))
    }
}

impl Serialize for EnvOptionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
