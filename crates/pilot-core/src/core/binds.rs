//! Bind-path resolution across the four configuration tiers.

use std::collections::HashSet;
use std::path::Path;

use pilot_domain::{BindList, BindSpec};
use tracing::{debug, warn};

/// Which checks a bind spec must pass, parsed from a flag string.
///
/// `e` the checked path exists, `c` it lives under the shared filesystem
/// root, `v` check the destination instead of the source, `d` a given
/// destination must exist as well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindChecks {
    pub exists: bool,
    pub shared_fs: bool,
    pub check_destination: bool,
    pub destination_exists: bool,
}

impl BindChecks {
    #[must_use]
    pub fn parse(flags: &str) -> Self {
        let mut checks = Self::default();
        for flag in flags.chars().filter(|c| !c.is_whitespace() && *c != ',') {
            match flag {
                'e' => checks.exists = true,
                'c' => checks.shared_fs = true,
                'v' => checks.check_destination = true,
                'd' => checks.destination_exists = true,
                other => warn!(flag = %other, "ignoring unknown bind check flag"),
            }
        }
        checks
    }

    fn validate(&self, spec: &BindSpec, shared_root: &Path) -> Result<(), &'static str> {
        let checked = if self.check_destination {
            spec.target()
        } else {
            spec.source.as_str()
        };
        let checked = Path::new(checked);
        if self.exists && !checked.exists() {
            return Err("path does not exist");
        }
        if self.shared_fs && !checked.starts_with(shared_root) {
            return Err("path is outside the shared filesystem");
        }
        if self.destination_exists {
            if let Some(destination) = &spec.destination {
                if !Path::new(destination).exists() {
                    return Err("destination does not exist");
                }
            }
        }
        Ok(())
    }
}

/// Bind lists from each tier, as comma-joined `src[:dst[:opt]]` strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindSources<'a> {
    /// Caller-supplied hard policy, highest precedence.
    pub overrides: &'a str,
    pub site_primary: &'a str,
    pub site_secondary: &'a str,
    /// Engine built-ins, lowest precedence.
    pub defaults: &'a str,
}

/// Merges the tiers in precedence order, drops specs that fail `checks` or
/// that target an already-claimed destination, and keeps the survivors in
/// order so the runtime's first-destination-wins rule sees the right spec
/// first.
#[must_use]
pub fn resolve_binds(checks: &str, sources: &BindSources<'_>, shared_root: &Path) -> BindList {
    let checks = BindChecks::parse(checks);
    let mut merged = BindList::default();
    for (tier, raw) in [
        ("override", sources.overrides),
        ("site", sources.site_primary),
        ("site-default", sources.site_secondary),
        ("built-in", sources.defaults),
    ] {
        let (list, rejected) = BindList::parse_lenient(raw);
        for err in rejected {
            warn!(tier, %err, "dropping malformed bind spec");
        }
        merged.extend(list);
    }

    let mut claimed = HashSet::new();
    let mut resolved = BindList::default();
    for spec in merged {
        if let Err(reason) = checks.validate(&spec, shared_root) {
            warn!(bind = %spec, reason, "dropping bind spec");
            continue;
        }
        if !claimed.insert(spec.target().to_string()) {
            debug!(bind = %spec, "destination already bound by an earlier spec");
            continue;
        }
        resolved.push(spec);
    }
    resolved
}
