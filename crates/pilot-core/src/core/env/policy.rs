//! What crosses the sandbox boundary.
//!
//! Three steps run against an [`EnvContext`]: clearing the host search
//! paths, exporting the variables the workload must still see under the
//! runtime's injection prefix, and restoring the search paths afterwards.

use indexmap::IndexSet;
use pilot_domain::{EnvOption, EnvOptionSet};
use serde::Serialize;
use tracing::{debug, warn};

use super::context::EnvContext;
use crate::core::jobad::JobDescription;
use crate::core::tooling::errors::LaunchError;

/// Executable, dynamic-library and interpreter search paths.
pub const SEARCH_PATH_VARS: [&str; 3] = ["PATH", "LD_LIBRARY_PATH", "PYTHONPATH"];
/// Cleared search paths are parked under this prefix until restored.
pub const BACKUP_PREFIX: &str = "PILOT_OLDENV_";
/// Scheduler-internal variables.
pub const CONDOR_PREFIX: &str = "_CONDOR_";

/// Variables the engine itself sets for the workload; always exported.
pub const CORE_VARS: &[&str] = &[
    "PILOT_DIR",
    "PILOT_VERSION",
    "PILOT_IMAGE",
    "PILOT_PLATFORM",
    "PILOT_PRIVILEGE_MODE",
    "PILOT_RUNTIME_BINARY",
    "PILOT_CONTAINER_ENV",
];

/// Pilot identity, exported with `gwmsset`.
pub const GWMS_VARS: &[&str] = &[
    "GLIDEIN_Site",
    "GLIDEIN_Name",
    "GLIDEIN_Factory",
    "GLIDEIN_Entry_Name",
    "GLIDEIN_ResourceName",
    "GLIDEIN_Country",
    "GLIDEIN_CPUS",
    "GLIDEIN_Job_Max_Time",
];

/// Fleet policy variables, exported with `osgset`.
pub const OSG_VARS: &[&str] = &[
    "OSG_SITE_NAME",
    "OSG_SITE_READ",
    "OSG_SITE_WRITE",
    "OSG_WN_TMP",
    "OSG_APP",
    "OSG_DATA",
    "OSG_GRID",
    "OSG_SQUID_LOCATION",
    "OSG_DEFAULT_SE",
    "OSG_STORAGE_ELEMENT",
    "OSG_MACHINE_GPUS",
    "OSGVO_PROJECT_NAME",
    "OSGVO_SUBMITTER",
    "STASHCACHE",
    "STASHCACHE_WRITABLE",
    "X509_USER_PROXY",
    "X509_CERT_DIR",
];

#[must_use]
pub fn normalize_options(raw: &str) -> EnvOptionSet {
    EnvOptionSet::normalize(raw)
}

fn backup_name(var: &str) -> String {
    format!("{BACKUP_PREFIX}{var}")
}

/// Parks and unsets the search paths when a clearing option is active.
///
/// Returns whether the runtime's clean-environment flag should be passed as
/// well, which is the case for `clearall`.
pub fn compute_cleared_paths(
    options: &EnvOptionSet,
    ctx: &mut EnvContext,
) -> Result<bool, LaunchError> {
    if options.clears_paths() {
        for var in SEARCH_PATH_VARS {
            let backup = backup_name(var);
            // A backup inherited from an outer launch would be restored as if
            // it were ours.
            if ctx.unset(&backup).is_some() {
                debug!(var = %backup, "dropped stale search path backup");
            }
            let Some(value) = ctx.var(var).map(str::to_string) else {
                continue;
            };
            ctx.set(&backup, &value)?;
            ctx.unset(var);
            debug!(var, "cleared host search path");
        }
    }
    Ok(options.contains(EnvOption::ClearAll))
}

/// Puts back the search paths parked by [`compute_cleared_paths`]. Safe to
/// call when nothing was cleared, or twice.
pub fn restore(options: &EnvOptionSet, ctx: &mut EnvContext) -> Result<(), LaunchError> {
    if !options.clears_paths() {
        return Ok(());
    }
    for var in SEARCH_PATH_VARS {
        if let Some(value) = ctx.unset(&backup_name(var)) {
            ctx.set(var, &value)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreservedEnv {
    /// Injection names exported by this call.
    pub exported: Vec<String>,
    /// Variables whose injection name an operator had already set.
    pub operator_set: Vec<String>,
    /// Declared job variables refused because they carry the injection
    /// prefix themselves.
    pub rejected: Vec<String>,
}

/// Exports every variable the options select as `{prefix}{name}`.
///
/// Selection: the core set always; the pilot identity set with `gwmsset`;
/// the fleet set with `osgset`; with `condorset` every `_CONDOR_*` host
/// variable plus every name the job description declares. A declared name
/// that already starts with `prefix` is treated as an injection attempt: it
/// is not exported and is unset from the context. Variables set to an empty
/// string are exported; an injection name already present is left alone.
pub fn compute_preserved_variables(
    options: &EnvOptionSet,
    ctx: &mut EnvContext,
    job: &dyn JobDescription,
    prefix: &str,
) -> Result<PreservedEnv, LaunchError> {
    let mut preserved = PreservedEnv::default();
    let mut selected: IndexSet<String> = CORE_VARS.iter().map(|v| (*v).to_string()).collect();
    if options.contains(EnvOption::GwmsSet) {
        selected.extend(GWMS_VARS.iter().map(|v| (*v).to_string()));
    }
    if options.contains(EnvOption::OsgSet) {
        selected.extend(OSG_VARS.iter().map(|v| (*v).to_string()));
    }
    if options.contains(EnvOption::CondorSet) || options.contains(EnvOption::OsgSet) {
        selected.extend(ctx.names_with_prefix(CONDOR_PREFIX));
        for name in job.declared_env_names() {
            if name.starts_with(prefix) {
                warn!(
                    var = %name,
                    "job declares a variable with the sandbox injection prefix; dropping it"
                );
                ctx.unset(&name);
                preserved.rejected.push(name);
                continue;
            }
            selected.insert(name);
        }
    }

    for var in selected {
        let Some(value) = ctx.var(&var).map(str::to_string) else {
            continue;
        };
        let injected = format!("{prefix}{var}");
        if ctx.is_set(&injected) {
            debug!(var = %injected, "keeping operator-set injection variable");
            preserved.operator_set.push(var);
            continue;
        }
        ctx.set(&injected, &value)?;
        preserved.exported.push(injected);
    }
    Ok(preserved)
}
