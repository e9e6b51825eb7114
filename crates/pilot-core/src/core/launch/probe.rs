//! Privilege mode detection by running a tiny command inside the sandbox.

use pilot_domain::{BindList, IdMapping, PrivilegeMode};
use pilot_runtime::ProcessEnv;
use tempfile::TempDir;
use tracing::{debug, warn};

use super::invocation::{build_invocation, InvocationRequest, LaunchMode};
use crate::core::effects::CommandRunner;
use crate::core::tooling::errors::LaunchError;

const UID_MAP_TAG: &str = "uid_map:";
const MARKER_TAG: &str = "marker:";

/// Reports the first uid mapping line, then the container marker the
/// runtime exports when user namespaces are not in play.
const PROBE_SCRIPT: &str = concat!(
    "echo \"uid_map:$(head -n 1 /proc/self/uid_map 2>/dev/null)\"; ",
    "echo \"marker:${APPTAINER_CONTAINER:-$SINGULARITY_CONTAINER}\"",
);

/// Runs the probe command through `runtime` against `image` and classifies
/// the result.
///
/// The probe runs from a fresh scratch directory, removed when this returns.
pub fn probe_privilege_mode(
    runner: &dyn CommandRunner,
    runtime: &str,
    image: &str,
) -> Result<PrivilegeMode, LaunchError> {
    if runtime.trim().is_empty() || image.trim().is_empty() {
        return Err(LaunchError::ProbeFailed {
            reason: "runtime and image are both required".to_string(),
            output: None,
        });
    }
    let scratch = TempDir::new().map_err(|err| LaunchError::io("creating probe directory", err))?;
    let binds = BindList::default();
    let args = ["-c".to_string(), PROBE_SCRIPT.to_string()];
    let invocation = build_invocation(&InvocationRequest {
        runtime,
        image,
        binds: &binds,
        extra_opts: "",
        global_opts: "",
        mode: LaunchMode::Subprocess,
        workdir: scratch.path(),
        command: "/bin/sh",
        args: &args,
    })?;

    let output = runner
        .run(
            &invocation.program,
            &invocation.args,
            &ProcessEnv::Inherit,
            scratch.path(),
        )
        .map_err(|err| LaunchError::ProbeFailed {
            reason: format!("{err:#}"),
            output: None,
        })?;
    if output.code != 0 {
        return Err(LaunchError::ProbeFailed {
            reason: format!("probe exited with status {}", output.code),
            output: Some(output.stderr),
        });
    }

    let mode = classify_probe_output(&output.stdout).ok_or_else(|| LaunchError::ProbeFailed {
        reason: "no id mapping or container marker reported".to_string(),
        output: Some(output.stdout.clone()),
    })?;
    debug!(runtime, image, %mode, "privilege probe");
    Ok(mode)
}

/// Mapping line first; the marker alone means the runtime ran without a
/// user namespace, which only happens with real privileges.
fn classify_probe_output(stdout: &str) -> Option<PrivilegeMode> {
    let mut marker = false;
    for line in stdout.lines().map(str::trim) {
        if let Some(mapping) = line.strip_prefix(UID_MAP_TAG) {
            if let Some(mapping) = IdMapping::parse(mapping) {
                return Some(mapping.classify());
            }
        } else if let Some(value) = line.strip_prefix(MARKER_TAG) {
            marker |= !value.trim().is_empty();
        }
    }
    if marker {
        warn!("user namespace mapping unavailable; assuming privileged runtime");
        return Some(PrivilegeMode::Privileged);
    }
    None
}
