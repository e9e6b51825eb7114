//! Launch orchestration: from settings and a job description to a runtime
//! invocation.

pub mod invocation;
pub mod locate;
pub mod probe;

use std::path::{Path, PathBuf};

use pilot_domain::{intersect, merge_lists, Attribute, BindList, EnvOptionSet, PrivilegeMode, ANY};
use pilot_runtime::ProcessEnv;
use serde::Serialize;
use tracing::{debug, info};

use self::invocation::{build_invocation, run_invocation, Invocation, InvocationRequest, LaunchMode};
use self::locate::{locate_runtime, LocateRequest, LocatedRuntime};
use crate::core::binds::{resolve_binds, BindSources};
use crate::core::config::Settings;
use crate::core::effects::{CommandRunner, SystemRunner};
use crate::core::env::context::{EnvChange, EnvContext};
use crate::core::env::policy::{
    compute_cleared_paths, compute_preserved_variables, normalize_options, PreservedEnv,
};
use crate::core::image::{merge_legacy_images, select_image, validate_image, SelectedImage};
use crate::core::jobad::{ClassAdFile, JobAdSource, JobDescription};
use crate::core::tooling::errors::LaunchError;

/// Platforms the workload can run on.
pub const REQUIRED_OS_ATTR: &str = "REQUIRED_OS";
/// Image the workload insists on, bypassing the platform map.
pub const IMAGE_ATTR: &str = "SingularityImage";
/// Whether the shared filesystem is bound by default.
pub const BIND_SHARED_ATTR: &str = "SingularityBindCVMFS";
/// Restrictions the workload adds to the site's.
pub const RESTRICTIONS_ATTR: &str = "ContainerRestrictions";
/// Platform reported for an image that did not come from the map.
pub const EXPLICIT_PLATFORM: &str = "explicit";
/// Runtime flag that starts the sandbox from an empty environment.
pub const CLEAN_ENV_FLAG: &str = "--cleanenv";

#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    pub mode: LaunchMode,
    /// Caller-supplied binds, highest precedence.
    pub binds: Vec<String>,
    pub image: Option<String>,
    pub workdir: PathBuf,
    /// Command and arguments; empty runs the image's default runscript.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedLaunch {
    pub platforms: String,
    pub restrictions: String,
    pub image: SelectedImage,
    pub binds: BindList,
    pub env_options: EnvOptionSet,
    pub clean_env: bool,
    pub preserved: PreservedEnv,
    pub runtime: LocatedRuntime,
    pub invocation: Invocation,
    pub attributes: Vec<Attribute>,
    pub env_changes: Vec<EnvChange>,
    #[serde(skip)]
    pub env: EnvContext,
}

/// Resolves everything a launch needs without running it.
///
/// Order: platforms, image, binds, runtime (located with the host search
/// path before it is cleared), environment policy, invocation.
pub fn resolve_launch(
    settings: &Settings,
    job: &dyn JobDescription,
    runner: &dyn CommandRunner,
    mut env: EnvContext,
    request: &LaunchRequest,
) -> Result<ResolvedLaunch, LaunchError> {
    let requested = job.get_string(REQUIRED_OS_ATTR, Some(ANY))?;
    let platforms = intersect(&settings.platforms, &requested)?;
    let job_restrictions = job.get_string(RESTRICTIONS_ATTR, Some(""))?;
    let restrictions = merge_lists(&[settings.restrictions.as_str(), job_restrictions.as_str()]);
    debug!(%platforms, %restrictions, "platforms resolved");

    let explicit = match request.image.as_deref().filter(|i| !i.trim().is_empty()) {
        Some(image) => Some(image.to_string()),
        None => {
            let from_job = job.get_string(IMAGE_ATTR, Some(""))?;
            Some(from_job).filter(|image| !image.is_empty())
        }
    };
    let image = match explicit {
        Some(reference) => {
            validate_image(&reference, &restrictions, &settings.shared_root)?;
            SelectedImage {
                platform: EXPLICIT_PLATFORM.to_string(),
                reference,
            }
        }
        None => {
            let map = merge_legacy_images(&settings.images, &settings.legacy_images)?;
            select_image(&map, &platforms, &restrictions, &settings.shared_root)?
        }
    };

    let overrides = request.binds.join(",");
    let defaults = if job.get_bool(BIND_SHARED_ATTR, true) {
        settings.shared_root.display().to_string()
    } else {
        String::new()
    };
    let binds = resolve_binds(
        &settings.bind_checks,
        &BindSources {
            overrides: &overrides,
            site_primary: &settings.binds_primary,
            site_secondary: &settings.binds_secondary,
            defaults: &defaults,
        },
        &settings.shared_root,
    );

    let search_path = env.var("PATH").map(str::to_string);
    let runtime = locate_runtime(
        runner,
        &LocateRequest {
            hint: settings.runtime_hint.as_deref(),
            test_image: Some(&image.reference),
            search_path: search_path.as_deref(),
            default_install: None,
        },
    )?;

    let env_options = normalize_options(&settings.container_env);
    let clean_env = compute_cleared_paths(&env_options, &mut env)?;
    let mode = runtime.mode.unwrap_or(PrivilegeMode::Unknown);
    for (key, value) in [
        ("PILOT_IMAGE", image.reference.clone()),
        ("PILOT_PLATFORM", image.platform.clone()),
        ("PILOT_RUNTIME_BINARY", runtime.path.display().to_string()),
        ("PILOT_PRIVILEGE_MODE", mode.to_string()),
        ("PILOT_CONTAINER_ENV", env_options.to_string()),
    ] {
        env.set(key, &value)?;
    }
    let preserved = compute_preserved_variables(&env_options, &mut env, job, &settings.env_prefix)?;

    let extra_opts = with_clean_env_flag(&settings.extra_opts, clean_env);
    let (command, args) = request
        .command
        .split_first()
        .map_or(("", &[][..]), |(command, args)| (command.as_str(), args));
    let program = runtime.path.display().to_string();
    let invocation = build_invocation(&InvocationRequest {
        runtime: &program,
        image: &image.reference,
        binds: &binds,
        extra_opts: &extra_opts,
        global_opts: &settings.global_opts,
        mode: request.mode,
        workdir: &request.workdir,
        command,
        args,
    })?;

    let attributes = scheduler_attributes(&runtime, mode, &image, &binds);
    info!(
        image = %image.reference,
        runtime = %runtime.path.display(),
        %mode,
        "launch resolved"
    );
    Ok(ResolvedLaunch {
        platforms,
        restrictions,
        image,
        binds,
        env_options,
        clean_env,
        preserved,
        runtime,
        invocation,
        attributes,
        env_changes: env.changes().to_vec(),
        env,
    })
}

fn with_clean_env_flag(extra_opts: &str, clean_env: bool) -> String {
    if !clean_env || extra_opts.split_whitespace().any(|o| o == CLEAN_ENV_FLAG) {
        return extra_opts.to_string();
    }
    let flagged = format!("{CLEAN_ENV_FLAG} {extra_opts}");
    flagged.trim_end().to_string()
}

/// Attribute triples the scheduler publishes for a resolved launch.
#[must_use]
pub fn scheduler_attributes(
    runtime: &LocatedRuntime,
    mode: PrivilegeMode,
    image: &SelectedImage,
    binds: &BindList,
) -> Vec<Attribute> {
    let path = runtime.path.display().to_string();
    let mut attributes = vec![
        Attribute::raw("HAS_SINGULARITY", "True"),
        Attribute::quoted("GWMS_SINGULARITY_PATH", path),
        Attribute::quoted("GWMS_SINGULARITY_VERSION", runtime.version.clone()),
        Attribute::quoted("GWMS_SINGULARITY_MODE", mode.as_str()),
        Attribute::quoted("GWMS_SINGULARITY_IMAGE", image.reference.clone()),
    ];
    if !binds.is_empty() {
        attributes.push(Attribute::quoted(
            "GWMS_SINGULARITY_BINDS",
            binds.to_string(),
        ));
    }
    attributes
}

/// Runs a resolved launch with its environment handed to the runtime
/// explicitly. Returns the status to exit with.
///
/// The cleared context only ever reaches the child; this process's own table
/// is untouched, so there are no search paths to restore afterwards.
pub fn run_resolved(resolved: &ResolvedLaunch, error_sink: Option<&Path>) -> i32 {
    let env = ProcessEnv::Exact(resolved.env.to_vec());
    run_invocation(&resolved.invocation, &env, error_sink)
}

/// Resolves against the live process environment and job description, then
/// runs.
pub fn launch(settings: &Settings, request: &LaunchRequest) -> Result<i32, LaunchError> {
    let job = ClassAdFile::open(&JobAdSource::from_option(settings.job_ad.as_deref()));
    let resolved = resolve_launch(
        settings,
        &job,
        &SystemRunner,
        EnvContext::capture(),
        request,
    )?;
    Ok(run_resolved(&resolved, settings.error_sink.as_deref()))
}

/// Same resolution as [`launch`], without running anything.
pub fn resolve(
    settings: &Settings,
    request: &LaunchRequest,
) -> Result<ResolvedLaunch, LaunchError> {
    let job = ClassAdFile::open(&JobAdSource::from_option(settings.job_ad.as_deref()));
    resolve_launch(
        settings,
        &job,
        &SystemRunner,
        EnvContext::capture(),
        request,
    )
}
