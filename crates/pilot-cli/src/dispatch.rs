use std::env;
use std::path::Path;

use pilot_core::binds::{resolve_binds, BindSources};
use pilot_core::effects::SystemRunner;
use pilot_core::image::{merge_legacy_images, select_image};
use pilot_core::launch::{
    launch, locate_runtime, probe_privilege_mode, resolve, LaunchMode, LaunchRequest,
    LocateRequest,
};
use pilot_core::{ExecutionOutcome, GlobalOptions, LaunchError, Settings};
use pilot_domain::{intersect, Dictionary, EnvOptionSet, ANY};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::{
    BindsArgs, CommandCli, EnvOptionsArgs, ImageArgs, IntersectArgs, LaunchArgs, LocateArgs,
    ProbeArgs, ResolveArgs, TargetArgs,
};

/// What a command produced: an envelope to print, or a status to exit with
/// straight away (a launched workload's own status).
pub enum Dispatched {
    Outcome(ExecutionOutcome),
    Exit(i32),
}

pub fn dispatch_command(global: &GlobalOptions, command: &CommandCli) -> Dispatched {
    let settings = match Settings::load(global.config.as_deref().map(Path::new)) {
        Ok(settings) => settings,
        Err(err) => return Dispatched::Outcome(ExecutionOutcome::from(&err)),
    };
    match command {
        CommandCli::Launch(args) => dispatch_launch(&settings, args),
        CommandCli::Resolve(args) => core_call(|| resolve_outcome(&settings, args)),
        CommandCli::Probe(args) => core_call(|| probe_outcome(args)),
        CommandCli::Locate(args) => core_call(|| locate_outcome(&settings, args)),
        CommandCli::Binds(args) => core_call(|| Ok(binds_outcome(&settings, args))),
        CommandCli::Image(args) => core_call(|| image_outcome(&settings, args)),
        CommandCli::Intersect(args) => core_call(|| intersect_outcome(args)),
        CommandCli::EnvOptions(args) => core_call(|| Ok(env_options_outcome(args))),
    }
}

fn core_call<F>(action: F) -> Dispatched
where
    F: FnOnce() -> Result<ExecutionOutcome, LaunchError>,
{
    Dispatched::Outcome(match action() {
        Ok(outcome) => outcome,
        Err(err) => ExecutionOutcome::from(&err),
    })
}

fn to_details(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// A value meant to be consumed by scripts: printed bare in human mode.
fn passthrough(message: impl Into<String>, mut details: Value) -> ExecutionOutcome {
    if let Value::Object(map) = &mut details {
        map.insert("passthrough".to_string(), Value::Bool(true));
    }
    ExecutionOutcome::success(message, details)
}

fn launch_request(
    target: &TargetArgs,
    command: &[String],
    mode: LaunchMode,
) -> Result<LaunchRequest, LaunchError> {
    let workdir = env::current_dir().map_err(|source| LaunchError::Io {
        context: "reading the working directory".to_string(),
        source,
    })?;
    Ok(LaunchRequest {
        mode,
        binds: target.binds.clone(),
        image: target.image.clone(),
        workdir,
        command: command.to_vec(),
    })
}

fn dispatch_launch(settings: &Settings, args: &LaunchArgs) -> Dispatched {
    let request = match launch_request(&args.target, &args.command, args.mode.into()) {
        Ok(request) => request,
        Err(err) => return Dispatched::Outcome(ExecutionOutcome::from(&err)),
    };
    if args.dry_run {
        return core_call(|| {
            let resolved = resolve(settings, &request)?;
            let mut lines = vec![resolved.invocation.command_line()];
            lines.extend(resolved.attributes.iter().map(ToString::to_string));
            Ok(passthrough(
                lines.join("\n"),
                json!({
                    "invocation": to_details(&resolved.invocation),
                    "attributes": to_details(&resolved.attributes),
                    "env_changes": to_details(&resolved.env_changes),
                }),
            ))
        });
    }
    match launch(settings, &request) {
        Ok(code) => Dispatched::Exit(code),
        Err(err) => Dispatched::Outcome(ExecutionOutcome::from(&err)),
    }
}

fn resolve_outcome(
    settings: &Settings,
    args: &ResolveArgs,
) -> Result<ExecutionOutcome, LaunchError> {
    let request = launch_request(&args.target, &args.command, LaunchMode::default())?;
    let resolved = resolve(settings, &request)?;
    let mode = resolved
        .runtime
        .mode
        .map_or_else(|| "unknown".to_string(), |mode| mode.to_string());
    Ok(ExecutionOutcome::success(
        format!(
            "{} via {} ({mode})",
            resolved.image.reference,
            resolved.runtime.path.display()
        ),
        to_details(&resolved),
    ))
}

fn probe_outcome(args: &ProbeArgs) -> Result<ExecutionOutcome, LaunchError> {
    let mode = probe_privilege_mode(&SystemRunner, &args.runtime, &args.image)?;
    Ok(passthrough(
        mode.as_str(),
        json!({ "mode": mode, "runtime": args.runtime, "image": args.image }),
    ))
}

fn locate_outcome(
    settings: &Settings,
    args: &LocateArgs,
) -> Result<ExecutionOutcome, LaunchError> {
    let hint = args.hint.as_deref().or(settings.runtime_hint.as_deref());
    let located = locate_runtime(
        &SystemRunner,
        &LocateRequest {
            hint,
            test_image: args.test_image.as_deref(),
            ..LocateRequest::default()
        },
    )?;
    let message = match located.mode {
        Some(mode) => format!("{} ({}, {mode})", located.path.display(), located.version),
        None => format!("{} ({})", located.path.display(), located.version),
    };
    Ok(ExecutionOutcome::success(message, to_details(&located)))
}

fn or_setting<'a>(arg: &'a Option<String>, setting: &'a str) -> &'a str {
    arg.as_deref().unwrap_or(setting)
}

fn binds_outcome(settings: &Settings, args: &BindsArgs) -> ExecutionOutcome {
    let defaults = args
        .defaults
        .clone()
        .unwrap_or_else(|| settings.shared_root.display().to_string());
    let resolved = resolve_binds(
        or_setting(&args.checks, &settings.bind_checks),
        &BindSources {
            overrides: args.overrides.as_deref().unwrap_or_default(),
            site_primary: or_setting(&args.primary, &settings.binds_primary),
            site_secondary: or_setting(&args.secondary, &settings.binds_secondary),
            defaults: &defaults,
        },
        &settings.shared_root,
    );
    passthrough(
        resolved.to_string(),
        json!({ "binds": to_details(&resolved), "count": resolved.len() }),
    )
}

fn image_outcome(settings: &Settings, args: &ImageArgs) -> Result<ExecutionOutcome, LaunchError> {
    let map = match args.map.as_deref() {
        Some(raw) => Dictionary::parse(raw),
        None => merge_legacy_images(&settings.images, &settings.legacy_images)?,
    };
    let selected = select_image(
        &map,
        args.platforms.as_deref().unwrap_or(ANY),
        or_setting(&args.restrictions, &settings.restrictions),
        &settings.shared_root,
    )?;
    Ok(passthrough(
        selected.reference.clone(),
        to_details(&selected),
    ))
}

fn intersect_outcome(args: &IntersectArgs) -> Result<ExecutionOutcome, LaunchError> {
    let common = intersect(&args.left, &args.right)?;
    Ok(passthrough(
        common.clone(),
        json!({ "left": args.left, "right": args.right, "result": common }),
    ))
}

fn env_options_outcome(args: &EnvOptionsArgs) -> ExecutionOutcome {
    let options = EnvOptionSet::normalize(&args.raw);
    passthrough(
        options.to_string(),
        json!({
            "options": to_details(&options),
            "clears_paths": options.clears_paths(),
        }),
    )
}
