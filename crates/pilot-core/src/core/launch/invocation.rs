use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use pilot_domain::BindList;
use pilot_runtime::{exec_replace, run_command_passthrough, spawn_failure_code, ProcessEnv};
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::tooling::errors::LaunchError;

/// Where the caller's working directory appears inside the sandbox.
pub const SANDBOX_WORKDIR: &str = "/srv";
/// IPC and PID namespace isolation, applied to every invocation.
pub const ISOLATION_FLAGS: [&str; 2] = ["--ipc", "--pid"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Replace the current process with the runtime.
    #[default]
    Exec,
    /// Run the runtime as a child and propagate its status.
    Subprocess,
}

impl LaunchMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LaunchMode::Exec => "exec",
            LaunchMode::Subprocess => "subprocess",
        }
    }
}

impl fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LaunchMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "exec" => Ok(LaunchMode::Exec),
            "subprocess" => Ok(LaunchMode::Subprocess),
            other => Err(format!("unknown launch mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InvocationRequest<'a> {
    pub runtime: &'a str,
    pub image: &'a str,
    pub binds: &'a BindList,
    /// Whitespace-separated options placed after the verb.
    pub extra_opts: &'a str,
    /// Whitespace-separated options placed before the verb.
    pub global_opts: &'a str,
    pub mode: LaunchMode,
    /// Host directory bound as the sandbox home and working directory.
    pub workdir: &'a Path,
    pub command: &'a str,
    pub args: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub mode: LaunchMode,
    pub workdir: PathBuf,
}

impl Invocation {
    /// Shell-style rendering for logs and dry runs.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|word| {
                if word.is_empty() || word.contains(char::is_whitespace) {
                    format!("'{word}'")
                } else {
                    word.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Assembles the runtime argument vector.
///
/// Layout: global options, `exec` (or `run` when there is no command), extra
/// options, home and working directory, isolation flags, binds, image,
/// command and arguments.
pub fn build_invocation(request: &InvocationRequest<'_>) -> Result<Invocation, LaunchError> {
    if request.runtime.trim().is_empty() {
        return Err(LaunchError::InvalidInvocation {
            reason: "runtime binary is empty",
        });
    }
    if request.image.trim().is_empty() {
        return Err(LaunchError::InvalidInvocation {
            reason: "image is empty",
        });
    }
    if request.command.is_empty() && !request.args.is_empty() {
        return Err(LaunchError::InvalidInvocation {
            reason: "arguments given without a command",
        });
    }

    let mut args: Vec<String> = request
        .global_opts
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let verb = match request.command {
        "" => "run",
        _ => "exec",
    };
    args.push(verb.to_string());
    args.extend(request.extra_opts.split_whitespace().map(str::to_string));
    args.push("--home".to_string());
    args.push(format!("{}:{SANDBOX_WORKDIR}", request.workdir.display()));
    args.push("--pwd".to_string());
    args.push(SANDBOX_WORKDIR.to_string());
    args.extend(ISOLATION_FLAGS.iter().map(|flag| (*flag).to_string()));
    if !request.binds.is_empty() {
        args.push("--bind".to_string());
        args.push(request.binds.to_string());
    }
    args.push(request.image.to_string());
    if !request.command.is_empty() {
        args.push(request.command.to_string());
        args.extend(request.args.iter().cloned());
    }

    Ok(Invocation {
        program: request.runtime.to_string(),
        args,
        mode: request.mode,
        workdir: request.workdir.to_path_buf(),
    })
}

/// Runs an invocation and returns the status the caller should exit with.
///
/// In exec mode this only returns when the process could not be replaced.
/// Failed launches are reported to `error_sink` when one is configured.
pub fn run_invocation(
    invocation: &Invocation,
    env: &ProcessEnv,
    error_sink: Option<&Path>,
) -> i32 {
    debug!(command = %invocation.command_line(), mode = %invocation.mode, "launching");
    match invocation.mode {
        LaunchMode::Exec => {
            let err = exec_replace(
                &invocation.program,
                &invocation.args,
                env,
                &invocation.workdir,
            );
            let code = spawn_failure_code(&err);
            report_failure(
                error_sink,
                &format!("failed to exec {}: {err}", invocation.program),
            );
            code
        }
        LaunchMode::Subprocess => match run_command_passthrough(
            &invocation.program,
            &invocation.args,
            env,
            &invocation.workdir,
        ) {
            Ok(0) => 0,
            Ok(code) => {
                report_failure(
                    error_sink,
                    &format!("{} exited with status {code}", invocation.program),
                );
                code
            }
            Err(err) => {
                let code = err
                    .downcast_ref::<io::Error>()
                    .map_or(1, spawn_failure_code);
                report_failure(error_sink, &format!("{err:#}"));
                code
            }
        },
    }
}

fn report_failure(error_sink: Option<&Path>, message: &str) {
    warn!(%message, "container launch failed");
    let Some(path) = error_sink else {
        return;
    };
    if let Err(err) = append_line(path, &format!("pilot: {message}")) {
        warn!(%err, path = %path.display(), "failed to write error sink");
    }
}

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn request<'a>(
        binds: &'a BindList,
        command: &'a str,
        args: &'a [String],
    ) -> InvocationRequest<'a> {
        InvocationRequest {
            runtime: "/usr/bin/apptainer",
            image: "/cvmfs/img/el7",
            binds,
            extra_opts: "--cleanenv --nv",
            global_opts: "--silent",
            mode: LaunchMode::Subprocess,
            workdir: Path::new("/scratch/job"),
            command,
            args,
        }
    }

    #[test]
    fn argument_layout() {
        let binds = BindList::parse_lenient("/cvmfs,/data:/in:ro").0;
        let args = vec!["-c".to_string(), "echo hi".to_string()];
        let invocation = build_invocation(&request(&binds, "/bin/sh", &args)).unwrap();
        assert_eq!(
            invocation.args,
            vec![
                "--silent",
                "exec",
                "--cleanenv",
                "--nv",
                "--home",
                "/scratch/job:/srv",
                "--pwd",
                "/srv",
                "--ipc",
                "--pid",
                "--bind",
                "/cvmfs,/data:/in:ro",
                "/cvmfs/img/el7",
                "/bin/sh",
                "-c",
                "echo hi",
            ]
        );
        assert_eq!(
            invocation.command_line(),
            "/usr/bin/apptainer --silent exec --cleanenv --nv --home /scratch/job:/srv --pwd /srv \
             --ipc --pid --bind /cvmfs,/data:/in:ro /cvmfs/img/el7 /bin/sh -c 'echo hi'"
        );
    }

    #[test]
    fn empty_binds_and_command_use_runscript() {
        let binds = BindList::default();
        let invocation = build_invocation(&request(&binds, "", &[])).unwrap();
        assert!(!invocation.args.contains(&"--bind".to_string()));
        assert_eq!(invocation.args[1], "run");
        assert_eq!(
            invocation.args.last().map(String::as_str),
            Some("/cvmfs/img/el7")
        );
    }

    #[test]
    fn rejects_incomplete_requests() {
        let binds = BindList::default();
        let args = vec!["x".to_string()];
        assert!(matches!(
            build_invocation(&request(&binds, "", &args)),
            Err(LaunchError::InvalidInvocation { .. })
        ));
        let mut no_runtime = request(&binds, "true", &[]);
        no_runtime.runtime = "";
        assert!(build_invocation(&no_runtime).is_err());
        let mut no_image = request(&binds, "true", &[]);
        no_image.image = " ";
        assert!(build_invocation(&no_image).is_err());
    }

    #[test]
    fn launch_mode_parses() {
        assert_eq!("exec".parse::<LaunchMode>(), Ok(LaunchMode::Exec));
        assert_eq!(
            "subprocess".parse::<LaunchMode>(),
            Ok(LaunchMode::Subprocess)
        );
        assert!("fork".parse::<LaunchMode>().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn subprocess_status_propagates_and_is_reported() {
        let dir = tempdir().unwrap();
        let sink = dir.path().join("errors");
        let invocation = Invocation {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), "exit 3".into()],
            mode: LaunchMode::Subprocess,
            workdir: dir.path().to_path_buf(),
        };
        assert_eq!(
            run_invocation(&invocation, &ProcessEnv::Inherit, Some(&sink)),
            3
        );
        let logged = fs::read_to_string(&sink).unwrap();
        assert!(logged.contains("exited with status 3"), "{logged}");

        let ok = Invocation {
            args: vec!["-c".into(), "exit 0".into()],
            ..invocation
        };
        assert_eq!(run_invocation(&ok, &ProcessEnv::Inherit, Some(&sink)), 0);
        assert_eq!(fs::read_to_string(&sink).unwrap().lines().count(), 1);
    }

    #[test]
    fn missing_runtime_maps_to_shell_status() {
        let dir = tempdir().unwrap();
        let invocation = Invocation {
            program: dir.path().join("no-such-runtime").display().to_string(),
            args: Vec::new(),
            mode: LaunchMode::Subprocess,
            workdir: dir.path().to_path_buf(),
        };
        assert_eq!(run_invocation(&invocation, &ProcessEnv::Inherit, None), 127);
    }
}
