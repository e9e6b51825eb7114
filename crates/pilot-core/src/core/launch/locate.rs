//! Finding a usable container runtime binary.
//!
//! Strategies run in a fixed order and the first candidate that reports a
//! version (and, when asked, passes a privilege probe) wins. Every attempt is
//! recorded so a total failure can tell the operator exactly where we looked.

use std::env;
use std::path::{Path, PathBuf};

use pilot_domain::PrivilegeMode;
use pilot_runtime::ProcessEnv;
use serde::Serialize;
use tracing::debug;

use super::probe::probe_privilege_mode;
use crate::core::effects::CommandRunner;
use crate::core::tooling::errors::LaunchError;

/// Binary names tried in each directory, preferred first.
pub const RUNTIME_NAMES: [&str; 2] = ["apptainer", "singularity"];
/// Where the shared software repository publishes the runtime.
pub const DEFAULT_INSTALL_DIR: &str =
    "/cvmfs/oasis.opensciencegrid.org/mis/singularity/current/bin";
/// Environment module loaded by the last-resort strategy.
pub const RUNTIME_MODULE: &str = "singularity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocateStrategy {
    Hint,
    DefaultInstall,
    SearchPath,
    Module,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocateAttempt {
    pub strategy: LocateStrategy,
    pub candidate: Option<String>,
    pub outcome: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocatedRuntime {
    pub path: PathBuf,
    pub version: String,
    /// Set when a test image was probed.
    pub mode: Option<PrivilegeMode>,
    pub strategy: LocateStrategy,
    pub attempts: Vec<LocateAttempt>,
}

#[derive(Debug, Clone, Default)]
pub struct LocateRequest<'a> {
    /// Directory holding the runtime, or the runtime binary itself.
    pub hint: Option<&'a Path>,
    pub test_image: Option<&'a str>,
    /// Search path for the generic lookup; the process `PATH` when unset.
    pub search_path: Option<&'a str>,
    /// Overrides [`DEFAULT_INSTALL_DIR`].
    pub default_install: Option<&'a Path>,
}

struct Verified {
    version: String,
    mode: Option<PrivilegeMode>,
}

struct Locator<'a> {
    runner: &'a dyn CommandRunner,
    request: &'a LocateRequest<'a>,
    attempts: Vec<LocateAttempt>,
}

impl Locator<'_> {
    fn record(&mut self, strategy: LocateStrategy, candidate: Option<&Path>, outcome: String) {
        debug!(
            ?strategy,
            candidate = candidate.map(|p| p.display().to_string()),
            %outcome,
            "runtime locate attempt"
        );
        self.attempts.push(LocateAttempt {
            strategy,
            candidate: candidate.map(|p| p.display().to_string()),
            outcome,
        });
    }

    fn try_candidate(&mut self, strategy: LocateStrategy, path: &Path) -> Option<Verified> {
        if !path.is_file() {
            self.record(strategy, Some(path), "not found".to_string());
            return None;
        }
        match self.verify(path) {
            Ok(verified) => {
                self.record(strategy, Some(path), "ok".to_string());
                Some(verified)
            }
            Err(reason) => {
                self.record(strategy, Some(path), reason);
                None
            }
        }
    }

    fn verify(&self, path: &Path) -> Result<Verified, String> {
        let program = path.display().to_string();
        let output = self
            .runner
            .run(
                &program,
                &["--version".to_string()],
                &self.process_env(),
                &scratch_cwd(),
            )
            .map_err(|err| format!("version check failed: {err:#}"))?;
        let version = output.stdout.lines().next().unwrap_or_default().trim();
        if output.code != 0 || version.is_empty() {
            return Err(format!(
                "version check failed with status {}",
                output.code
            ));
        }
        let mode = match self.request.test_image {
            Some(image) => Some(
                probe_privilege_mode(self.runner, &program, image)
                    .map_err(|err| format!("probe failed: {err}"))?,
            ),
            None => None,
        };
        Ok(Verified {
            version: version.to_string(),
            mode,
        })
    }

    fn search_path(&self) -> Option<String> {
        self.request
            .search_path
            .map(str::to_string)
            .or_else(|| env::var("PATH").ok())
    }

    fn process_env(&self) -> ProcessEnv {
        match self.request.search_path {
            Some(path) => ProcessEnv::Extend(vec![("PATH".to_string(), path.to_string())]),
            None => ProcessEnv::Inherit,
        }
    }

    fn in_directory(
        &mut self,
        strategy: LocateStrategy,
        dir: &Path,
    ) -> Option<(PathBuf, Verified)> {
        if dir.is_file() {
            return self
                .try_candidate(strategy, dir)
                .map(|verified| (dir.to_path_buf(), verified));
        }
        RUNTIME_NAMES.iter().find_map(|name| {
            let path = dir.join(name);
            self.try_candidate(strategy, &path)
                .map(|verified| (path, verified))
        })
    }

    fn on_search_path(&mut self) -> Option<(PathBuf, Verified)> {
        let search_path = self.search_path();
        RUNTIME_NAMES.iter().find_map(|name| {
            match which::which_in(name, search_path.as_deref(), scratch_cwd()) {
                Ok(path) => self
                    .try_candidate(LocateStrategy::SearchPath, &path)
                    .map(|verified| (path, verified)),
                Err(err) => {
                    self.record(LocateStrategy::SearchPath, None, format!("{name}: {err}"));
                    None
                }
            }
        })
    }

    fn via_module(&mut self) -> Option<(PathBuf, Verified)> {
        let script = format!(
            "module load {RUNTIME_MODULE} >/dev/null 2>&1 && command -v {RUNTIME_MODULE}"
        );
        let output = self.runner.run(
            "/bin/sh",
            &["-c".to_string(), script],
            &self.process_env(),
            &scratch_cwd(),
        );
        let found = match output {
            Ok(output) if output.code == 0 => output
                .stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(PathBuf::from),
            Ok(output) => {
                self.record(
                    LocateStrategy::Module,
                    None,
                    format!("module load exited with status {}", output.code),
                );
                return None;
            }
            Err(err) => {
                self.record(LocateStrategy::Module, None, format!("{err:#}"));
                return None;
            }
        };
        let Some(path) = found else {
            self.record(
                LocateStrategy::Module,
                None,
                "module provided no runtime".to_string(),
            );
            return None;
        };
        self.try_candidate(LocateStrategy::Module, &path)
            .map(|verified| (path, verified))
    }
}

fn scratch_cwd() -> PathBuf {
    env::temp_dir()
}

/// Tries the hint, the default install, the search path and finally the
/// environment module.
///
/// # Errors
/// Returns [`LaunchError::RuntimeNotFound`] carrying every attempt when no
/// strategy yields a working runtime.
pub fn locate_runtime(
    runner: &dyn CommandRunner,
    request: &LocateRequest<'_>,
) -> Result<LocatedRuntime, LaunchError> {
    let mut locator = Locator {
        runner,
        request,
        attempts: Vec::new(),
    };
    let default_install = request
        .default_install
        .map_or_else(|| PathBuf::from(DEFAULT_INSTALL_DIR), Path::to_path_buf);

    let found = match request.hint {
        Some(hint) => locator.in_directory(LocateStrategy::Hint, hint),
        None => {
            locator.record(LocateStrategy::Hint, None, "no hint given".to_string());
            None
        }
    }
    .map(|found| (LocateStrategy::Hint, found))
    .or_else(|| {
        locator
            .in_directory(LocateStrategy::DefaultInstall, &default_install)
            .map(|found| (LocateStrategy::DefaultInstall, found))
    })
    .or_else(|| {
        locator
            .on_search_path()
            .map(|found| (LocateStrategy::SearchPath, found))
    })
    .or_else(|| {
        locator
            .via_module()
            .map(|found| (LocateStrategy::Module, found))
    });

    match found {
        Some((strategy, (path, verified))) => Ok(LocatedRuntime {
            path,
            version: verified.version,
            mode: verified.mode,
            strategy,
            attempts: locator.attempts,
        }),
        None => Err(LaunchError::RuntimeNotFound {
            attempts: locator.attempts,
        }),
    }
}
