use std::path::Path;

use anyhow::Result;
use pilot_runtime::{ProcessEnv, RunOutput};

/// Captured command execution, the seam the prober and locator probe
/// runtimes through.
pub trait CommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        env: &ProcessEnv,
        cwd: &Path,
    ) -> Result<RunOutput>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        env: &ProcessEnv,
        cwd: &Path,
    ) -> Result<RunOutput> {
        pilot_runtime::run_command(program, args, env, cwd)
    }
}
