use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use pilot_core::launch::LaunchMode;

pub const PILOT_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

pub const PILOT_BEFORE_HELP: &str = concat!(
    "pilot ",
    env!("CARGO_PKG_VERSION"),
    " – resolve and launch a workload's container\n\n",
    "\x1b[1;36mLaunch\x1b[0m\n",
    "  launch           Resolve image, binds and environment, then start the runtime.\n",
    "  resolve          Show what `launch` would do, without running anything.\n\n",
    "\x1b[1;36mRuntime\x1b[0m\n",
    "  locate           Find a working apptainer/singularity and report where we looked.\n",
    "  probe            Detect the runtime's privilege mode against an image.\n\n",
    "\x1b[1;36mBuilding blocks\x1b[0m\n",
    "  binds            Resolve a bind list across override, site and built-in tiers.\n",
    "  image            Pick an image from a platform map.\n",
    "  intersect        Intersect two platform lists.\n",
    "  env-options      Normalise a container environment option string.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "pilot",
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = PILOT_BEFORE_HELP,
    help_template = PILOT_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct PilotCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        long,
        value_name = "PATH",
        help = "Site defaults file (TOML); overrides PILOT_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandCli {
    #[command(
        about = "Resolve the launch and start the container runtime.",
        override_usage = "pilot launch [--mode exec|subprocess] [--bind SPEC]... [--image REF] [--dry-run] [-- CMD [ARG...]]"
    )]
    Launch(LaunchArgs),
    #[command(
        about = "Resolve image, binds, environment and runtime without launching."
    )]
    Resolve(ResolveArgs),
    #[command(
        about = "Report the runtime's privilege mode for an image.",
        override_usage = "pilot probe --runtime PATH --image REF"
    )]
    Probe(ProbeArgs),
    #[command(
        about = "Locate a working container runtime.",
        override_usage = "pilot locate [--hint DIR] [--test-image REF]"
    )]
    Locate(LocateArgs),
    #[command(about = "Resolve a bind list from its four tiers.")]
    Binds(BindsArgs),
    #[command(
        about = "Select an image from a platform map.",
        override_usage = "pilot image --map DICT [--platforms LIST] [--restrictions LIST]"
    )]
    Image(ImageArgs),
    #[command(
        about = "Intersect two comma-separated platform lists.",
        override_usage = "pilot intersect <LEFT> <RIGHT>"
    )]
    Intersect(IntersectArgs),
    #[command(
        about = "Normalise a container environment option string.",
        override_usage = "pilot env-options <RAW>"
    )]
    EnvOptions(EnvOptionsArgs),
}

impl CommandCli {
    pub fn name(&self) -> &'static str {
        match self {
            CommandCli::Launch(_) => "launch",
            CommandCli::Resolve(_) => "resolve",
            CommandCli::Probe(_) => "probe",
            CommandCli::Locate(_) => "locate",
            CommandCli::Binds(_) => "binds",
            CommandCli::Image(_) => "image",
            CommandCli::Intersect(_) => "intersect",
            CommandCli::EnvOptions(_) => "env-options",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModeArg {
    #[default]
    Exec,
    Subprocess,
}

impl From<ModeArg> for LaunchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Exec => LaunchMode::Exec,
            ModeArg::Subprocess => LaunchMode::Subprocess,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    #[arg(
        long = "bind",
        value_name = "SPEC",
        help = "Extra bind src[:dst[:opt]]; wins over site and built-in binds"
    )]
    pub binds: Vec<String>,
    #[arg(
        long,
        value_name = "REF",
        help = "Use this image instead of the platform map"
    )]
    pub image: Option<String>,
}

#[derive(Args, Debug)]
pub struct LaunchArgs {
    #[arg(long, value_enum, default_value_t = ModeArg::Exec)]
    pub mode: ModeArg,
    #[command(flatten)]
    pub target: TargetArgs,
    #[arg(
        long,
        help = "Print the runtime invocation and attributes instead of running"
    )]
    pub dry_run: bool,
    #[arg(
        value_name = "CMD",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        num_args = 0..,
        help = "Command to run in the container followed by its arguments"
    )]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub target: TargetArgs,
    #[arg(
        value_name = "CMD",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        num_args = 0..
    )]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[arg(long, value_name = "PATH")]
    pub runtime: String,
    #[arg(long, value_name = "REF")]
    pub image: String,
}

#[derive(Args, Debug)]
pub struct LocateArgs {
    #[arg(
        long,
        value_name = "DIR",
        help = "Directory (or binary) to try first; defaults to PILOT_RUNTIME_PATH"
    )]
    pub hint: Option<PathBuf>,
    #[arg(
        long,
        value_name = "REF",
        help = "Only accept a runtime that can probe this image"
    )]
    pub test_image: Option<String>,
}

#[derive(Args, Debug)]
pub struct BindsArgs {
    #[arg(
        long,
        value_name = "FLAGS",
        help = "Check flags: e exists, c shared fs, v check destination, d destination exists"
    )]
    pub checks: Option<String>,
    #[arg(
        long = "override",
        value_name = "BINDS",
        help = "Caller binds, highest precedence"
    )]
    pub overrides: Option<String>,
    #[arg(
        long,
        value_name = "BINDS",
        help = "Site binds; defaults to PILOT_BINDPATH"
    )]
    pub primary: Option<String>,
    #[arg(
        long,
        value_name = "BINDS",
        help = "Site default binds; defaults to PILOT_BINDPATH_DEFAULT"
    )]
    pub secondary: Option<String>,
    #[arg(
        long,
        value_name = "BINDS",
        help = "Built-in binds; defaults to the shared filesystem root"
    )]
    pub defaults: Option<String>,
}

#[derive(Args, Debug)]
pub struct ImageArgs {
    #[arg(
        long,
        value_name = "DICT",
        help = "platform:image,... map; defaults to PILOT_IMAGES_DICT"
    )]
    pub map: Option<String>,
    #[arg(
        long,
        value_name = "LIST",
        help = "Requested platforms in preference order"
    )]
    pub platforms: Option<String>,
    #[arg(long, value_name = "LIST")]
    pub restrictions: Option<String>,
}

#[derive(Args, Debug)]
pub struct IntersectArgs {
    pub left: String,
    pub right: String,
}

#[derive(Args, Debug)]
pub struct EnvOptionsArgs {
    #[arg(default_value = "", allow_hyphen_values = true)]
    pub raw: String,
}
