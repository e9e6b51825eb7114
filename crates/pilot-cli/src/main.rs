use atty::Stream;
use clap::Parser;
use color_eyre::Result;
use pilot_core::{CommandStatus, ExecutionOutcome, GlobalOptions};
use serde_json::Value;

mod cli;
mod dispatch;
mod style;

use cli::PilotCli;
use dispatch::Dispatched;
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PilotCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
    };

    let code = match dispatch::dispatch_command(&global, &cli.command) {
        Dispatched::Exit(code) => code,
        Dispatched::Outcome(outcome) => emit_output(&cli, &outcome)?,
    };

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("pilot={level},pilot_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &PilotCli, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();
    let command = cli.command.name();
    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let payload = pilot_core::to_json_response(command, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if outcome.status != CommandStatus::Ok {
        let message = pilot_core::format_status_message(command, &outcome.message);
        eprintln!("{}", style.status(&outcome.status, &message));
        if let Some(hint) = hint_from_details(&outcome.details) {
            eprintln!("{}", style.hint(hint));
        }
    } else if !cli.quiet {
        if is_passthrough(&outcome.details) {
            println!("{}", outcome.message);
        } else {
            let message = pilot_core::format_status_message(command, &outcome.message);
            println!("{}", style.status(&outcome.status, &message));
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn is_passthrough(details: &Value) -> bool {
    details
        .as_object()
        .and_then(|map| map.get("passthrough"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
