//! The `tally` command line.

use std::{
    io::Write,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use tally_config::{Config, ConfigManager};
use tally_core::{BatchReport, FiredRule};
use tally_domain::Displayable;

use crate::{utils::build_info, AppError, Engine};

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Ledger and recurrence engine")]
pub struct Cli {
    /// Directory holding book.json (overrides the config file)
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Config file to use instead of $TALLY_HOME/config.json
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fire every due rule once and exit
    Sweep {
        /// Mark the sweep as a startup catch-up
        #[arg(long)]
        catch_up: bool,
    },
    /// Run the daily trigger in the foreground
    Run,
    /// Fire one rule now, whether or not it is due
    Fire {
        rule_id: Uuid,
        /// Date for the generated entry (defaults to today)
        #[arg(long = "as-of")]
        as_of: Option<NaiveDate>,
    },
    /// List rules due today
    Due,
    /// Check balances, references and transfer pairs
    Audit,
    /// Print build metadata
    Version,
}

/// Exit code for a command that ran but found problems.
pub const EXIT_PROBLEMS: i32 = 2;

/// Loads configuration with the command-line overrides applied.
pub fn load_config(cli: &Cli) -> Result<Config, AppError> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::new(path.clone()),
        None => ConfigManager::from_env()?,
    };
    let mut config = manager.load()?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Runs `command` against `engine` and returns the process exit code.
pub fn execute(engine: &Engine, command: &Command, out: &mut dyn Write) -> Result<i32, AppError> {
    match command {
        Command::Sweep { catch_up } => {
            let report = engine.processor().process_due_rules(*catch_up)?;
            write_report(out, &report)?;
            Ok(if report.is_clean() { 0 } else { EXIT_PROBLEMS })
        }
        Command::Run => {
            let trigger = engine.trigger()?;
            writeln!(
                out,
                "Daily sweep at {} (UTC{:+} min) over {}. Press Ctrl-C to stop.",
                trigger.run_at().format("%H:%M"),
                engine.config().utc_offset_minutes,
                engine.data_dir().display()
            )?;
            let stop = Arc::new(AtomicBool::new(false));
            stop_on_interrupt(stop.clone())?;
            out.flush()?;
            let sweeps = trigger.run(
                engine.processor(),
                engine.clock(),
                engine.config().catch_up_on_start,
                &stop,
            );
            writeln!(out, "Stopped after {sweeps} sweep(s).")?;
            Ok(0)
        }
        Command::Fire { rule_id, as_of } => {
            let fired = engine.processor().run_now(*rule_id, *as_of)?;
            write_fired(out, &fired)?;
            Ok(0)
        }
        Command::Due => {
            let due = engine.processor().due_rules()?;
            if due.is_empty() {
                writeln!(out, "No rules due.")?;
            }
            for rule in due {
                writeln!(out, "{}  {}", rule.id, rule.display_label())?;
            }
            Ok(0)
        }
        Command::Audit => {
            let warnings = engine.accounts().reconcile()?;
            if warnings.is_empty() {
                writeln!(out, "Book reconciles.")?;
                return Ok(0);
            }
            for warning in &warnings {
                writeln!(out, "warning: {warning}")?;
            }
            writeln!(out, "{} problem(s) found.", warnings.len())?;
            Ok(EXIT_PROBLEMS)
        }
        Command::Version => {
            writeln!(out, "{}", build_info::CURRENT)?;
            Ok(0)
        }
    }
}

/// Sets `stop` when the process receives Ctrl-C.
fn stop_on_interrupt(stop: Arc<AtomicBool>) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("tally-interrupt".into())
        .spawn(move || match runtime.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                tracing::info!("interrupt received, stopping daily trigger");
                stop.store(true, Ordering::SeqCst);
            }
            Err(err) => tracing::warn!(error = %err, "cannot listen for interrupts"),
        })?;
    Ok(())
}

fn write_fired(out: &mut dyn Write, fired: &FiredRule) -> std::io::Result<()> {
    write!(
        out,
        "Fired rule {} on {}: entry {} ({}); next run {}",
        fired.rule_id,
        fired.fired_on,
        fired.entry.id,
        fired.entry.display_label(),
        fired.next_run_date
    )?;
    if fired.is_active {
        writeln!(out)
    } else {
        writeln!(out, " (rule finished)")
    }
}

fn write_report(out: &mut dyn Write, report: &BatchReport) -> std::io::Result<()> {
    for fired in &report.fired {
        write_fired(out, fired)?;
    }
    for rule_id in &report.skipped {
        writeln!(out, "Skipped rule {rule_id}: changed since the due query")?;
    }
    for failure in &report.failed {
        writeln!(out, "Failed rule {}: {}", failure.rule_id, failure.error)?;
    }
    writeln!(
        out,
        "Sweep for {}: {} fired, {} skipped, {} failed.",
        report.today,
        report.fired.len(),
        report.skipped.len(),
        report.failed.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fire_with_as_of() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "tally",
            "--data-dir",
            "/tmp/book",
            "fire",
            &id.to_string(),
            "--as-of",
            "2024-02-29",
        ])
        .expect("parse");
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/book")));
        match cli.command {
            Command::Fire { rule_id, as_of } => {
                assert_eq!(rule_id, id);
                assert_eq!(as_of, NaiveDate::from_ymd_opt(2024, 2, 29));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_rule_id() {
        assert!(Cli::try_parse_from(["tally", "fire", "not-a-uuid"]).is_err());
    }

    #[test]
    fn sweep_flag_defaults_off() {
        let cli = Cli::try_parse_from(["tally", "sweep"]).expect("parse");
        assert!(matches!(cli.command, Command::Sweep { catch_up: false }));
    }
}
