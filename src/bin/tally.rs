use std::{io, process};

use clap::Parser;
use tally::{
    cli::{execute, load_config, Cli},
    init_with_filter, AppError, Engine,
};

fn main() {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("Error: {err}");
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<i32, AppError> {
    let config = load_config(cli)?;
    init_with_filter(config.log_filter.as_deref());
    let engine = Engine::open(config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(&engine, &cli.command, &mut out)
}
