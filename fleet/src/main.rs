// External crates
use clap::Parser;
use fleet_logging::{critical, init_with_settings, LogSettings};
use tracing::{debug, info_span};
use uuid::Uuid;

// Local modules
mod cli;
mod commands;

use cli::Args;
use commands::execute_command;

fn main() {
    // Variables already set in the process win over the .env file
    let dotenv_path = dotenvy::dotenv().ok();
    let args = Args::parse();

    let log_guard = init_with_settings(&LogSettings::from_env().with_debug(args.debug));

    // Every log line of this run carries the same run id
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("fleet", run_id = %run_id, command = ?args.command);
    let entered = span.enter();

    debug!("Starting fleet command");
    if let Some(path) = &dotenv_path {
        debug!("Loaded environment from {}", path.display());
    }

    let code = match execute_command(args) {
        Ok(()) => 0,
        Err(e) => {
            critical!("{:#}", e);
            1
        }
    };

    // Flush the file sink before exiting; process::exit skips destructors.
    drop(entered);
    drop(log_guard);
    std::process::exit(code);
}
