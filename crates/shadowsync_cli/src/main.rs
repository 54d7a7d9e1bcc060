//! CLI entry point.
//!
//! # Responsibility
//! - Without arguments, print a deterministic linkage check.
//! - `resync <db_path> <config.json>` converges every subscribed record once.

use log::error;
use shadowsync_core::db::open_db;
use shadowsync_core::{
    init_logging_from_config, EventDispatcher, SqliteLabelStore, SqliteRecordStore, SyncConfig,
};
use std::error::Error;
use std::process::ExitCode;

const USAGE: &str = "usage: shadowsync_cli [resync <db_path> <config.json>]";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => {
            println!("shadowsync_core ping={}", shadowsync_core::ping());
            println!("shadowsync_core version={}", shadowsync_core::core_version());
            ExitCode::SUCCESS
        }
        [command, db_path, config_path] if command == "resync" => {
            match resync(db_path, config_path) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    error!("event=cli_resync module=cli status=error error={}", err);
                    eprintln!("resync failed: {err}");
                    ExitCode::FAILURE
                }
            }
        }
        _ => {
            eprintln!("{USAGE}");
            ExitCode::from(2)
        }
    }
}

fn resync(db_path: &str, config_path: &str) -> Result<(), Box<dyn Error>> {
    let config = SyncConfig::from_path(config_path)?;
    init_logging_from_config(&config)?;

    let conn = open_db(db_path)?;
    let mut dispatcher = EventDispatcher::new(
        SqliteRecordStore::try_new(&conn)?,
        SqliteLabelStore::try_new(&conn)?,
    );
    dispatcher.subscribe_all(&config)?;

    let summary = dispatcher.resync_all()?;
    println!(
        "records={} created={} applied={} frozen={} retracted={} skipped={} failed={}",
        summary.records_visited,
        summary.created,
        summary.applied,
        summary.frozen,
        summary.retracted,
        summary.skipped,
        summary.failed
    );
    if summary.failed > 0 {
        return Err(format!("{} record(s) failed to converge", summary.failed).into());
    }
    Ok(())
}
