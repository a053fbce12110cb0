//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `relmap_core` linkage.
//! - Optionally open a database file and list its tables.
//!
//! Usage: `relmap_cli [DB_PATH]`. Set `RELMAP_LOG_DIR` to write logs.

use log::{error, info};
use relmap_core::{Backend, LoggingConfig};
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    if let Ok(log_dir) = env::var("RELMAP_LOG_DIR") {
        let config = LoggingConfig::new(relmap_core::default_log_level(), log_dir);
        if let Err(err) = relmap_core::init_logging(&config) {
            eprintln!("relmap_cli logging disabled: {err}");
        }
    }

    println!("relmap_core ping={}", relmap_core::ping());
    println!("relmap_core version={}", relmap_core::core_version());

    let Some(path) = env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match list_tables(&path) {
        Ok(tables) => {
            info!("event=cli_list_tables module=cli status=ok tables={}", tables.len());
            println!("tables={}", tables.join(","));
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_list_tables module=cli status=error error={err}");
            eprintln!("relmap_cli error: {err}");
            ExitCode::from(1)
        }
    }
}

fn list_tables(path: &str) -> relmap_core::DbResult<Vec<String>> {
    let backend = relmap_core::open_db(path)?;
    backend.list_tables()
}
