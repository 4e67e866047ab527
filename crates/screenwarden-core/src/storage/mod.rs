pub mod config;
pub mod database;
mod migrations;
mod memory;

pub use config::Config;
pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use crate::error::{ConfigError, Result};

/// Returns `~/.config/screenwarden[-dev]/` based on SCREENWARDEN_ENV.
///
/// Set SCREENWARDEN_ENV=dev to use development data directory, or
/// SCREENWARDEN_HOME to point at an explicit directory.
///
/// # Errors
/// Returns an error if creating the data directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var("SCREENWARDEN_HOME") {
        Ok(explicit) if !explicit.is_empty() => PathBuf::from(explicit),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env =
                std::env::var("SCREENWARDEN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("screenwarden-dev")
            } else {
                base_dir.join("screenwarden")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
