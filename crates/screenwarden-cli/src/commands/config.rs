use clap::Subcommand;
use screenwarden_core::{Config, ConfigError};
use serde_json::json;

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value by dot-path key
    Get {
        /// e.g. "scheduler.accrual_interval_secs"
        key: String,
    },
    /// Change one value, validate and save
    Set { key: String, value: String },
    /// Print the whole file as TOML
    List,
    /// Print where config.toml lives
    Path,
    /// Overwrite config.toml with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> CmdResult {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key).ok_or(ConfigError::UnknownKey(key))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            print_effective(&config, &key)?;
        }
        ConfigAction::List => {
            print!("{}", Config::load()?.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", Config::file_path()?.display());
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("reset {}", Config::file_path()?.display());
        }
    }
    Ok(())
}

/// Show what the engine will actually run with after a change, since
/// some settings derive from others (the accrual increment follows the
/// interval unless set).
fn print_effective(config: &Config, key: &str) -> CmdResult {
    match key.split('.').next() {
        Some("scheduler") => {
            let cadences = config.cadences();
            print_json(&json!({
                "accrual_interval_secs": cadences.accrual.as_secs(),
                "accrual_increment_secs": cadences.accrual_increment_secs,
                "advisory_interval_secs": cadences.advisory.as_secs(),
                "usage_source": cadences.usage_source,
            }))
        }
        Some("lockout") => print_json(&config.lock_policy()),
        _ => {
            println!("{key} = {}", config.get(key).unwrap_or_default());
            Ok(())
        }
    }
}
