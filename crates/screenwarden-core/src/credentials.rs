//! Advisory oracle API key, kept in the OS keyring under service
//! `screenwarden`. The key never touches `config.toml`.

use keyring::Entry;
use tracing::info;

use crate::error::ConfigError;

const SERVICE: &str = "screenwarden";

/// Keyring entry holding the oracle API key.
pub const API_KEY_ENTRY: &str = "advisory_api_key";

fn entry() -> Result<Entry, ConfigError> {
    Entry::new(SERVICE, API_KEY_ENTRY).map_err(|e| ConfigError::Credentials(e.to_string()))
}

/// Stored API key, or `None` when the user never logged in.
pub fn load_api_key() -> Result<Option<String>, ConfigError> {
    match entry()?.get_password() {
        Ok(key) => Ok(Some(key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(ConfigError::Credentials(e.to_string())),
    }
}

/// Store a trimmed, non-empty API key.
pub fn store_api_key(key: &str) -> Result<(), ConfigError> {
    let key = normalize_key(key)?;
    entry()?
        .set_password(key)
        .map_err(|e| ConfigError::Credentials(e.to_string()))?;
    info!("advisory API key stored");
    Ok(())
}

/// Remove the API key. Clearing an absent key is not an error.
pub fn clear_api_key() -> Result<(), ConfigError> {
    match entry()?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(ConfigError::Credentials(e.to_string())),
    }
}

fn normalize_key(key: &str) -> Result<&str, ConfigError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: API_KEY_ENTRY.to_string(),
            message: "API key must not be empty".into(),
        });
    }
    Ok(key)
}
