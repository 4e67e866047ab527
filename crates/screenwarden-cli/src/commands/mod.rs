pub mod advisory;
pub mod auth;
pub mod config;
pub mod emergency;
pub mod guardian;
pub mod lock;
pub mod profile;
pub mod routine;
pub mod run;
pub mod status;
pub mod usage;

use std::sync::Arc;

use screenwarden_core::{
    AdvisoryOrigin, AdvisoryResult, Config, Database, EngineStores, SystemClock, UsageEngine,
};
use serde::Serialize;
use tracing::warn;

pub type CmdResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const ADVISORY_KEY: &str = "advisory_last";

/// Engine bound to the on-disk database, with the last advisory from an
/// earlier run restored. Lock state needs no restoring: the engine reads
/// and writes it through the database on every operation.
pub struct Session {
    pub config: Config,
    pub db: Arc<Database>,
    pub engine: Arc<UsageEngine>,
}

impl Session {
    pub fn open() -> CmdResult<Self> {
        let config = Config::load()?;
        let db = Arc::new(Database::open()?);
        let engine = UsageEngine::from_config(
            &config,
            EngineStores::shared(db.clone()),
            Arc::new(SystemClock),
        );

        if let Some(json) = db.kv_get(ADVISORY_KEY)? {
            match serde_json::from_str::<AdvisoryResult>(&json) {
                Ok(result) => engine.restore_advisory(result),
                Err(e) => warn!(error = %e, "discarding unreadable advisory"),
            }
        }

        Ok(Self {
            config,
            db,
            engine: Arc::new(engine),
        })
    }

    /// Persist the last good advisory.
    pub fn save_advisory(&self) -> CmdResult {
        let advisory = self.engine.latest_advisory();
        if advisory.origin != AdvisoryOrigin::Default {
            let json = serde_json::to_string(&advisory)?;
            self.db.kv_set(ADVISORY_KEY, &json)?;
        }
        Ok(())
    }
}

pub fn print_json<T: Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
