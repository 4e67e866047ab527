use clap::Subcommand;
use serde_json::json;

use super::{print_json, CmdResult, Session};

#[derive(Subcommand)]
pub enum LockAction {
    /// Print the lock state as JSON
    Status,
    /// Override an active lock
    Unlock,
}

pub fn run(action: LockAction) -> CmdResult {
    let session = Session::open()?;
    let engine = &session.engine;

    match action {
        LockAction::Status => {
            let state = engine.lock_state()?;
            let machine = engine.lockout()?;
            print_json(&json!({
                "state": state,
                "locked_at": machine.locked_at(),
            }))?;
        }
        LockAction::Unlock => match engine.request_unlock()? {
            Some(event) => print_json(&event)?,
            None => println!("not locked"),
        },
    }
    Ok(())
}
