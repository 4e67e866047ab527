use clap::Subcommand;

use super::{print_json, CmdResult, Session};

#[derive(Subcommand)]
pub enum AdvisoryAction {
    /// Ask the oracle for a fresh advisory
    Refresh,
    /// Print the last known advisory without contacting the oracle
    Show,
}

pub async fn run(action: AdvisoryAction) -> CmdResult {
    let session = Session::open()?;

    match action {
        AdvisoryAction::Refresh => {
            let result = session.engine.refresh_advisory().await;
            print_json(&result)?;
            session.save_advisory()?;
        }
        AdvisoryAction::Show => {
            print_json(&session.engine.latest_advisory())?;
        }
    }
    Ok(())
}
