use clap::Subcommand;
use screenwarden_core::IncidentOutcome;

use super::{print_json, CmdResult, Session};

#[derive(Subcommand)]
pub enum EmergencyAction {
    /// Notify every registered guardian
    Trigger,
}

pub async fn run(action: EmergencyAction) -> CmdResult {
    let session = Session::open()?;

    match action {
        EmergencyAction::Trigger => {
            let outcome = session.engine.trigger_emergency().await?;
            print_json(&outcome)?;
            if let IncidentOutcome::Dispatched(report) = &outcome {
                if report.deliveries.is_empty() {
                    eprintln!("no guardians registered; add one with `screenwarden guardian add`");
                }
            }
        }
    }
    Ok(())
}
