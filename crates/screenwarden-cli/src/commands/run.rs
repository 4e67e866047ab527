use screenwarden_core::{Event, PollingScheduler};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use super::{CmdResult, Session};

/// Drive the engine until Ctrl-C, printing every event as one JSON line.
pub async fn run() -> CmdResult {
    let session = Session::open()?;
    let mut events = session.engine.subscribe();
    let scheduler =
        PollingScheduler::new(session.engine.clone(), session.config.cadences()).spawn();

    print_line(&session.engine.snapshot()?);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    print_line(&event);
                    // Lock transitions are persisted by the engine itself.
                    if matches!(event, Event::AdvisoryRefreshed { .. }) {
                        if let Err(e) = session.save_advisory() {
                            error!(error = %e, "failed to persist advisory");
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    scheduler.shutdown().await;
    session.save_advisory()
}

fn print_line(event: &Event) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => error!(error = %e, "failed to encode event"),
    }
}
