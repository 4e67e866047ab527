use clap::Subcommand;

use super::{print_json, CmdResult, Session};

#[derive(Subcommand)]
pub enum UsageAction {
    /// Record screen time and re-evaluate the lock
    Record {
        /// Duration in seconds
        #[arg(long, allow_negative_numbers = true)]
        secs: i64,
        /// Where the usage came from
        #[arg(long, default_value = "device")]
        source: String,
    },
    /// Print today's total in seconds
    Total,
    /// Per-day totals, oldest first
    History {
        /// Number of days including today, at most 3650
        #[arg(long, default_value = "7")]
        days: u32,
    },
}

pub fn run(action: UsageAction) -> CmdResult {
    let session = Session::open()?;
    let engine = &session.engine;

    match action {
        UsageAction::Record { secs, source } => {
            let accrual = engine.record_usage(&source, secs)?;
            if !accrual.applied {
                eprintln!("ignored non-positive duration: {secs}");
            }
            for event in &accrual.events {
                print_json(event)?;
            }
        }
        UsageAction::Total => {
            println!("{}", engine.current_total()?);
        }
        UsageAction::History { days } => {
            print_json(&engine.history(days)?)?;
        }
    }
    Ok(())
}
