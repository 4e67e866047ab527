use clap::Subcommand;
use screenwarden_core::profile::RoutineStore;
use screenwarden_core::{Database, RoutineItem};

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum RoutineAction {
    /// List routine items in time order
    List,
    /// Add a routine item
    Add {
        /// Local time as HH:MM
        time: String,
        activity: String,
    },
    /// Delete a routine item
    Remove { id: i64 },
    /// Mark a routine item done
    Done {
        id: i64,
        /// Mark as not done instead
        #[arg(long)]
        undo: bool,
    },
}

pub fn run(action: RoutineAction) -> CmdResult {
    let db = Database::open()?;

    match action {
        RoutineAction::List => {
            print_json(&RoutineStore::list(&db)?)?;
        }
        RoutineAction::Add { time, activity } => {
            let item = RoutineItem::new(RoutineItem::parse_time(&time)?, &activity);
            let id = RoutineStore::add(&db, &item)?;
            println!("routine item added: {id}");
        }
        RoutineAction::Remove { id } => {
            db.remove(id)?;
            println!("routine item removed: {id}");
        }
        RoutineAction::Done { id, undo } => {
            db.set_completed(id, !undo)?;
            println!("ok");
        }
    }
    Ok(())
}
