use clap::Subcommand;
use screenwarden_core::profile::ProfileStore;
use screenwarden_core::{Database, Role};

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Print the profile as JSON
    Show,
    /// Update profile fields
    Set {
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// "student" or "worker"
        #[arg(long)]
        role: Option<String>,
        /// Daily limit in minutes
        #[arg(long)]
        limit: Option<u32>,
    },
}

pub fn run(action: ProfileAction) -> CmdResult {
    let db = Database::open()?;

    match action {
        ProfileAction::Show => {
            print_json(&db.get()?)?;
        }
        ProfileAction::Set { name, role, limit } => {
            let mut profile = db.get()?;
            if let Some(name) = name {
                profile.display_name = name;
            }
            if let Some(role) = role {
                profile.role = role.parse::<Role>()?;
            }
            if let Some(limit) = limit {
                profile.daily_limit_min = limit;
            }
            db.put(&profile)?;
            print_json(&profile)?;
        }
    }
    Ok(())
}
