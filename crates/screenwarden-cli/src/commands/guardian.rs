use clap::Subcommand;
use screenwarden_core::profile::GuardianStore;
use screenwarden_core::{Database, Guardian};

use super::{print_json, CmdResult};

#[derive(Subcommand)]
pub enum GuardianAction {
    /// List emergency contacts
    List,
    /// Register an emergency contact
    Add {
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
}

pub fn run(action: GuardianAction) -> CmdResult {
    let db = Database::open()?;

    match action {
        GuardianAction::List => {
            print_json(&GuardianStore::list(&db)?)?;
        }
        GuardianAction::Add { name, phone, email } => {
            let guardian = Guardian::new(&name, phone.as_deref(), email.as_deref());
            let id = GuardianStore::add(&db, &guardian)?;
            println!("guardian added: {id}");
        }
    }
    Ok(())
}
