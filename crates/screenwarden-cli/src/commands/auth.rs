use clap::Subcommand;
use screenwarden_core::credentials;

use super::CmdResult;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the advisory oracle API key in the OS keyring
    Login {
        #[arg(long)]
        api_key: String,
    },
    /// Remove the stored API key
    Logout,
    /// Report whether the advisory oracle has a key to call with
    Status,
}

pub fn run(action: AuthAction) -> CmdResult {
    match action {
        AuthAction::Login { api_key } => {
            credentials::store_api_key(&api_key)?;
            println!("advisory API key stored");
        }
        AuthAction::Logout => {
            credentials::clear_api_key()?;
            println!("advisory API key removed");
        }
        AuthAction::Status => {
            let state = match credentials::load_api_key()? {
                Some(_) => "authenticated",
                None => "not authenticated",
            };
            println!("advisory: {state}");
        }
    }
    Ok(())
}
