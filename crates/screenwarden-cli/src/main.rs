use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "screenwarden", version, about = "Screen time accounting and lockout")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current state snapshot as JSON
    Status,
    /// Usage ledger
    Usage {
        #[command(subcommand)]
        action: commands::usage::UsageAction,
    },
    /// Lock state and overrides
    Lock {
        #[command(subcommand)]
        action: commands::lock::LockAction,
    },
    /// Fatigue advisory
    Advisory {
        #[command(subcommand)]
        action: commands::advisory::AdvisoryAction,
    },
    /// Emergency guardian notification
    Emergency {
        #[command(subcommand)]
        action: commands::emergency::EmergencyAction,
    },
    /// User profile
    Profile {
        #[command(subcommand)]
        action: commands::profile::ProfileAction,
    },
    /// Emergency contacts
    Guardian {
        #[command(subcommand)]
        action: commands::guardian::GuardianAction,
    },
    /// Daily routine checklist
    Routine {
        #[command(subcommand)]
        action: commands::routine::RoutineAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Advisory oracle credentials
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Run the accrual and advisory loops until interrupted
    Run,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON output.
    let filter = if cli.verbose {
        "screenwarden=debug,screenwarden_core=debug"
    } else {
        "screenwarden=info,screenwarden_core=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Status => commands::status::run(),
        Commands::Usage { action } => commands::usage::run(action),
        Commands::Lock { action } => commands::lock::run(action),
        Commands::Advisory { action } => commands::advisory::run(action).await,
        Commands::Emergency { action } => commands::emergency::run(action).await,
        Commands::Profile { action } => commands::profile::run(action),
        Commands::Guardian { action } => commands::guardian::run(action),
        Commands::Routine { action } => commands::routine::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Auth { action } => commands::auth::run(action),
        Commands::Run => commands::run::run().await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
