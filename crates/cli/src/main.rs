//! Vendora CLI - database and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply storefront migrations
//! vendora migrate
//!
//! # Load demo categories, products and stock
//! vendora seed
//!
//! # Create a verified account with a role
//! vendora user create -e admin@example.com -n "Admin Name" -r admin -p 'long password'
//!
//! # Release expired stock holds once
//! vendora reservations sweep
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "vendora")]
#[command(author, version, about = "Vendora CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the catalog with demo products
    Seed,
    /// Manage accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage stock holds
    Reservations {
        #[command(subcommand)]
        action: ReservationAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a verified account
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Role (`admin`, `staff`, `viewer`, `customer`)
        #[arg(short, long, default_value = "customer")]
        role: String,

        /// Password (at least 8 characters)
        #[arg(short, long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum ReservationAction {
    /// Release expired holds now
    Sweep,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Command failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed => {
            commands::seed::run().await?;
        }
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                name,
                role,
                password,
            } => {
                commands::user::create(&email, &name, &role, &password).await?;
            }
        },
        Commands::Reservations { action } => match action {
            ReservationAction::Sweep => commands::reservations::sweep().await?,
        },
    }
    Ok(())
}
