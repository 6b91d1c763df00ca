//! La Artesa CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! artesa-cli migrate
//!
//! # Create an admin user
//! ARTESA_USER_PASSWORD=... artesa-cli user create -e admin@laartesa.co --admin
//!
//! # Promote an existing account
//! artesa-cli user promote -e compras@laartesa.co
//!
//! # Purge stale password reset tokens (cron)
//! artesa-cli reset-tokens purge
//!
//! # Import from SAP Business One
//! artesa-cli sap sync products
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` / `user promote` - Manage accounts
//! - `reset-tokens purge` - Delete expired and used reset tokens
//! - `sap sync` - Run a SAP import in the foreground

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;

use la_artesa_core::SyncKind;

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "artesa-cli")]
#[command(author, version, about = "La Artesa CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Maintain password reset tokens
    ResetTokens {
        #[command(subcommand)]
        action: ResetTokensAction,
    },
    /// SAP Business One integration
    Sap {
        #[command(subcommand)]
        action: SapAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password (prefer the environment variable over the flag)
        #[arg(short, long, env = "ARTESA_USER_PASSWORD", hide_env_values = true)]
        password: String,

        /// First name
        #[arg(short, long, default_value = "")]
        first_name: String,

        /// Last name
        #[arg(short, long, default_value = "")]
        last_name: String,

        /// Create the user with the admin role
        #[arg(long)]
        admin: bool,
    },
    /// Give an existing user the admin role
    Promote {
        /// Email address
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum ResetTokensAction {
    /// Delete tokens expired or used more than seven days ago
    Purge,
}

#[derive(Subcommand)]
enum SapAction {
    /// Import products or client terms
    Sync {
        #[arg(value_enum)]
        kind: SyncTarget,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SyncTarget {
    Products,
    Clients,
}

impl From<SyncTarget> for SyncKind {
    fn from(target: SyncTarget) -> Self {
        match target {
            SyncTarget::Products => Self::Products,
            SyncTarget::Clients => Self::Clients,
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                password,
                first_name,
                last_name,
                admin,
            } => {
                commands::users::create(commands::users::NewAccount {
                    email: &email,
                    password: SecretString::from(password),
                    first_name: &first_name,
                    last_name: &last_name,
                    admin,
                })
                .await?;
            }
            UserAction::Promote { email } => {
                commands::users::promote(&email).await?;
            }
        },
        Commands::ResetTokens { action } => match action {
            ResetTokensAction::Purge => {
                commands::reset_tokens::purge().await?;
            }
        },
        Commands::Sap { action } => match action {
            SapAction::Sync { kind } => {
                let report = commands::sap::sync(kind.into()).await?;
                if report.error.is_some() {
                    std::process::exit(2);
                }
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sap_sync() {
        let cli = Cli::try_parse_from(["artesa-cli", "sap", "sync", "clients"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Sap {
                action: SapAction::Sync {
                    kind: SyncTarget::Clients
                }
            })
        ));
    }

    #[test]
    fn test_parse_user_create_flags() {
        let cli = Cli::try_parse_from([
            "artesa-cli", "user", "create", "-e", "ana@laartesa.co", "-p", "masamadre1", "--admin",
        ]);
        let Ok(Cli {
            command: Commands::User {
                action: UserAction::Create { email, admin, first_name, .. },
            },
        }) = cli
        else {
            panic!("user create did not parse");
        };
        assert_eq!(email, "ana@laartesa.co");
        assert!(admin);
        assert_eq!(first_name, "");
    }
}
