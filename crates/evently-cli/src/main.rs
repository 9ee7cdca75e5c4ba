//! Evently CLI - run and administer the Evently gateway.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use evently_core::{Config, LogFormat};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "evently")]
#[command(about = "Evently - event discovery platform gateway")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.evently/evently.json)
    #[arg(long, global = true, env = "EVENTLY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// User management
    Admin {
        #[command(subcommand)]
        action: AdminCommands,
    },

    /// Generate token signing secrets
    Secret,

    /// Show or validate configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create a user
    Create {
        /// Display name
        #[arg(long)]
        name: String,

        /// Login email
        #[arg(long)]
        email: String,

        /// Password (or use --generate-password)
        #[arg(long)]
        password: Option<String>,

        /// Generate a random password
        #[arg(long)]
        generate_password: bool,

        /// Role: user or admin
        #[arg(long, default_value = "user")]
        role: String,

        /// Grant the creator flag
        #[arg(long)]
        creator: bool,
    },

    /// List all users
    List,

    /// Grant the admin role
    Promote {
        /// Email of the user
        #[arg(long)]
        email: String,
    },

    /// Set or clear the creator flag
    SetCreator {
        /// Email of the user
        #[arg(long)]
        email: String,

        /// New value
        #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
        value: bool,
    },

    /// Delete a user and their favorites
    Delete {
        /// Email of the user
        #[arg(long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show effective configuration with secrets masked
    Show,

    /// Validate configuration
    Validate,

    /// Print the config file path
    Path,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    Ok(config.with_env_overrides())
}

fn init_logging(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref());
    let log_format = config
        .as_ref()
        .map(|c| c.settings.log_format)
        .unwrap_or_default();
    let verbose = cli.verbose || config.as_ref().is_ok_and(|c| c.settings.debug);
    init_logging(verbose, log_format);

    match cli.command {
        Commands::Serve { port, bind } => {
            commands::run_serve(config?, commands::serve::ServeArgs { port, bind }).await?;
        }

        Commands::Admin { action } => {
            let action = match action {
                AdminCommands::Create {
                    name,
                    email,
                    password,
                    generate_password,
                    role,
                    creator,
                } => commands::admin::AdminAction::Create {
                    name,
                    email,
                    password,
                    generate_password,
                    role,
                    creator,
                },
                AdminCommands::List => commands::admin::AdminAction::List,
                AdminCommands::Promote { email } => commands::admin::AdminAction::Promote { email },
                AdminCommands::SetCreator { email, value } => {
                    commands::admin::AdminAction::SetCreator { email, value }
                }
                AdminCommands::Delete { email } => commands::admin::AdminAction::Delete { email },
            };
            commands::run_admin(config?, action).await?;
        }

        Commands::Secret => commands::run_secret(),

        Commands::Config { action } => {
            let action = match action {
                Some(ConfigCommands::Validate) => commands::config::ConfigAction::Validate,
                Some(ConfigCommands::Path) => commands::config::ConfigAction::Path,
                Some(ConfigCommands::Show) | None => commands::config::ConfigAction::Show,
            };
            commands::run_config(config, cli.config.as_deref(), action)?;
        }
    }

    Ok(())
}
