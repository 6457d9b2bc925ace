//! CLI module for opengloves.
//!
//! - `opengloves relay` runs the WebSocket relay
//! - `opengloves chat` runs a line-oriented chat client
//!
//! ```ignore
//! use opengloves::cli::{parse_args, run_cli_command};
//!
//! let command = parse_args(std::env::args());
//! run_cli_command(command).await?;
//! ```

pub mod access;
pub mod args;
pub mod chat;

pub use args::{parse_args, ChatArgs, CliCommand, USAGE};
pub use chat::run_chat;

use color_eyre::eyre::{bail, Report};
use color_eyre::{Result, Section};

use crate::config::AppConfig;
use crate::relay::serve_until_shutdown;

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version_string() -> String {
    format!("opengloves {}", VERSION)
}

/// Default log filter for a command when `RUST_LOG` is unset.
///
/// The chat client keeps stderr quiet so replies stay readable.
pub fn default_log_filter(command: &CliCommand) -> &'static str {
    match command {
        CliCommand::Chat(_) => "opengloves=warn",
        _ => "opengloves=info",
    }
}

/// Run a parsed CLI command to completion.
pub async fn run_cli_command(command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Version => {
            println!("{}", version_string());
            Ok(())
        }
        CliCommand::Help => {
            println!("{}", USAGE);
            Ok(())
        }
        CliCommand::Invalid(message) => {
            eprintln!("{}", USAGE);
            bail!(message)
        }
        CliCommand::Relay { config } => {
            let path = config.unwrap_or_else(AppConfig::default_path);
            let config = AppConfig::load(&path)?.with_env_overrides()?;
            if let Err(e) = serve_until_shutdown(&config).await {
                let hint = e.category().recovery_hint();
                return Err(Report::new(e).suggestion(hint));
            }
            Ok(())
        }
        CliCommand::Chat(args) => run_chat(args).await,
    }
}
