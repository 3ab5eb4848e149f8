//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod keys;

use clap::{Parser, Subcommand};

/// Streaming chat backend with branching conversations.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "PARLEY_LOG_JSON")]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "PARLEY_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server.
    Serve {
        /// Port to listen on (overrides config.toml).
        #[arg(short, long, env = "PARLEY_PORT")]
        port: Option<u16>,

        /// Host to bind to (overrides config.toml).
        #[arg(long, env = "PARLEY_HOST")]
        host: Option<String>,
    },

    /// Manage API keys.
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },
}

#[derive(Subcommand)]
pub enum KeysCommand {
    /// Mint a new API key for a user.
    Create {
        /// User id the key authenticates as.
        #[arg(long)]
        user: String,

        /// Label to remember the key by.
        #[arg(long, default_value = "default")]
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["parley", "serve", "--port", "8080", "--host", "0.0.0.0"]).unwrap();
        match cli.command {
            Commands::Serve { port, host } => {
                assert_eq!(port, Some(8080));
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_keys_create() {
        let cli = Cli::try_parse_from(["parley", "keys", "create", "--user", "alice"]).unwrap();
        match cli.command {
            Commands::Keys {
                command: KeysCommand::Create { user, name },
            } => {
                assert_eq!(user, "alice");
                assert_eq!(name, "default");
            }
            _ => panic!("expected keys create"),
        }
    }

    #[test]
    fn test_keys_create_requires_user() {
        assert!(Cli::try_parse_from(["parley", "keys", "create"]).is_err());
    }
}
