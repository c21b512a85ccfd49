//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand};

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "tandem", author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "TANDEM_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server, the change-feed watcher and the cache sweeper.
    Serve {
        /// Host to bind to (overrides `server.host`).
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides `server.port`).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Answer one question from the indexed records.
    Ask {
        /// The question.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Print the full answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Embed every record in the store and report the counts.
    Index,

    /// Print version information.
    Version,

    /// Configuration operations.
    Config(ConfigCommand),
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Print the effective configuration as TOML.
    Show,

    /// Get a configuration value by dotted key.
    Get {
        /// Dotted key (e.g., "server.port").
        key: String,
    },

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_default() {
        let args = CliArgs::parse_from(["tandem"]);
        assert!(!args.verbose);
        assert!(!args.quiet);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_args_flags() {
        let args = CliArgs::parse_from(["tandem", "-v", "--config", "/etc/tandem.toml"]);
        assert!(args.verbose);
        assert_eq!(args.config.as_deref(), Some("/etc/tandem.toml"));
    }

    #[test]
    fn test_serve_command() {
        let args = CliArgs::parse_from(["tandem", "serve"]);
        match args.command {
            Some(Command::Serve { host, port }) => {
                assert!(host.is_none());
                assert!(port.is_none());
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_command_overrides() {
        let args = CliArgs::parse_from(["tandem", "serve", "--host", "0.0.0.0", "-p", "8080"]);
        match args.command {
            Some(Command::Serve { host, port }) => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(8080));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_ask_command_joins_words() {
        let args = CliArgs::parse_from(["tandem", "ask", "cheap", "red", "sedan"]);
        match args.command {
            Some(Command::Ask { query, json }) => {
                assert_eq!(query.join(" "), "cheap red sedan");
                assert!(!json);
            }
            _ => panic!("Expected Ask command"),
        }
    }

    #[test]
    fn test_ask_command_requires_query() {
        assert!(CliArgs::try_parse_from(["tandem", "ask"]).is_err());
    }

    #[test]
    fn test_index_and_version_commands() {
        let args = CliArgs::parse_from(["tandem", "index"]);
        assert!(matches!(args.command, Some(Command::Index)));
        let args = CliArgs::parse_from(["tandem", "version"]);
        assert!(matches!(args.command, Some(Command::Version)));
    }

    #[test]
    fn test_config_init_command() {
        let args = CliArgs::parse_from(["tandem", "config", "init", "--file", "/tmp/t.toml", "--force"]);
        match args.command {
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Init { file, force },
            })) => {
                assert_eq!(file.as_deref(), Some("/tmp/t.toml"));
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_config_get_command() {
        let args = CliArgs::parse_from(["tandem", "config", "get", "server.port"]);
        assert!(matches!(
            args.command,
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Get { ref key },
            })) if key == "server.port"
        ));
    }
}
