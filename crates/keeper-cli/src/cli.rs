//! Command-line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Keeper: a personal secrets vault server.
#[derive(Parser)]
#[command(
    name = "keeper-server",
    version,
    about = "Keeper secrets vault server",
    long_about = "Stores text, files, credentials and payment cards encrypted at rest, \
                  readable only by the user who stored them."
)]
pub struct Cli {
    /// Path to the TOML configuration file [default: config/keeper.toml].
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (the default).
    Serve {
        /// Address to bind to, overriding config and environment.
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on, overriding config and environment.
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Validate the configuration and print it with secrets redacted.
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_optional() {
        let cli = Cli::try_parse_from(["keeper-server"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn serve_overrides_parse() {
        let cli = Cli::try_parse_from([
            "keeper-server",
            "serve",
            "--bind",
            "0.0.0.0",
            "-p",
            "9000",
            "--config",
            "other.toml",
        ])
        .unwrap();
        let Some(Commands::Serve { bind, port }) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(bind.as_deref(), Some("0.0.0.0"));
        assert_eq!(port, Some(9000));
        assert_eq!(cli.config, Some(PathBuf::from("other.toml")));
    }
}
