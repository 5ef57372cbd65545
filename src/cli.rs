// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `sandboxer`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sandboxer",
    version,
    about = "Run sandboxed tasks declared in a manifest and keep them reconciled.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the manifest (TOML).
    ///
    /// Default: `Sandboxer.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Sandboxer.toml")]
    pub config: String,

    /// Run the declared tasks to completion, clean up, and exit.
    #[arg(long, conflicts_with = "watch")]
    pub once: bool,

    /// Re-sync whenever the manifest file changes.
    #[arg(long)]
    pub watch: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SANDBOXER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the manifest, but don't start anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["sandboxer"]).unwrap();
        assert_eq!(args.config, "Sandboxer.toml");
        assert!(!args.once && !args.watch && !args.dry_run);
        assert!(args.log_level.is_none());
    }

    #[test]
    fn once_and_watch_conflict() {
        assert!(CliArgs::try_parse_from(["sandboxer", "--once", "--watch"]).is_err());
        let args =
            CliArgs::try_parse_from(["sandboxer", "--once", "--log-level", "debug"]).unwrap();
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
