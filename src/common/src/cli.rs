use clap::Args;
use std::path::PathBuf;

/// CLI arguments shared by the flush commands
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl CommonArgs {
    /// Log level used when `RUST_LOG` is not set
    pub fn default_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Initialize logging on stderr. `RUST_LOG` takes precedence over the
    /// verbosity flags.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(args.default_level()));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration");
                Configuration::load_from_path(path).with_context(|| {
                    format!("Failed to load configuration from {}", path.display())
                })
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }
}
