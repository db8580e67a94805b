use anyhow::{Context, Result};
use clap::Parser;
use common::cli::{CommonArgs, utils};
use common::config::Configuration;
use flusher::backend::ListingService;
use flusher::{FlushConfig, Flusher, ProxyBackend, Scope};
use std::sync::Arc;
use std::time::Duration;

/// Empty and delete every container under the given bucket paths
#[derive(Parser, Debug)]
#[command(name = "chflush", version, about)]
struct Cli {
    /// Paths to flush, as `bucket[/path...]`
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<Scope>,

    #[arg(long, help = "Account owning the buckets")]
    account: Option<String>,

    #[arg(long, help = "Namespace of the storage cluster")]
    namespace: Option<String>,

    #[arg(long, value_name = "N", help = "Number of workers per phase")]
    max_worker: Option<usize>,

    #[arg(long, value_name = "SECS", help = "Idle time after which a worker exits")]
    timeout: Option<f64>,

    #[arg(long, value_name = "SECS", help = "Interval between progress reports")]
    report: Option<f64>,

    #[arg(long, value_name = "SECS", help = "Wait after an election failure")]
    election_delay: Option<f64>,

    #[arg(long, help = "Namespace proxy URL")]
    proxy_url: Option<String>,

    #[arg(long, help = "Account service URL")]
    account_url: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

impl Cli {
    /// Command-line flags take precedence over every configuration source
    fn apply(&self, config: &mut Configuration) -> Result<()> {
        if let Some(account) = &self.account {
            config.account = account.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(workers) = self.max_worker {
            config.flush.workers = workers;
        }
        if let Some(secs) = self.timeout {
            config.flush.dequeue_timeout = seconds(secs).context("Invalid --timeout")?;
        }
        if let Some(secs) = self.report {
            config.flush.report_interval = seconds(secs).context("Invalid --report")?;
        }
        if let Some(secs) = self.election_delay {
            config.flush.election_retry_delay =
                seconds(secs).context("Invalid --election-delay")?;
        }
        if let Some(url) = &self.proxy_url {
            config.backend.proxy_url = url.clone();
        }
        if let Some(url) = &self.account_url {
            config.backend.account_url = url.clone();
        }
        Ok(())
    }
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("{secs} is not a valid duration"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    utils::init_logging(&cli.common);

    // Load configuration
    let mut config = utils::load_config(cli.common.config.as_ref())?;
    cli.apply(&mut config)?;
    config.validate().context("Invalid configuration")?;

    let backend = ProxyBackend::new(&config.backend, &config.namespace)
        .context("Failed to create storage backend")?;
    backend.check(&config.account).await.with_context(|| {
        format!(
            "Account {} is not reachable through {}",
            config.account, config.backend.account_url
        )
    })?;

    let flush_config = FlushConfig::from(&config);
    tracing::info!(
        account = %flush_config.account,
        namespace = %flush_config.namespace,
        workers = flush_config.workers,
        "Using {} workers",
        flush_config.workers
    );

    let flusher = Flusher::new(flush_config, Arc::new(backend));
    let summary = tokio::select! {
        summary = flusher.run(&cli.paths) => summary,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            anyhow::bail!("Interrupted, containers may be partially flushed");
        }
    };

    println!("{summary}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_configuration() {
        let cli = Cli::parse_from([
            "chflush",
            "--account",
            "media",
            "--max-worker",
            "4",
            "--timeout",
            "0.5",
            "--election-delay",
            "2",
            "--proxy-url",
            "http://proxy:6006",
            "photos/2024",
            "videos",
        ]);

        let mut config = Configuration::default();
        cli.apply(&mut config).unwrap();

        assert_eq!(config.account, "media");
        assert_eq!(config.namespace, "OPENIO");
        assert_eq!(config.flush.workers, 4);
        assert_eq!(config.flush.dequeue_timeout, Duration::from_millis(500));
        assert_eq!(config.flush.election_retry_delay, Duration::from_secs(2));
        assert_eq!(config.flush.report_interval, Duration::from_secs(60));
        assert_eq!(config.backend.proxy_url, "http://proxy:6006");

        let prefixes: Vec<_> = cli.paths.iter().map(Scope::prefix).collect();
        assert_eq!(prefixes, vec!["photos%2F2024", "videos"]);
    }

    #[test]
    fn test_paths_are_required() {
        assert!(Cli::try_parse_from(["chflush"]).is_err());
        assert!(Cli::try_parse_from(["chflush", "/nobucket"]).is_err());
    }

    #[test]
    fn test_invalid_durations_are_rejected() {
        assert!(seconds(-1.0).is_err());
        assert!(seconds(f64::NAN).is_err());
        assert_eq!(seconds(0.25).unwrap(), Duration::from_millis(250));
    }
}
