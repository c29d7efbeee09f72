use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use rand::Rng;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use keyed_limiter::config::{Policy, Settings};
use keyed_limiter::KeyedRateLimiter;

/// Drive a keyed limiter with synthetic traffic and report admissions.
#[derive(Parser, Debug)]
#[command(name = "keyed-limiter", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replenishment policy
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Maximum outstanding claims per key
    #[arg(long)]
    limit: Option<u64>,

    /// Release interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Explicit per-claim cadence in milliseconds (incremental policy)
    #[arg(long)]
    cadence_ms: Option<u64>,

    /// Number of distinct keys
    #[arg(long)]
    keys: Option<usize>,

    /// Requests per second across all keys
    #[arg(long)]
    rate: Option<u64>,

    /// How long to run, in seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Manual,
    TokenBucket,
    Incremental,
}

impl From<PolicyArg> for Policy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Manual => Policy::Manual,
            PolicyArg::TokenBucket => Policy::TokenBucket,
            PolicyArg::Incremental => Policy::Incremental,
        }
    }
}

impl Args {
    /// Load the configured settings and apply command line overrides.
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Settings::default(),
        };

        if let Some(policy) = self.policy {
            settings.limiter.policy = policy.into();
        }
        if let Some(limit) = self.limit {
            settings.limiter.limit = limit;
        }
        if let Some(interval_ms) = self.interval_ms {
            settings.limiter.interval_ms = interval_ms;
        }
        if self.cadence_ms.is_some() {
            settings.limiter.cadence_ms = self.cadence_ms;
        }
        if let Some(keys) = self.keys {
            settings.simulation.keys = keys;
        }
        if let Some(rate) = self.rate {
            settings.simulation.requests_per_second = rate;
        }
        if let Some(duration_secs) = self.duration_secs {
            settings.simulation.duration_secs = duration_secs;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let settings = args.settings()?;
    let simulation = &settings.simulation;
    if simulation.keys == 0 {
        bail!("simulation needs at least one key");
    }
    let period = simulation
        .request_period()
        .context("invalid simulation request rate")?;

    let limiter: Arc<dyn KeyedRateLimiter<String>> =
        Arc::from(settings.limiter.build::<String>()?);
    let hold = Duration::from_millis(simulation.hold_ms);
    let releases_manually = settings.limiter.policy == Policy::Manual;

    info!(
        keys = simulation.keys,
        requests_per_second = simulation.requests_per_second,
        duration_secs = simulation.duration_secs,
        "Starting simulation"
    );

    let mut requests = tokio::time::interval(period);
    let mut report = tokio::time::interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(Duration::from_secs(simulation.duration_secs));
    let shutdown = shutdown_signal();
    tokio::pin!(deadline, shutdown);

    let mut rng = rand::thread_rng();
    let (mut admitted, mut refused) = (0u64, 0u64);
    let (mut total_admitted, mut total_refused) = (0u64, 0u64);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Simulation finished");
                break;
            }
            _ = &mut shutdown => break,
            _ = report.tick() => {
                info!(admitted, refused, "Admissions in the last second");
                total_admitted += admitted;
                total_refused += refused;
                admitted = 0;
                refused = 0;
            }
            _ = requests.tick() => {
                let key = format!("client-{}", rng.gen_range(0..simulation.keys));
                if !limiter.try_acquire(key.clone())? {
                    debug!(key = %key, "Request refused");
                    refused += 1;
                    continue;
                }

                admitted += 1;
                if releases_manually {
                    let limiter = Arc::clone(&limiter);
                    tokio::spawn(async move {
                        tokio::time::sleep(hold).await;
                        if let Err(e) = limiter.release(&key) {
                            debug!(key = %key, error = %e, "Release skipped");
                        }
                    });
                }
            }
        }
    }

    limiter.dispose();
    info!(
        admitted = total_admitted + admitted,
        refused = total_refused + refused,
        "Limiter disposed"
    );
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping simulation");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping simulation");
        }
    }
}
