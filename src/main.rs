use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quotaguard::config::QuotaGuardConfig;
use quotaguard::gate::RequestGate;
use quotaguard::ratelimit::{client_ip, FallbackLimiter};
use quotaguard::store::RedisSharedCounter;

/// How long to wait for the shared store before running on local counters.
const SHARED_STORE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "quotaguard", version, about = "Inspect and exercise usage quotas")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run requests through the IP gate and print each decision as JSON
    Gate {
        /// Request path, e.g. /api/quiz/questions
        #[arg(long)]
        path: String,

        /// Value of the X-Forwarded-For header
        #[arg(long)]
        forwarded_for: Option<String>,

        /// Socket peer address
        #[arg(long)]
        remote_addr: Option<IpAddr>,

        /// Number of requests to send
        #[arg(long, default_value_t = 1)]
        repeat: u32,
    },
    /// Print the resolved configuration as JSON
    Policies,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = QuotaGuardConfig::load(cli.config.as_deref())?;
    info!(
        config = ?cli.config,
        rules = config.gate.rules.len(),
        "Configuration loaded"
    );

    match cli.command {
        Command::Policies => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Gate {
            path,
            forwarded_for,
            remote_addr,
            repeat,
        } => {
            let limiter = Arc::new(build_limiter(&config).await);
            let gate = RequestGate::new(limiter, config.route_rules()?);
            let ip = client_ip(forwarded_for.as_deref(), remote_addr);

            for _ in 0..repeat {
                let decision = gate.check(&path, &ip).await;
                println!("{}", serde_json::to_string(&decision)?);
            }
        }
    }

    Ok(())
}

/// Connect the shared store if configured, otherwise run on local counters.
async fn build_limiter(config: &QuotaGuardConfig) -> FallbackLimiter<RedisSharedCounter> {
    let connect = RedisSharedCounter::from_config(&config.shared_store);
    match tokio::time::timeout(SHARED_STORE_CONNECT_TIMEOUT, connect).await {
        Ok(Ok(Some(shared))) => {
            info!("Using shared counter store");
            FallbackLimiter::new(shared)
        }
        Ok(Ok(None)) => {
            info!("No shared counter store configured, using local counters");
            FallbackLimiter::local_only()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Shared counter store unavailable, using local counters");
            FallbackLimiter::local_only()
        }
        Err(_) => {
            warn!(
                timeout = ?SHARED_STORE_CONNECT_TIMEOUT,
                "Timed out connecting to shared counter store, using local counters"
            );
            FallbackLimiter::local_only()
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
