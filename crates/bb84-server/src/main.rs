//! BB84 server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with self-signed certificate (development)
//! bb84-server --bind 0.0.0.0:4433
//!
//! # Start with TLS certificate
//! bb84-server --bind 0.0.0.0:4433 --cert cert.pem --key key.pem
//!
//! # Let Alice finalize whatever the QBER
//! bb84-server --advisory-threshold
//! ```

use bb84_core::SessionConfig;
use bb84_server::{BroadcastPolicy, DriverConfig, Server, ServerRuntimeConfig};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// BB84 key distribution session server
#[derive(Parser, Debug)]
#[command(name = "bb84-server")]
#[command(about = "BB84 quantum key distribution session server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// QBER at or above which key finalization is refused
    #[arg(long, default_value_t = bb84_proto::DEFAULT_QBER_THRESHOLD)]
    threshold: f64,

    /// Log a warning instead of refusing finalization above the threshold
    #[arg(long)]
    advisory_threshold: bool,

    /// Maximum concurrent connections
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Allow any connection to perform any action
    #[arg(long)]
    no_role_checks: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    if !(0.0..=1.0).contains(&args.threshold) {
        return Err(format!("--threshold must be within [0, 1], got {}", args.threshold).into());
    }

    tracing::info!("BB84 server starting");
    tracing::info!("Binding to {}", args.bind);

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("No TLS certificate provided - using self-signed certificate");
    }
    if args.advisory_threshold {
        tracing::warn!("QBER threshold is advisory: keys will be finalized regardless");
    }

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        driver: DriverConfig {
            max_connections: args.max_connections,
            enforce_roles: !args.no_role_checks,
            session: SessionConfig {
                threshold: args.threshold,
                enforce_threshold: !args.advisory_threshold,
            },
        },
        broadcast: BroadcastPolicy::Retry { max_attempts: 3, initial_backoff_ms: 10 },
    };

    let server = Server::bind(config)?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
