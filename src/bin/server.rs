use clap::Parser;
use iproto_store::config::{self, Config, LimiterConfig};
use iproto_store::store::Mode;
use iproto_store::{server, Error};
use std::time::Duration;
use tracing::error;

#[derive(Parser, Debug)]
struct Args {
    /// The address to listen on
    #[arg(short, long, env = "IPROTO_ADDRESS", default_value = config::DEFAULT_ADDRESS)]
    address: String,

    /// Connections handled at the same time
    #[arg(long, env = "IPROTO_MAX_CLIENTS", default_value_t = config::DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Time budget for one connection, in milliseconds
    #[arg(long, env = "IPROTO_REQUEST_TIMEOUT_MS", default_value_t = 2000)]
    request_timeout_ms: u64,

    /// Mode the store starts in: maintenance, read-only or read-write
    #[arg(long, env = "IPROTO_INITIAL_MODE", default_value = "read-write")]
    initial_mode: Mode,

    /// Length of a rate limiting window, in milliseconds
    #[arg(long, env = "IPROTO_RATE_WINDOW_MS", default_value_t = 1000)]
    rate_window_ms: u64,

    /// Requests allowed per client in one window
    #[arg(long, env = "IPROTO_RATE_LIMIT", default_value_t = 100)]
    rate_limit: u32,

    /// How often stale rate limiting windows are evicted, in milliseconds
    #[arg(long, env = "IPROTO_RATE_SWEEP_MS", default_value_t = 5000)]
    rate_sweep_ms: u64,

    /// How long a closed rate limiting window is kept, in milliseconds
    #[arg(long, env = "IPROTO_RATE_EVICTION_MS", default_value_t = 1000)]
    rate_eviction_ms: u64,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config::default()
            .with_address(args.address)
            .with_max_clients(args.max_clients)
            .with_request_timeout(Duration::from_millis(args.request_timeout_ms))
            .with_initial_mode(args.initial_mode)
            .with_limiter(LimiterConfig {
                window: Duration::from_millis(args.rate_window_ms),
                limit: args.rate_limit,
                sweep_interval: Duration::from_millis(args.rate_sweep_ms),
                eviction_age: Duration::from_millis(args.rate_eviction_ms),
            })
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    server::run(args.into(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    })
    .await
}
