use std::time::Duration;

use crate::store::Mode;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_MAX_CLIENTS: usize = 100;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on
    pub address: String,

    /// Connections handled at the same time. Further clients wait in the listen backlog.
    pub max_clients: usize,

    /// Budget for handling one connection, from accept to the written response.
    pub request_timeout: Duration,

    pub initial_mode: Mode,

    pub limiter: LimiterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            max_clients: DEFAULT_MAX_CLIENTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            initial_mode: Mode::ReadWrite,
            limiter: LimiterConfig::default(),
        }
    }
}

impl Config {
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_initial_mode(mut self, mode: Mode) -> Self {
        self.initial_mode = mode;
        self
    }

    pub fn with_limiter(mut self, limiter: LimiterConfig) -> Self {
        self.limiter = limiter;
        self
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Length of one counting window.
    pub window: Duration,

    /// Requests admitted per client in one window.
    pub limit: u32,

    /// How often stale windows are swept.
    pub sweep_interval: Duration,

    /// How long a window is kept after it closes.
    pub eviction_age: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(1000),
            limit: 100,
            sweep_interval: Duration::from_millis(5000),
            eviction_age: Duration::from_millis(1000),
        }
    }
}
