//! Client, pool and HTTP-transport configuration.
//!
//! Every knob has a default, can be loaded from the environment
//! (`QUORUMDB_*` variables, durations in seconds), and can be overridden
//! with builder-style `with_*` methods:
//!
//! ```
//! use quorumdb_common::config::{ClientConfig, PoolConfig};
//! use std::time::Duration;
//!
//! let config = ClientConfig::default()
//!     .with_server_url("http://127.0.0.1:8080")
//!     .with_pool(
//!         PoolConfig::default()
//!             .with_scale_up_batch(5)
//!             .with_idle_timeout(Duration::from_secs(120)),
//!     );
//! assert_eq!(config.pool.scale_up_batch, 5);
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::protocol::error::Result;

// Pool defaults.
const DEFAULT_MAX_SESSIONS: usize = 10;
const DEFAULT_MAX_WRITE_SESSIONS: usize = 1;
const DEFAULT_SCALE_UP_THRESHOLD: usize = 10;
const DEFAULT_SCALE_UP_BATCH: usize = 3;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DEFAULT_SCALE_DOWN_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_CONNECTION_TTL: Duration = Duration::from_secs(60 * 60);
const DEFAULT_USAGE_WINDOW: usize = 100;

// HTTP transport defaults.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_MAX_IDLE_PER_HOST: usize = 100;

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Settings for the per-intent session pools and their scaling behaviour.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on read sessions per node, used when the cluster status
    /// does not report a per-node ceiling.
    pub max_sessions: usize,
    /// Upper bound on write sessions per node. Defaults to 1 so writes to
    /// the leader serialise through a single session.
    pub max_write_sessions: usize,
    /// Active-request level at which a scale-up is triggered.
    pub scale_up_threshold: usize,
    /// Sessions added per scale-up; also the effective per-node minimum the
    /// reaper maintains.
    pub scale_up_batch: usize,
    /// A session unused for this long becomes eligible for reaping.
    pub idle_timeout: Duration,
    /// How often the reaper runs.
    pub scale_down_interval: Duration,
    /// Maximum session lifetime before its token is refreshed.
    pub connection_ttl: Duration,
    /// Size of the per-node usage-history ring.
    pub usage_window: usize,
    /// `true` gives every session its own HTTP transport; `false` shares one
    /// transport per node.
    pub multi_client: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_write_sessions: DEFAULT_MAX_WRITE_SESSIONS,
            scale_up_threshold: DEFAULT_SCALE_UP_THRESHOLD,
            scale_up_batch: DEFAULT_SCALE_UP_BATCH,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            scale_down_interval: DEFAULT_SCALE_DOWN_INTERVAL,
            connection_ttl: DEFAULT_CONNECTION_TTL,
            usage_window: DEFAULT_USAGE_WINDOW,
            multi_client: false,
        }
    }
}

impl PoolConfig {
    /// Loads the pool settings from `QUORUMDB_*` environment variables,
    /// falling back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            max_sessions: env_parse("QUORUMDB_POOL_MAXIMUM", DEFAULT_MAX_SESSIONS),
            max_write_sessions: env_parse("QUORUMDB_WRITE_POOL_MAXIMUM", DEFAULT_MAX_WRITE_SESSIONS),
            scale_up_threshold: env_parse("QUORUMDB_SCALE_UP_THRESHOLD", DEFAULT_SCALE_UP_THRESHOLD),
            scale_up_batch: env_parse("QUORUMDB_SCALE_UP_BATCH", DEFAULT_SCALE_UP_BATCH),
            idle_timeout: env_secs("QUORUMDB_POOL_IDLE_TIMEOUT", DEFAULT_IDLE_TIMEOUT),
            scale_down_interval: env_secs("QUORUMDB_SCALE_DOWN_INTERVAL", DEFAULT_SCALE_DOWN_INTERVAL),
            connection_ttl: env_secs("QUORUMDB_CONNECTION_TTL", DEFAULT_CONNECTION_TTL),
            usage_window: env_parse("QUORUMDB_USAGE_WINDOW", DEFAULT_USAGE_WINDOW),
            multi_client: env_parse("QUORUMDB_MULTI_CLIENT", false),
        }
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_max_write_sessions(mut self, max: usize) -> Self {
        self.max_write_sessions = max;
        self
    }

    pub fn with_scale_up_threshold(mut self, threshold: usize) -> Self {
        self.scale_up_threshold = threshold;
        self
    }

    pub fn with_scale_up_batch(mut self, batch: usize) -> Self {
        self.scale_up_batch = batch;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_scale_down_interval(mut self, interval: Duration) -> Self {
        self.scale_down_interval = interval;
        self
    }

    pub fn with_connection_ttl(mut self, ttl: Duration) -> Self {
        self.connection_ttl = ttl;
        self
    }

    pub fn with_usage_window(mut self, window: usize) -> Self {
        self.usage_window = window;
        self
    }

    pub fn with_multi_client(mut self, multi: bool) -> Self {
        self.multi_client = multi;
        self
    }

    /// Per-node minimum the reaper maintains for a pool with the given write
    /// ceiling. For read pools this is the scale-up batch; for write pools
    /// the batch is clamped to the write ceiling so a ceiling of 1 is never
    /// overshot.
    pub fn min_sessions_for(&self, is_write_pool: bool) -> usize {
        if is_write_pool {
            self.scale_up_batch.min(self.max_write_sessions)
        } else {
            self.scale_up_batch
        }
    }
}

/// Settings applied to every `reqwest::Client` the library builds.
///
/// These map one-to-one onto the reqwest builder; TLS policy itself is left
/// to the host HTTP stack.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Overall per-request timeout.
    pub timeout: Duration,
    /// Connection (dial) timeout.
    pub connect_timeout: Duration,
    /// TCP keep-alive interval.
    pub keep_alive: Duration,
    /// How long an idle connection stays in reqwest's own pool.
    pub pool_idle_timeout: Duration,
    /// Idle connections kept per host.
    pub max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keep_alive: DEFAULT_KEEP_ALIVE,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
        }
    }
}

impl HttpConfig {
    pub fn from_env() -> Self {
        Self {
            timeout: env_secs("QUORUMDB_HTTP_TIMEOUT", DEFAULT_HTTP_TIMEOUT),
            connect_timeout: env_secs("QUORUMDB_HTTP_DIAL_TIMEOUT", DEFAULT_CONNECT_TIMEOUT),
            keep_alive: env_secs("QUORUMDB_HTTP_KEEP_ALIVE", DEFAULT_KEEP_ALIVE),
            pool_idle_timeout: env_secs("QUORUMDB_HTTP_IDLE_CONN_TIMEOUT", DEFAULT_POOL_IDLE_TIMEOUT),
            max_idle_per_host: env_parse(
                "QUORUMDB_HTTP_MAX_IDLE_CONNS_PER_HOST",
                DEFAULT_MAX_IDLE_PER_HOST,
            ),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }

    /// Builds a `reqwest::Client` with these settings applied.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .tcp_keepalive(self.keep_alive)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.max_idle_per_host)
            .build()?;
        Ok(client)
    }
}

/// Top-level client configuration: where the cluster is, how to identify and
/// authenticate, and the pool/transport settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub api_key: String,
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub pool: PoolConfig,
    pub http: HttpConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            api_key: "development_api_key".to_string(),
            client_id: "development_client_id".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            pool: PoolConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads the full configuration from `QUORUMDB_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            server_url: env_string("QUORUMDB_SERVER_URL", "http://localhost:8080"),
            api_key: env_string("QUORUMDB_API_KEY", "development_api_key"),
            client_id: env_string("QUORUMDB_CLIENT_ID", "development_client_id"),
            username: env_string("QUORUMDB_USERNAME", "admin"),
            password: env_string("QUORUMDB_PASSWORD", "admin"),
            pool: PoolConfig::from_env(),
            http: HttpConfig::from_env(),
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }
}
