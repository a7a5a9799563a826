//! Server configuration.

use std::time::Duration;

use tabletop_room::DEFAULT_OUTBOUND_CAPACITY;
use tabletop_session::DEFAULT_COOKIE_NAME;

const DEV_JWT_SECRET: &str = "tabletop_local_development_jwt_secret_32b";

/// Settings for a [`SyncServer`](crate::SyncServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (host:port).
    pub bind_addr: String,
    /// The only path WebSocket upgrades are accepted on.
    pub socket_path: String,
    /// HS256 secret shared with the REST API. At least 32 bytes.
    pub jwt_secret: String,
    /// Cookie the session token is read from.
    pub cookie_name: String,
    /// A connection that sends nothing for this long is closed.
    pub idle_timeout: Duration,
    /// Upper bound on a fresh connection's upgrade, and again on its
    /// authentication.
    pub handshake_timeout: Duration,
    /// Depth of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// `tracing` filter directive used by [`init_tracing`](crate::init_tracing).
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            socket_path: "/socket".into(),
            jwt_secret: DEV_JWT_SECRET.into(),
            cookie_name: DEFAULT_COOKIE_NAME.into(),
            idle_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            log_filter: "info".into(),
        }
    }
}

impl ServerConfig {
    /// Reads configuration from the environment, falling back to
    /// [`Default`] for anything unset or unparsable.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `TABLETOP_BIND_ADDR` | `127.0.0.1:8080` |
    /// | `TABLETOP_SOCKET_PATH` | `/socket` |
    /// | `TABLETOP_JWT_SECRET` | dev-only placeholder |
    /// | `TABLETOP_COOKIE_NAME` | `tabletop_session` |
    /// | `TABLETOP_IDLE_TIMEOUT_SECS` | `60` |
    /// | `TABLETOP_HANDSHAKE_TIMEOUT_SECS` | `10` |
    /// | `TABLETOP_OUTBOUND_CAPACITY` | `256` |
    /// | `TABLETOP_LOG` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            env(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            bind_addr: env("TABLETOP_BIND_ADDR").unwrap_or(defaults.bind_addr),
            socket_path: env("TABLETOP_SOCKET_PATH").unwrap_or(defaults.socket_path),
            jwt_secret: env("TABLETOP_JWT_SECRET").unwrap_or(defaults.jwt_secret),
            cookie_name: env("TABLETOP_COOKIE_NAME").unwrap_or(defaults.cookie_name),
            idle_timeout: secs("TABLETOP_IDLE_TIMEOUT_SECS", defaults.idle_timeout),
            handshake_timeout: secs("TABLETOP_HANDSHAKE_TIMEOUT_SECS", defaults.handshake_timeout),
            outbound_capacity: env("TABLETOP_OUTBOUND_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.outbound_capacity),
            log_filter: env("TABLETOP_LOG").unwrap_or(defaults.log_filter),
        }
    }

    /// Returns true when using the development-only JWT secret.
    pub fn is_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
