//! Server configuration, from code or from `CONQUEST_*` environment
//! variables.

use std::str::FromStr;
use std::time::Duration;

use conquest_session::SessionConfig;

/// A configuration value that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is not valid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("min members ({min}) exceeds max members ({max})")]
    MemberBounds { min: usize, max: usize },
}

/// Everything a [`ConquestServer`](crate::ConquestServer) needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// WebSocket listen address.
    pub bind: String,
    /// Status HTTP listen address. `None` disables the HTTP surface.
    pub http_bind: Option<String>,
    pub session: SessionConfig,
    /// How often idle sessions are swept.
    pub sweep_interval: Duration,
    /// How long a new connection may take to send its handshake.
    pub handshake_timeout: Duration,
    /// A connection silent for this long is dropped.
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            http_bind: Some("127.0.0.1:8081".to_string()),
            session: SessionConfig::default(),
            sweep_interval: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Reads `CONQUEST_*` variables over the defaults.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `CONQUEST_BIND` | `bind` |
    /// | `CONQUEST_HTTP_BIND` | `http_bind` (`off` disables) |
    /// | `CONQUEST_MAX_MEMBERS` | `session.max_members` |
    /// | `CONQUEST_MIN_MEMBERS` | `session.min_members` |
    /// | `CONQUEST_SESSION_EXPIRY_SECS` | `session.expiry` |
    /// | `CONQUEST_SWEEP_INTERVAL_SECS` | `sweep_interval` |
    /// | `CONQUEST_HANDSHAKE_TIMEOUT_SECS` | `handshake_timeout` |
    /// | `CONQUEST_IDLE_TIMEOUT_SECS` | `idle_timeout` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(bind) = lookup("CONQUEST_BIND") {
            config.bind = bind;
        }
        if let Some(http) = lookup("CONQUEST_HTTP_BIND") {
            config.http_bind = (!http.eq_ignore_ascii_case("off")).then_some(http);
        }
        if let Some(max) = parse(&lookup, "CONQUEST_MAX_MEMBERS")? {
            config.session.max_members = max;
        }
        if let Some(min) = parse(&lookup, "CONQUEST_MIN_MEMBERS")? {
            config.session.min_members = min;
        }
        if let Some(secs) = parse(&lookup, "CONQUEST_SESSION_EXPIRY_SECS")? {
            config.session.expiry = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "CONQUEST_SWEEP_INTERVAL_SECS")? {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "CONQUEST_HANDSHAKE_TIMEOUT_SECS")? {
            config.handshake_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse(&lookup, "CONQUEST_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = (self.session.min_members, self.session.max_members);
        if min == 0 || min > max {
            return Err(ConfigError::MemberBounds { min, max });
        }
        for (key, interval) in [
            ("CONQUEST_SWEEP_INTERVAL_SECS", self.sweep_interval),
            ("CONQUEST_HANDSHAKE_TIMEOUT_SECS", self.handshake_timeout),
            ("CONQUEST_IDLE_TIMEOUT_SECS", self.idle_timeout),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::Invalid {
                    key,
                    value: "0".into(),
                    reason: "must be positive".into(),
                });
            }
        }
        Ok(())
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        })
}
