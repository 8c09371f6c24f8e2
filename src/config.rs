//! Configuration for the database layer.
//!
//! Plain structs with builder-style setters and environment overrides. The
//! library reads `FIXTUREDB_*` variables on request ([`DbConfig::from_env`])
//! and never touches the environment otherwise — wiring (dotenv loading,
//! CLI flags) belongs to the harness around this crate.

use secrecy::SecretString;
use std::time::Duration;

/// Reconnect policy for the single backend connection.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total connect attempts before the budget is exhausted.
    pub connect_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Terminate the process when the budget is exhausted (there is no
    /// degraded mode). Disable only when the embedding caller owns shutdown —
    /// tests do, so the exhaustion path stays observable.
    pub exit_on_exhaustion: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            retry_delay: Duration::from_secs(20),
            exit_on_exhaustion: true,
        }
    }
}

impl RetryConfig {
    /// Sets the total connect attempts (minimum 1).
    #[must_use]
    pub const fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Sets the inter-attempt delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the exhaustion policy.
    #[must_use]
    pub const fn with_exit_on_exhaustion(mut self, exit: bool) -> Self {
        self.exit_on_exhaustion = exit;
        self
    }
}

/// Connection endpoint, credentials, and operational tuning.
///
/// The password is held in a [`SecretString`] so accidental `Debug` output
/// stays redacted.
#[derive(Debug)]
pub struct DbConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: SecretString,
    /// Schema name.
    pub database: String,
    /// Reconnect policy.
    pub retry: RetryConfig,
    /// Delay between advisory-lock acquisition polls.
    pub lock_poll_delay: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: SecretString::from(String::new()),
            database: "test".to_string(),
            retry: RetryConfig::default(),
            lock_poll_delay: Duration::from_secs(10),
        }
    }
}

impl DbConfig {
    /// Loads configuration from `FIXTUREDB_*` environment variables over the
    /// defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    ///
    /// Recognized variables: `FIXTUREDB_HOST`, `FIXTUREDB_PORT`,
    /// `FIXTUREDB_USER`, `FIXTUREDB_PASSWORD`, `FIXTUREDB_DATABASE`,
    /// `FIXTUREDB_CONNECT_ATTEMPTS`, `FIXTUREDB_RETRY_DELAY_SECS`,
    /// `FIXTUREDB_LOCK_POLL_SECS`. Unparseable numeric values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("FIXTUREDB_HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("FIXTUREDB_PORT") {
            if let Ok(parsed) = v.parse::<u16>() {
                self.port = parsed;
            }
        }
        if let Ok(v) = std::env::var("FIXTUREDB_USER") {
            self.user = v;
        }
        if let Ok(v) = std::env::var("FIXTUREDB_PASSWORD") {
            self.password = SecretString::from(v);
        }
        if let Ok(v) = std::env::var("FIXTUREDB_DATABASE") {
            self.database = v;
        }
        if let Ok(v) = std::env::var("FIXTUREDB_CONNECT_ATTEMPTS") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.retry.connect_attempts = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("FIXTUREDB_RETRY_DELAY_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.retry.retry_delay = Duration::from_secs(parsed);
            }
        }
        if let Ok(v) = std::env::var("FIXTUREDB_LOCK_POLL_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.lock_poll_delay = Duration::from_secs(parsed);
            }
        }
        self
    }

    /// Sets the host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the login user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Sets the login password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = SecretString::from(password.into());
        self
    }

    /// Sets the schema name.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the reconnect policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the advisory-lock poll delay.
    #[must_use]
    pub const fn with_lock_poll_delay(mut self, delay: Duration) -> Self {
        self.lock_poll_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3306);
        assert_eq!(config.retry.connect_attempts, 3);
        assert_eq!(config.retry.retry_delay, Duration::from_secs(20));
        assert!(config.retry.exit_on_exhaustion);
        assert_eq!(config.lock_poll_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_chain() {
        let config = DbConfig::default()
            .with_host("db.internal")
            .with_port(3307)
            .with_user("qa")
            .with_password("hunter2")
            .with_database("toto")
            .with_retry(
                RetryConfig::default()
                    .with_connect_attempts(5)
                    .with_retry_delay(Duration::from_millis(50))
                    .with_exit_on_exhaustion(false),
            );
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 3307);
        assert_eq!(config.user, "qa");
        assert_eq!(config.password.expose_secret(), "hunter2");
        assert_eq!(config.database, "toto");
        assert_eq!(config.retry.connect_attempts, 5);
        assert!(!config.retry.exit_on_exhaustion);
    }

    #[test]
    fn test_connect_attempts_clamped_to_one() {
        let retry = RetryConfig::default().with_connect_attempts(0);
        assert_eq!(retry.connect_attempts, 1);
    }

    #[test]
    fn test_password_debug_is_redacted() {
        let config = DbConfig::default().with_password("topsecret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("topsecret"));
    }
}
