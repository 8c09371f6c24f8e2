//! Connection ownership and reconnect policy.
//!
//! A [`ConnectionManager`] owns exactly one backend connection (no pooling)
//! and guards every unit of work with a liveness probe. Transient failures
//! are absorbed here — a failed probe transparently re-runs the bounded
//! connect loop — so higher layers never see a network blip. When the retry
//! budget is exhausted the manager applies the fatal policy: a fixture
//! database that cannot be reached makes every subsequent test result
//! meaningless, so the default is to terminate the process rather than run
//! degraded.

use crate::config::DbConfig;
use crate::driver::{Driver, DriverConnection};
use crate::{Error, Result};

/// Process exit code used when the reconnect budget is exhausted under the
/// default policy.
const EXHAUSTED_EXIT_CODE: i32 = 1;

/// Owns one backend connection and its reconnect policy.
///
/// Acquired on construction, released exactly once on drop; the consuming
/// [`close`](Self::close) makes use-after-close unrepresentable.
pub struct ConnectionManager<D: Driver> {
    driver: D,
    config: DbConfig,
    conn: Option<D::Conn>,
}

impl<D: Driver> ConnectionManager<D> {
    /// Connects and returns the manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFatal`] when the connect budget is
    /// exhausted and the exit policy is disabled; under the default policy
    /// the process terminates instead.
    pub fn open(driver: D, config: DbConfig) -> Result<Self> {
        let mut manager = Self {
            driver,
            config,
            conn: None,
        };
        manager.connect()?;
        Ok(manager)
    }

    /// The configuration this manager was built with.
    pub const fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Runs the bounded connect loop: up to `connect_attempts` attempts with
    /// a fixed delay in between, each failure logged with its attempt count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionFatal`] on exhaustion with the exit policy
    /// disabled.
    pub fn connect(&mut self) -> Result<()> {
        let budget = self.config.retry.connect_attempts.max(1);
        let mut last_cause = String::new();
        for attempt in 1..=budget {
            match self.driver.connect(&self.config) {
                Ok(conn) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "database connection established after retry");
                    }
                    self.conn = Some(conn);
                    return Ok(());
                },
                Err(e) => {
                    last_cause = e.to_string();
                    metrics::counter!("fixturedb_connect_failures_total").increment(1);
                    tracing::warn!(
                        attempt,
                        budget,
                        delay_secs = self.config.retry.retry_delay.as_secs(),
                        error = %last_cause,
                        "database connection failed; retrying after delay"
                    );
                    if attempt < budget {
                        std::thread::sleep(self.config.retry.retry_delay);
                    }
                },
            }
        }
        self.exhausted(budget, last_cause)
    }

    fn exhausted(&self, attempts: u32, cause: String) -> Result<()> {
        metrics::counter!("fixturedb_connect_exhausted_total").increment(1);
        tracing::error!(
            attempts,
            cause = %cause,
            "connection retry budget exhausted; no degraded mode exists"
        );
        if self.config.retry.exit_on_exhaustion {
            std::process::exit(EXHAUSTED_EXIT_CODE);
        }
        Err(Error::ConnectionFatal { attempts, cause })
    }

    /// Probes the connection and reconnects if the probe fails.
    ///
    /// Called before every unit of work, which is what masks transient blips
    /// from the layers above.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::ConnectionFatal`] from the reconnect loop.
    pub fn ensure_live(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.as_mut() {
            if conn.ping() {
                return Ok(());
            }
            metrics::counter!("fixturedb_liveness_failures_total").increment(1);
            tracing::warn!("liveness probe failed; reconnecting");
        }
        self.connect()
    }

    /// Returns the live connection, probing (and reconnecting) first.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::ConnectionFatal`] from the reconnect loop.
    pub fn connection(&mut self) -> Result<&mut D::Conn> {
        self.ensure_live()?;
        self.conn
            .as_mut()
            .ok_or_else(|| Error::Connection("connection unavailable after probe".to_string()))
    }

    /// Releases the connection. Dropping the manager has the same effect;
    /// consuming `self` simply makes the release point explicit at call
    /// sites that want one.
    pub fn close(mut self) {
        self.conn.take();
    }
}
