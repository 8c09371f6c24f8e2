//! Cooperative advisory locks.
//!
//! Cross-process mutual exclusion for a named resource, layered on a plain
//! lock table (`fixture_locks`: key, owner, value, auto-refreshed timestamp).
//! A lock is considered held while a row for the key exists under a different
//! owner and was refreshed within the staleness window; acquisition polls
//! until the holder releases or goes stale, then claims the row via
//! `replace into`.
//!
//! This is a coarse cooperative lock, not a consensus primitive: two
//! processes can briefly overlap at acquisition under adversarial timing.
//! It exists so concurrent suite runs do not trample each other's fixtures,
//! not to guard correctness-critical invariants.

use crate::driver::Driver;
use crate::executor::Database;
use crate::filter::Filter;
use crate::query::{WriteAction, build_query, build_write};
use crate::value::{Record, SqlValue};
use crate::Result;

const LOCK_TABLE: &str = "fixture_locks";

const CREATE_LOCK_TABLE: &str = "CREATE TABLE IF NOT EXISTS `fixture_locks`(\
`lock_key` VARCHAR(64) NOT NULL,\
`lock_owner` VARCHAR(64),\
`lock_value` VARCHAR(128),\
`lock_refreshed` datetime DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,\
PRIMARY KEY(`lock_key`))";

const HOLDER_PROBE: &str = "select `lock_refreshed` from `fixture_locks` \
where `lock_key` = ? and `lock_owner` != ? \
and TIMESTAMPDIFF(MINUTE, `lock_refreshed`, NOW()) < ?";

impl<D: Driver> Database<D> {
    /// Acquires the advisory lock for `key` on behalf of `owner`, blocking
    /// while another owner holds it fresh.
    ///
    /// A holder is stale once its row has not been refreshed for
    /// `staleness_minutes`; stale holders are overridden. The poll delay
    /// comes from [`crate::DbConfig::lock_poll_delay`]. Re-acquiring a key
    /// already owned by `owner` refreshes it without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Query`] for backend rejections.
    pub fn acquire_lock(
        &mut self,
        key: &str,
        owner: &str,
        value: Option<&str>,
        staleness_minutes: u32,
    ) -> Result<()> {
        self.execute(CREATE_LOCK_TABLE, &[])?;
        loop {
            let holder = self.query_scalar(
                HOLDER_PROBE,
                &[
                    key.into(),
                    owner.into(),
                    SqlValue::UInt(u64::from(staleness_minutes)),
                ],
            )?;
            let Some(refreshed) = holder else { break };
            tracing::info!(
                key,
                owner,
                refreshed = ?refreshed,
                "resource held by another owner; waiting for release or staleness"
            );
            std::thread::sleep(self.config().lock_poll_delay);
        }
        let row = Record::new()
            .with("lock_key", key)
            .with("lock_owner", owner)
            .with("lock_value", value.map(str::to_string));
        let table = self.tables().resolve_shadow(LOCK_TABLE)?;
        let statement = build_write(WriteAction::Replace, &table, &row, &Filter::new())?;
        self.execute_compiled(&statement)?;
        tracing::info!(key, owner, "advisory lock acquired");
        Ok(())
    }

    /// Releases the advisory locks for `keys` regardless of owner.
    ///
    /// Returns the number of lock rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Query`] for backend rejections.
    pub fn release_locks(&mut self, keys: &[&str]) -> Result<u64> {
        let table = self.tables().resolve_shadow(LOCK_TABLE)?;
        let filter = Filter::new().with("lock_key", keys.to_vec());
        let statement = build_query("delete", &table, &filter, None, None)?;
        let released = self.execute_compiled(&statement)?;
        tracing::info!(keys = ?keys, released, "advisory locks released");
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DbConfig, RetryConfig};
    use crate::driver::ResultSet;
    use crate::driver::mock::MockDriver;
    use crate::table::TableRegistry;
    use std::time::Duration;

    fn test_db(driver: &MockDriver) -> Database<MockDriver> {
        let config = DbConfig::default()
            .with_retry(
                RetryConfig::default()
                    .with_retry_delay(Duration::from_millis(1))
                    .with_exit_on_exhaustion(false),
            )
            .with_lock_poll_delay(Duration::from_millis(1));
        let tables = TableRegistry::new(["s_match"]).unwrap();
        Database::connect_with(driver.clone(), config, tables).unwrap()
    }

    #[test]
    fn test_acquire_free_lock_claims_immediately() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        db.acquire_lock("draw_review", "worker-1", Some("case-12"), 20)
            .unwrap();

        assert_eq!(
            driver
                .statements_containing("CREATE TABLE IF NOT EXISTS `fixture_locks`")
                .len(),
            1
        );
        assert_eq!(
            driver.statements_containing("replace into `fixture_locks`"),
            ["replace into `fixture_locks` set `lock_key`=?,`lock_owner`=?,`lock_value`=?"]
        );
    }

    #[test]
    fn test_acquire_waits_while_held_fresh() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        // One poll finds a fresh holder; the next finds the lock free.
        driver.enqueue(ResultSet::new(
            ["lock_refreshed"],
            vec![vec![SqlValue::Text("2026-08-07 12:00:00".into())]],
        ));
        db.acquire_lock("draw_review", "worker-1", None, 20).unwrap();

        let probes = driver.statements_containing("TIMESTAMPDIFF");
        assert_eq!(probes.len(), 2);
        assert_eq!(
            driver
                .statements_containing("replace into `fixture_locks`")
                .len(),
            1
        );
    }

    #[test]
    fn test_release_deletes_by_key_list() {
        let driver = MockDriver::new();
        let mut db = test_db(&driver);
        db.release_locks(&["draw_review", "team_edit"]).unwrap();
        assert_eq!(
            driver.statements_containing("delete from `fixture_locks`"),
            ["delete from `fixture_locks` where `lock_key` in (?,?)"]
        );
    }
}
