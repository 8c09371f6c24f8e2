//! End-to-end checkpoint and restore flows over the scripted mock driver.
//!
//! These tests drive the public API the way the regression harness does:
//! back a table up, mutate nothing, restore with the same filter, and check
//! that what reaches the wire is symmetric; render a file backup and replay
//! it through the script path.

use fixturedb::{
    BackupSelection, Database, DbConfig, Filter, MockDriver, ResultSet, RetryConfig, SqlValue,
    TableRegistry,
};
use std::time::Duration;

fn harness_db(driver: &MockDriver) -> Database<MockDriver> {
    let config = DbConfig::default().with_retry(
        RetryConfig::default()
            .with_retry_delay(Duration::from_millis(1))
            .with_exit_on_exhaustion(false),
    );
    let tables = TableRegistry::new(["s_match", "d_batch", "game_draw"]).unwrap();
    Database::connect_with(driver.clone(), config, tables).unwrap()
}

#[test]
fn backup_then_restore_round_trip_is_symmetric() {
    let driver = MockDriver::new();
    let mut db = harness_db(&driver);
    driver.respond_when(
        "show create table `s_match`",
        ResultSet::new(
            ["Table", "Create Table"],
            vec![vec![
                SqlValue::Text("s_match".into()),
                SqlValue::Text(
                    "CREATE TABLE `s_match` (`match_id` int NOT NULL, PRIMARY KEY (`match_id`)) ENGINE=InnoDB".into(),
                ),
            ]],
        ),
    );
    driver.respond_when(
        "SHOW TABLES LIKE ?",
        ResultSet::new(
            ["Tables_in_test"],
            vec![vec![SqlValue::Text("s_match_bak".into())]],
        ),
    );

    let filter = Filter::new().with("season_id", 2026).with("status__not", 9);
    db.lifecycle().backup_to_table("s_match", &filter, None).unwrap();
    db.lifecycle().recover_from_table("s_match", &filter, None).unwrap();

    let backup = driver.statements_containing("replace into `s_match_bak`");
    let restore = driver.statements_containing("replace into `s_match` select");
    assert_eq!(
        backup,
        ["replace into `s_match_bak` select * from `s_match` where `season_id`=? and `status`!=?"]
    );
    assert_eq!(
        restore,
        ["replace into `s_match` select * from `s_match_bak` where `season_id`=? and `status`!=?"]
    );

    // Identical predicates, identical arguments: the restore targets exactly
    // the row set the backup captured.
    let log = driver.statements();
    let backup_args = &log.iter().find(|s| s.sql.contains("`s_match_bak` select")).unwrap().args;
    let restore_args = &log
        .iter()
        .find(|s| s.sql.contains("`s_match` select"))
        .unwrap()
        .args;
    assert_eq!(backup_args, restore_args);
}

#[test]
fn file_backup_replays_row_for_row() {
    let driver = MockDriver::new();
    let mut db = harness_db(&driver);
    driver.respond_when(
        "information_schema.columns",
        ResultSet::new(
            ["COLUMN_NAME"],
            vec![
                vec![SqlValue::Text("match_id".into())],
                vec![SqlValue::Text("home_team".into())],
                vec![SqlValue::Text("odds".into())],
            ],
        ),
    );
    driver.respond_when(
        "select * from `s_match`",
        ResultSet::new(
            ["match_id", "home_team", "odds"],
            vec![
                vec![
                    SqlValue::Int(11),
                    SqlValue::Text("o'neil; united".into()),
                    SqlValue::Double(3.5),
                ],
                vec![SqlValue::Int(12), SqlValue::Null, SqlValue::Null],
            ],
        ),
    );

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("backups").join("s_match.sql");
    let written = db
        .lifecycle()
        .backup_to_file(&path, "s_match", &Filter::new())
        .unwrap();
    assert_eq!(written, 2);

    driver.clear_statements();
    let replayed = db.run_script_file(&path).unwrap();
    assert_eq!(replayed, 2);

    let statements = driver.statements_containing("replace into `s_match`");
    assert_eq!(statements.len(), 2);
    // The first fragment carries the script's header comment; the statement
    // itself must end with the original row rendered as literals.
    assert!(statements[0].ends_with(
        "replace into `s_match` (`match_id`,`home_team`,`odds`) values (11,'o\\'neil; united',3.5)"
    ));
    assert_eq!(
        statements[1],
        "replace into `s_match` (`match_id`,`home_team`,`odds`) values (12,NULL,NULL)"
    );
}

#[test]
fn partition_maintenance_is_idempotent_through_the_public_api() {
    let driver = MockDriver::new();
    let mut db = harness_db(&driver);
    driver.respond_when(
        "PARTITION_NAME",
        ResultSet::new(
            ["PARTITION_NAME"],
            vec![vec![SqlValue::Text("p20260807".into())]],
        ),
    );

    let first = db
        .lifecycle()
        .add_partitions("d_batch", &["20260807", "20260808"], "p")
        .unwrap();
    assert_eq!(first, ["p20260808"]);

    // Simulate the backend now reporting both partitions present.
    driver.clear_statements();
    let driver2 = MockDriver::new();
    let mut db2 = harness_db(&driver2);
    driver2.respond_when(
        "PARTITION_NAME",
        ResultSet::new(
            ["PARTITION_NAME"],
            vec![
                vec![SqlValue::Text("p20260807".into())],
                vec![SqlValue::Text("p20260808".into())],
            ],
        ),
    );
    let second = db2
        .lifecycle()
        .add_partitions("d_batch", &["20260807", "20260808"], "p")
        .unwrap();
    assert!(second.is_empty());
    assert!(driver2.statements_containing("alter table").is_empty());
}

#[test]
fn suite_setup_purges_shadow_tables() {
    let driver = MockDriver::new();
    let mut db = harness_db(&driver);
    driver.respond_when(
        "show tables like '%_bak'",
        ResultSet::new(
            ["Tables_in_test"],
            vec![
                vec![SqlValue::Text("s_match_bak".into())],
                vec![SqlValue::Text("game_draw_bak".into())],
            ],
        ),
    );
    driver.respond_when(
        "show tables like '%__snapshot'",
        ResultSet::new(
            ["Tables_in_test"],
            vec![vec![SqlValue::Text("game_draw__snapshot".into())]],
        ),
    );

    let baks = db
        .lifecycle()
        .purge_backup_tables(BackupSelection::All, &["game_draw_bak"])
        .unwrap();
    assert_eq!(baks, ["s_match_bak"]);

    let snapshots = db.lifecycle().purge_snapshot_tables().unwrap();
    assert_eq!(snapshots, ["game_draw__snapshot"]);
}
