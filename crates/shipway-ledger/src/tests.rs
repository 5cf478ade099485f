use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use shipway_core::{Patch, PatchId, PatchKind};

use super::*;
use crate::driver::{sql_quote, unescape_field};

#[derive(Default)]
struct ScriptedDriver {
    log: RefCell<Vec<String>>,
    responses: RefCell<VecDeque<Vec<Vec<Option<String>>>>>,
}

impl ScriptedDriver {
    fn respond(self, rows: Vec<Vec<Option<String>>>) -> Self {
        self.responses.borrow_mut().push_back(rows);
        self
    }

    fn log(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}

impl SqlDriver for ScriptedDriver {
    fn execute(&self, sql: &str) -> Result<(), SqlError> {
        self.log.borrow_mut().push(sql.to_string());
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>, SqlError> {
        self.log.borrow_mut().push(sql.to_string());
        Ok(self.responses.borrow_mut().pop_front().unwrap_or_default())
    }
}

fn row(fields: &[Option<&str>]) -> Vec<Option<String>> {
    fields
        .iter()
        .map(|field| field.map(str::to_string))
        .collect()
}

fn patch(raw: &str, up: &str, down: &str, deps: &[&str]) -> Patch {
    Patch {
        id: raw.parse().expect("patch identity should parse"),
        name: format!("sql_{raw}_patch"),
        path: PathBuf::from(format!("database/sql_{raw}_patch.sql")),
        kind: PatchKind::Small,
        active: true,
        up: up.to_string(),
        down: down.to_string(),
        declared_dependencies: deps
            .iter()
            .map(|dep| dep.parse().expect("dependency should parse"))
            .collect(),
    }
}

fn at(date: (i32, u32, u32), time: (u32, u32, u32)) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(date.0, date.1, date.2)
        .expect("valid date")
        .and_hms_opt(time.0, time.1, time.2)
        .expect("valid time")
}

#[test]
fn ledger_exists_checks_for_table() {
    let driver = ScriptedDriver::default().respond(vec![row(&[Some("db_patches")])]);
    assert!(Ledger::new(&driver).exists().expect("query should succeed"));
    assert_eq!(driver.log(), vec!["SHOW TABLES LIKE 'db_patches'"]);

    let driver = ScriptedDriver::default().respond(vec![]);
    assert!(!Ledger::new(&driver).exists().expect("query should succeed"));
}

#[test]
fn load_parses_live_rows() {
    let driver = ScriptedDriver::default().respond(vec![
        row(&[
            Some("sql_19700101_000000_patch_ledger"),
            Some("19700101_000000"),
            None,
            Some("2024-05-01 10:00:00"),
            None,
        ]),
        row(&[
            Some("sql_20230401_120000_create_users"),
            Some("20230401_120000"),
            Some("19700101_000000\n20230101_000000"),
            Some("2024-05-01 10:00:02"),
            None,
        ]),
    ]);

    let records = Ledger::new(&driver).load().expect("load should succeed");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "sql_19700101_000000_patch_ledger");
    assert!(records[0].dependencies.is_empty());
    assert_eq!(records[1].id.as_str(), "20230401_120000");
    assert_eq!(
        records[1].dependencies,
        vec![PatchId::genesis(), "20230101_000000".parse().expect("id")]
    );
    assert_eq!(records[1].applied_at, at((2024, 5, 1), (10, 0, 2)));
}

#[test]
fn load_reports_crashed_update() {
    let driver = ScriptedDriver::default().respond(vec![row(&[
        Some("sql_20230401_120000_create_users"),
        Some("20230401_120000"),
        None,
        None,
        None,
    ])]);

    let err = Ledger::new(&driver).load().expect_err("crashed row must fail");
    assert_eq!(
        err.to_string(),
        "Patch sql_20230401_120000_create_users has crashed at previous update !"
    );
}

#[test]
fn load_reports_crashed_rows_in_plural() {
    let driver = ScriptedDriver::default().respond(vec![
        row(&[Some("sql_a"), Some("20230101_000000"), None, None, None]),
        row(&[Some("sql_b"), Some("20230201_000000"), None, None, None]),
        row(&[
            Some("sql_c"),
            Some("20230301_000000"),
            None,
            Some("2024-05-01 10:00:00"),
            Some("2024-06-01 09:00:00"),
        ]),
    ]);

    let err = Ledger::new(&driver).load().expect_err("crashed rows must fail");
    let message = err.to_string();
    assert!(
        message.contains("Patches sql_a, sql_b have crashed at previous update !"),
        "unexpected message: {message}"
    );
    assert!(
        message.contains("Patch sql_c has crashed at previous rollback !"),
        "unexpected message: {message}"
    );
}

#[test]
fn apply_books_pending_row_before_running_up() {
    let driver = ScriptedDriver::default();
    let executor = PatchExecutor::new(&driver, at((2024, 5, 1), (10, 0, 0)));
    let patch = patch(
        "20230401_120000",
        "CREATE TABLE users (id INT);",
        "DROP TABLE users;",
        &[],
    );

    executor.apply(&patch, false).expect("apply should succeed");

    let log = driver.log();
    assert_eq!(log.len(), 3);
    assert!(
        log[0].starts_with("INSERT INTO db_patches (patch_name, patch_timestamp, down_sql, dependencies)"),
        "unexpected first statement: {}",
        log[0]
    );
    assert!(log[0].contains("'sql_20230401_120000_patch'"));
    assert!(log[0].contains("'DROP TABLE users;'"));
    assert!(log[0].contains("'19700101_000000'"));
    assert_eq!(log[1], "START TRANSACTION;\nCREATE TABLE users (id INT);\nCOMMIT;");
    assert!(log[2].starts_with("UPDATE db_patches SET applied_at = '2024-05-01 10:00:00'"));
    assert!(log[2].ends_with("WHERE patch_name = 'sql_20230401_120000_patch'"));
}

#[test]
fn apply_runs_the_up_action_as_one_transaction() {
    let driver = ScriptedDriver::default();
    let executor = PatchExecutor::new(&driver, at((2024, 5, 1), (10, 0, 0)));
    let patch = patch(
        "20230401_120000",
        "INSERT INTO a VALUES (1);\nINSERT INTO b VALUES (2);",
        "DELETE FROM b;\nDELETE FROM a;",
        &[],
    );

    executor.apply(&patch, false).expect("apply should succeed");

    let log = driver.log();
    assert_eq!(log.len(), 3);
    assert_eq!(
        log[1],
        "START TRANSACTION;\nINSERT INTO a VALUES (1);\nINSERT INTO b VALUES (2);\nCOMMIT;",
        "a multi-statement up action must travel in one bracketed batch"
    );
    assert!(
        !log[0].contains("START TRANSACTION") && !log[2].contains("START TRANSACTION"),
        "the bookkeeping statements stay outside the transaction"
    );
}

#[test]
fn apply_register_only_books_without_running() {
    let driver = ScriptedDriver::default();
    let executor = PatchExecutor::new(&driver, at((2024, 5, 1), (10, 0, 0)));
    let patch = patch("20230401_120000", "CREATE TABLE users (id INT);", "", &[]);

    executor.apply(&patch, true).expect("apply should succeed");

    let log = driver.log();
    assert_eq!(log.len(), 2);
    assert!(log[0].starts_with("INSERT INTO db_patches"));
    assert!(log[0].contains("NULL"), "empty down action should book as NULL");
    assert!(log[1].starts_with("UPDATE db_patches SET applied_at"));
}

#[test]
fn apply_genesis_creates_table_then_records_itself() {
    let driver = ScriptedDriver::default();
    let executor = PatchExecutor::new(&driver, at((2024, 5, 1), (10, 0, 0)));

    executor
        .apply(&genesis_patch(), false)
        .expect("apply should succeed");

    let log = driver.log();
    assert_eq!(log.len(), 2);
    assert!(
        log[0].starts_with("START TRANSACTION;\nCREATE TABLE db_patches"),
        "unexpected statement: {}",
        log[0]
    );
    assert!(
        log[1].starts_with("INSERT INTO db_patches (patch_name, patch_timestamp, applied_at)"),
        "unexpected statement: {}",
        log[1]
    );
    assert!(log[1].contains("'sql_19700101_000000_patch_ledger'"));
    assert!(log[1].contains("'2024-05-01 10:00:00'"));
}

#[test]
fn revert_runs_recorded_down_action() {
    let driver =
        ScriptedDriver::default().respond(vec![row(&[Some("7"), Some("DROP TABLE users;")])]);
    let executor = PatchExecutor::new(&driver, at((2024, 6, 1), (9, 30, 0)));

    let outcome = executor
        .revert("sql_20230401_120000_patch")
        .expect("revert should succeed");
    assert_eq!(outcome, RevertOutcome::Reverted);

    let log = driver.log();
    assert_eq!(log.len(), 4);
    assert!(log[0].starts_with("SELECT id, down_sql FROM db_patches"));
    assert!(log[0].contains("'sql_20230401_120000_patch'"));
    assert!(log[0].ends_with("ORDER BY applied_at DESC, id DESC LIMIT 1"));
    assert_eq!(
        log[1],
        "UPDATE db_patches SET reverted_at = '2024-06-01 09:30:00' WHERE id = 7"
    );
    assert_eq!(log[2], "START TRANSACTION;\nDROP TABLE users;\nCOMMIT;");
    assert_eq!(log[3], "DELETE FROM db_patches WHERE id = 7");
}

#[test]
fn revert_skips_patch_without_ledger_row() {
    let driver = ScriptedDriver::default().respond(vec![]);
    let executor = PatchExecutor::new(&driver, at((2024, 6, 1), (9, 30, 0)));

    let outcome = executor
        .revert("sql_20230401_120000_patch")
        .expect("revert should succeed");
    assert_eq!(outcome, RevertOutcome::NotRecorded);
    assert_eq!(driver.log().len(), 1, "only the lookup should run");
}

#[test]
fn revert_skips_patch_without_down_action() {
    let driver = ScriptedDriver::default().respond(vec![row(&[Some("7"), None])]);
    let executor = PatchExecutor::new(&driver, at((2024, 6, 1), (9, 30, 0)));

    let outcome = executor
        .revert("sql_20230401_120000_patch")
        .expect("revert should succeed");
    assert_eq!(outcome, RevertOutcome::NoDownAction);
    assert_eq!(driver.log().len(), 1, "only the lookup should run");
}

#[test]
fn apply_then_revert_round_trip() {
    let driver =
        ScriptedDriver::default().respond(vec![row(&[Some("3"), Some("DROP TABLE users;")])]);
    let executor = PatchExecutor::new(&driver, at((2024, 5, 1), (10, 0, 0)));
    let patch = patch(
        "20230401_120000",
        "CREATE TABLE users (id INT);",
        "DROP TABLE users;",
        &[],
    );

    executor.apply(&patch, false).expect("apply should succeed");
    let outcome = executor.revert(&patch.name).expect("revert should succeed");
    assert_eq!(outcome, RevertOutcome::Reverted);

    let log = driver.log();
    assert_eq!(log.len(), 7);
    // The down action that runs is the one booked at apply time, bare in
    // the row and bracketed on the wire.
    assert!(log[0].contains(&sql_quote(&patch.down)));
    assert_eq!(log[5], format!("START TRANSACTION;\n{}\nCOMMIT;", patch.down));
    assert_eq!(log[6], "DELETE FROM db_patches WHERE id = 3");
}

#[test]
fn applied_between_selects_window_newest_first() {
    let record = |raw: &str, applied: NaiveDateTime| LedgerRecord {
        name: format!("sql_{raw}_patch"),
        id: raw.parse().expect("id"),
        dependencies: Vec::new(),
        applied_at: applied,
    };
    let records = vec![
        record("20230101_000000", at((2024, 1, 10), (12, 0, 0))),
        record("20230201_000000", at((2024, 2, 10), (12, 0, 0))),
        record("20230301_000000", at((2024, 2, 10), (12, 0, 0))),
        record("20230401_000000", at((2024, 3, 10), (12, 0, 0))),
    ];

    let window = applied_between(
        &records,
        at((2024, 1, 10), (12, 0, 0)),
        at((2024, 2, 10), (12, 0, 0)),
    );
    assert_eq!(
        window.iter().map(|rec| rec.id.as_str()).collect::<Vec<_>>(),
        vec!["20230301_000000", "20230201_000000"],
        "strictly after the lower bound, inclusive upper bound, newest first"
    );
}

#[test]
fn sql_quote_escapes_literals() {
    assert_eq!(sql_quote("plain"), "'plain'");
    assert_eq!(sql_quote("it's"), "'it''s'");
    assert_eq!(sql_quote("a\\b"), "'a\\\\b'");
}

#[test]
fn parse_batch_output_handles_nulls_and_escapes() {
    let rows = parse_batch_output("7\tDROP TABLE a;\\nDROP TABLE b;\nNULL\tx\\ty\n");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0].as_deref(), Some("7"));
    assert_eq!(rows[0][1].as_deref(), Some("DROP TABLE a;\nDROP TABLE b;"));
    assert_eq!(rows[1][0], None);
    assert_eq!(rows[1][1].as_deref(), Some("x\ty"));
}

#[test]
fn unescape_field_keeps_unknown_escapes() {
    assert_eq!(unescape_field("a\\qb"), "a\\qb");
    assert_eq!(unescape_field("tail\\"), "tail\\");
    assert_eq!(unescape_field("nul\\0"), "nul\0");
}

#[test]
fn execute_transactional_brackets_the_batch() {
    let driver = ScriptedDriver::default();
    driver
        .execute_transactional("INSERT INTO a VALUES (1);\nINSERT INTO b VALUES (2);")
        .expect("execute should succeed");

    assert_eq!(
        driver.log(),
        vec!["START TRANSACTION;\nINSERT INTO a VALUES (1);\nINSERT INTO b VALUES (2);\nCOMMIT;"]
    );
}

#[test]
fn mysql_driver_builds_client_invocation() {
    let driver = MysqlShellDriver::new(MysqlParams {
        host: "db.internal.test".to_string(),
        port: 3307,
        user: "shop_app".to_string(),
        password: Some("s3cret".to_string()),
        database: "shop".to_string(),
        charset: "utf8mb4".to_string(),
    });

    let command = driver.command("SELECT 1", true);
    let args: Vec<String> = command
        .get_args()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect();
    assert_eq!(
        args,
        vec![
            "-h",
            "db.internal.test",
            "-P",
            "3307",
            "-u",
            "shop_app",
            "-ps3cret",
            "--default-character-set=utf8mb4",
            "-e",
            "SELECT 1",
            "--skip-column-names",
            "shop",
        ]
    );

    let debugged = format!("{driver:?}");
    assert!(debugged.contains("*****"), "unexpected debug: {debugged}");
    assert!(!debugged.contains("s3cret"), "password leaked: {debugged}");
}

#[test]
fn mysql_driver_omits_password_flag_when_absent() {
    let driver = MysqlShellDriver::new(MysqlParams {
        host: "db.internal.test".to_string(),
        port: 3306,
        user: "shop_app".to_string(),
        password: None,
        database: "shop".to_string(),
        charset: "utf8".to_string(),
    });

    let args: Vec<String> = driver
        .command("SELECT 1", false)
        .get_args()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect();
    assert!(!args.iter().any(|arg| arg.starts_with("-p")));
    assert!(!args.contains(&"--skip-column-names".to_string()));
}
