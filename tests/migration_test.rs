//! End-to-end tests for the migration engine.
//!
//! These tests exercise the full discover/snapshot/apply/record cycle
//! against real database files and migration script directories.

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use iftttwh::{Migrator, Storage};

/// Create a workspace with an empty database file and a migrations directory.
fn setup() -> (TempDir, PathBuf, PathBuf) {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp.path().join("tweets.db");
    let migrations_dir = temp.path().join("migrations");
    fs::create_dir_all(&migrations_dir).expect("Failed to create migrations dir");

    // Opening creates a valid empty database file.
    drop(Storage::open(&db_path).expect("Failed to create database"));

    (temp, db_path, migrations_dir)
}

fn write_script(dir: &std::path::Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).expect("Failed to write migration script");
}

const CREATE_TWEETS: &str = "
CREATE TABLE tweets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_name TEXT,
    link_to_tweet TEXT,
    created_at TEXT,
    created_at_parsed TIMESTAMP,
    text TEXT,
    received_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
";

fn insert_stmt(user: &str, link: &str, text: &str) -> String {
    format!(
        "INSERT INTO tweets (user_name, link_to_tweet, text) VALUES ('{user}', '{link}', '{text}');\n"
    )
}

#[test]
fn applies_scripts_in_ordinal_order() {
    let (_temp, db_path, migrations_dir) = setup();
    // Written out of lexical order on disk to prove ordering comes from
    // the numeric prefix.
    write_script(
        &migrations_dir,
        "002_seed_data.sql",
        &insert_stmt("alice", "https://t.co/1", "hello"),
    );
    write_script(&migrations_dir, "001_create_tweets.sql", CREATE_TWEETS);

    let migrator = Migrator::new(&db_path, &migrations_dir);
    let report = migrator.run().expect("Migration run failed");

    assert!(report.is_success());
    let names: Vec<&str> = report.applied.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["001_create_tweets", "002_seed_data"]);

    let storage = Storage::open(&db_path).unwrap();
    assert_eq!(storage.count_tweets().unwrap(), 1);
}

#[test]
fn second_run_is_a_noop() {
    let (_temp, db_path, migrations_dir) = setup();
    write_script(&migrations_dir, "001_create_tweets.sql", CREATE_TWEETS);

    let migrator = Migrator::new(&db_path, &migrations_dir);
    migrator.run().expect("First run failed");

    let report = migrator.run().expect("Second run failed");
    assert!(report.is_success());
    assert!(report.applied.is_empty());
}

#[test]
fn later_scripts_apply_incrementally() {
    let (_temp, db_path, migrations_dir) = setup();
    write_script(&migrations_dir, "001_create_tweets.sql", CREATE_TWEETS);

    let migrator = Migrator::new(&db_path, &migrations_dir);
    migrator.run().expect("First run failed");

    write_script(
        &migrations_dir,
        "002_seed_data.sql",
        &insert_stmt("bob", "https://t.co/2", "later"),
    );

    let report = migrator.run().expect("Second run failed");
    let names: Vec<&str> = report.applied.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["002_seed_data"]);
}

#[test]
fn failed_migration_rolls_back_and_stops_the_run() {
    let (_temp, db_path, migrations_dir) = setup();
    write_script(&migrations_dir, "001_create_tweets.sql", CREATE_TWEETS);
    // First statement would succeed, second references a missing table.
    write_script(
        &migrations_dir,
        "002_bad.sql",
        &format!(
            "{}INSERT INTO no_such_table VALUES (1);\n",
            insert_stmt("carol", "https://t.co/3", "doomed")
        ),
    );
    write_script(
        &migrations_dir,
        "003_never_runs.sql",
        &insert_stmt("dave", "https://t.co/4", "unreached"),
    );

    let migrator = Migrator::new(&db_path, &migrations_dir);
    let report = migrator.run().expect("Run should report failure, not error");

    assert!(!report.is_success());
    let names: Vec<&str> = report.applied.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["001_create_tweets"]);

    let failure = report.failure.as_ref().expect("Expected a failure record");
    assert_eq!(failure.name, "002_bad");

    // The transaction rolled back: neither the insert from 002 nor
    // anything from 003 is visible.
    let storage = Storage::open(&db_path).unwrap();
    assert_eq!(storage.count_tweets().unwrap(), 0);
}

#[test]
fn failed_migration_leaves_a_backup_on_disk() {
    let (_temp, db_path, migrations_dir) = setup();
    write_script(&migrations_dir, "001_create_tweets.sql", CREATE_TWEETS);
    write_script(&migrations_dir, "002_bad.sql", "INSERT INTO nope VALUES (1);");

    let migrator = Migrator::new(&db_path, &migrations_dir);
    let report = migrator.run().expect("Run failed");

    let failure = report.failure.expect("Expected a failure record");
    let snapshot = failure.snapshot.expect("Expected a snapshot path");
    assert!(snapshot.exists(), "Backup should remain on disk");
    assert!(
        snapshot
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("002_bad")
    );
}

#[test]
fn failed_migration_is_retried_after_fix() {
    let (_temp, db_path, migrations_dir) = setup();
    write_script(&migrations_dir, "001_create_tweets.sql", CREATE_TWEETS);
    write_script(&migrations_dir, "002_bad.sql", "INSERT INTO nope VALUES (1);");

    let migrator = Migrator::new(&db_path, &migrations_dir);
    let report = migrator.run().expect("Run failed");
    assert!(!report.is_success());

    // The failed migration was never recorded, so a fixed version of the
    // same script applies on the next run.
    write_script(
        &migrations_dir,
        "002_bad.sql",
        &insert_stmt("erin", "https://t.co/5", "fixed"),
    );

    let report = migrator.run().expect("Retry failed");
    assert!(report.is_success());
    let names: Vec<&str> = report.applied.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["002_bad"]);

    let storage = Storage::open(&db_path).unwrap();
    assert_eq!(storage.count_tweets().unwrap(), 1);
}

#[test]
fn restore_recovers_the_pre_migration_database() {
    let (_temp, db_path, migrations_dir) = setup();
    write_script(&migrations_dir, "001_create_tweets.sql", CREATE_TWEETS);
    write_script(
        &migrations_dir,
        "002_seed_data.sql",
        &insert_stmt("frank", "https://t.co/6", "seeded"),
    );

    let migrator = Migrator::new(&db_path, &migrations_dir);
    migrator.run().expect("Run failed");

    let storage = Storage::open(&db_path).unwrap();
    assert_eq!(storage.count_tweets().unwrap(), 1);
    drop(storage);

    // A snapshot was taken before 002 ran, so restoring rewinds past the
    // seed insert (and 002's ledger entry with it).
    let restored_from = migrator.restore("002_seed_data").expect("Restore failed");
    assert!(restored_from.exists());

    let storage = Storage::open(&db_path).unwrap();
    assert_eq!(storage.count_tweets().unwrap(), 0);
    drop(storage);

    // 002 is pending again after the rewind.
    let report = migrator.run().expect("Re-run failed");
    let names: Vec<&str> = report.applied.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["002_seed_data"]);
}

#[test]
fn restore_fails_without_a_snapshot() {
    let (_temp, db_path, migrations_dir) = setup();
    let migrator = Migrator::new(&db_path, &migrations_dir);
    assert!(migrator.restore("999_never_ran").is_err());
}

#[test]
fn missing_database_means_nothing_to_migrate() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("absent.db");
    let migrations_dir = temp.path().join("migrations");
    fs::create_dir_all(&migrations_dir).unwrap();
    write_script(&migrations_dir, "001_create_tweets.sql", CREATE_TWEETS);

    let migrator = Migrator::new(&db_path, &migrations_dir);
    let report = migrator.run().expect("Run failed");

    assert!(report.is_success());
    assert!(report.applied.is_empty());
    assert!(!db_path.exists(), "Run must not create the database");
}

#[test]
fn missing_migrations_directory_is_fatal() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("tweets.db");
    drop(Storage::open(&db_path).unwrap());

    let migrator = Migrator::new(&db_path, temp.path().join("no_such_dir"));
    let err = migrator.run().expect_err("Expected a discovery error");
    assert!(err.is_pre_mutation());
}

#[test]
fn non_migration_files_are_ignored() {
    let (_temp, db_path, migrations_dir) = setup();
    write_script(&migrations_dir, "001_create_tweets.sql", CREATE_TWEETS);
    write_script(&migrations_dir, "README.md", "not a migration");
    write_script(&migrations_dir, "notes.sql", "DROP TABLE tweets;");
    write_script(&migrations_dir, "abc_123.sql", "DROP TABLE tweets;");

    let migrator = Migrator::new(&db_path, &migrations_dir);
    let report = migrator.run().expect("Run failed");

    let names: Vec<&str> = report.applied.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["001_create_tweets"]);
}

#[test]
fn dedupe_migration_reports_rows_changed() {
    let (_temp, db_path, migrations_dir) = setup();
    // Three rows, two of them identical on the uniqueness triple.
    write_script(
        &migrations_dir,
        "001_create_tweets.sql",
        &format!(
            "{}{}{}{}",
            CREATE_TWEETS,
            insert_stmt("gina", "https://t.co/7", "dup"),
            insert_stmt("gina", "https://t.co/7", "dup"),
            insert_stmt("gina", "https://t.co/8", "unique"),
        ),
    );
    write_script(
        &migrations_dir,
        "002_add_unique_constraint.sql",
        "DELETE FROM tweets
         WHERE id NOT IN (
             SELECT MIN(id) FROM tweets
             GROUP BY user_name, link_to_tweet, text
         );
         CREATE UNIQUE INDEX idx_tweets_unique
             ON tweets(user_name, link_to_tweet, text);",
    );

    let migrator = Migrator::new(&db_path, &migrations_dir);
    let report = migrator.run().expect("Run failed");
    assert!(report.is_success());

    // 001: three inserts. 002: one duplicate deleted.
    assert_eq!(report.applied[0].rows_changed, 3);
    assert_eq!(report.applied[1].rows_changed, 1);

    let storage = Storage::open(&db_path).unwrap();
    assert_eq!(storage.count_tweets().unwrap(), 2);
}

#[test]
fn shipped_migrations_apply_cleanly() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("tweets.db");
    drop(Storage::open(&db_path).unwrap());

    let shipped = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let migrator = Migrator::new(&db_path, &shipped);
    let report = migrator.run().expect("Run failed");

    assert!(report.is_success());
    assert_eq!(report.applied.len(), 2);

    // The resulting schema accepts inserts and enforces uniqueness.
    let storage = Storage::open(&db_path).unwrap();
    let incoming = iftttwh::IncomingTweet {
        user_name: "rustlang".to_string(),
        link_to_tweet: "https://t.co/x".to_string(),
        text: "once".to_string(),
        created_at: String::new(),
    };
    assert!(matches!(
        storage.insert_tweet(&incoming).unwrap(),
        iftttwh::InsertOutcome::Inserted(_)
    ));
    assert!(matches!(
        storage.insert_tweet(&incoming).unwrap(),
        iftttwh::InsertOutcome::Duplicate
    ));
}
