//! Stores sharing one SQLite file, as the server runs them.

use std::sync::Arc;
use std::thread;

use serde_json::json;
use tempfile::TempDir;

use lexiclass_core::{
    job::{JobKind, JobState, JobTarget},
    CorpusStore, IndexTracker, JobLedger, SqliteCorpus, SqliteIndexTracker, SqliteJobLedger,
    SqliteVersionLedger, VersionLedger,
};

#[test]
fn test_stores_coexist_in_one_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("lexiclass.db");

    let jobs = SqliteJobLedger::new(&db_path).unwrap();
    let versions = SqliteVersionLedger::new(&db_path).unwrap();
    let index = SqliteIndexTracker::new(&db_path).unwrap();
    let corpus = SqliteCorpus::new(&db_path).unwrap();

    let field = corpus.create_field(1, "topic").unwrap();
    index.add_documents(1, &[1, 2]).unwrap();
    let job = jobs
        .submit(JobKind::Train, JobTarget::field(1, field.field_id), json!({}))
        .unwrap();
    assert_eq!(versions.next_version(field.field_id).unwrap(), 1);

    assert_eq!(index.summary(1).unwrap().pending, 2);
    assert_eq!(jobs.status(&job.id).unwrap().state, JobState::Pending);
}

#[test]
fn test_jobs_survive_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("lexiclass.db");

    let id = {
        let jobs = SqliteJobLedger::new(&db_path).unwrap();
        let job = jobs
            .submit(JobKind::Index, JobTarget::project(3), json!({}))
            .unwrap();
        jobs.claim(&job.id).unwrap();
        job.id
    };

    let reopened = SqliteJobLedger::new(&db_path).unwrap();
    let view = reopened.status(&id).unwrap();
    assert_eq!(view.state, JobState::Started);
    assert!(view.started_at.is_some());
}

#[test]
fn test_claim_race_across_connections() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("lexiclass.db");

    let ledger = SqliteJobLedger::new(&db_path).unwrap();
    let job = ledger
        .submit(JobKind::Index, JobTarget::project(1), json!({}))
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = db_path.clone();
            let id = job.id.clone();
            thread::spawn(move || {
                let ledger = SqliteJobLedger::new(&path).unwrap();
                ledger.claim(&id).is_ok()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn test_version_allocation_across_handles() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("lexiclass.db");

    let a: Arc<dyn VersionLedger> = Arc::new(SqliteVersionLedger::new(&db_path).unwrap());
    let b: Arc<dyn VersionLedger> = Arc::new(SqliteVersionLedger::new(&db_path).unwrap());

    assert_eq!(a.next_version(9).unwrap(), 1);
    // Training row for 1 blocks nothing on other fields
    assert_eq!(b.next_version(10).unwrap(), 1);

    a.mark_training(9, 1).unwrap();
    a.mark_ready(9, 1, Some(0.8), Default::default()).unwrap();
    assert_eq!(b.next_version(9).unwrap(), 2);
    assert_eq!(b.latest_ready(9).unwrap().unwrap().version, 1);
}
