use std::sync::Arc;

use chrono::Utc;
use fabtrace_core::{
    AttemptOutcome, AttemptRecord, CoverageStats, PathDefinition, ReviewFlag, RunReport, RunStatus,
};
use uuid::Uuid;

use super::*;

fn sample_report() -> RunReport {
    let definition = Arc::new(PathDefinition {
        hash: "abc123".to_owned(),
        node_count: 3,
        link_count: 2,
        total_length_mm: 4200.0,
        coverage: 5.0 / 7.0,
        utilities: vec!["N2".to_owned()],
        nodes: vec![1, 2, 3],
        links: vec![101, 102],
    });
    let now = Utc::now();

    RunReport {
        run_id: Uuid::new_v4(),
        fab: "M16".to_owned(),
        tag: "default".to_owned(),
        status: RunStatus::Partial,
        reason: "iteration cap (4) reached".to_owned(),
        iterations: 4,
        paths_attempted: 2,
        paths_found: 1,
        attempts: vec![
            AttemptRecord {
                seq: 1,
                toolset: Some("TS1".to_owned()),
                start_node: Some(1),
                end_node: Some(3),
                outcome: AttemptOutcome::Found {
                    path_hash: "abc123".to_owned(),
                },
                picked_at: now,
                notes: None,
            },
            AttemptRecord {
                seq: 2,
                toolset: Some("TS1".to_owned()),
                start_node: Some(2),
                end_node: Some(4),
                outcome: AttemptOutcome::NotFound,
                picked_at: now,
                notes: None,
            },
        ],
        review_flags: vec![ReviewFlag {
            toolset: "TS1".to_owned(),
            start_node: 2,
            end_node: 4,
            utility: Some("N2".to_owned()),
            reason: "no path found between selected nodes".to_owned(),
            created_at: now,
        }],
        paths: vec![definition],
        coverage: CoverageStats {
            nodes_covered: 3,
            links_covered: 2,
            total_nodes: 4,
            total_links: 3,
            percentage: 5.0 / 7.0,
        },
        started_at: now,
        ended_at: now,
    }
}

#[test]
fn persist_then_load_summary_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();
    let report = sample_report();

    let summary = store.persist_run(&report, 0.9).unwrap();
    assert_eq!(summary.run_id, report.run_id);
    assert_eq!(summary.status, RunStatus::Partial);
    assert_eq!(summary.total_attempts, 2);
    assert_eq!(summary.paths_found, 1);
    assert_eq!(summary.unique_paths, 1);
    assert_eq!(summary.review_flags, 1);
    assert!((summary.success_rate - 50.0).abs() < 1e-9);

    let loaded = store.load_summary(report.run_id).unwrap();
    assert_eq!(loaded.run_id, summary.run_id);
    assert_eq!(loaded.reason, report.reason);
}

#[test]
fn persisted_definitions_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();
    let report = sample_report();
    store.persist_run(&report, 0.9).unwrap();

    let definitions = store.load_definitions(report.run_id).unwrap();
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].hash, "abc123");
    assert_eq!(definitions[0].nodes, vec![1, 2, 3]);
}

#[test]
fn list_runs_reports_only_complete_directories() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();

    let report = sample_report();
    store.persist_run(&report, 0.5).unwrap();

    // A stray directory without a summary is ignored.
    std::fs::create_dir(dir.path().join(Uuid::new_v4().to_string())).unwrap();
    std::fs::create_dir(dir.path().join("not-a-run")).unwrap();

    assert_eq!(store.list_runs().unwrap(), vec![report.run_id]);
}

#[test]
fn missing_run_is_an_explicit_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();
    let unknown = Uuid::new_v4();
    assert!(matches!(
        store.load_summary(unknown),
        Err(StoreError::MissingRun(id)) if id == unknown
    ));
}

#[test]
fn zero_target_has_no_efficiency() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();
    let summary = store.persist_run(&sample_report(), 0.0).unwrap();
    assert!(summary.coverage_efficiency.is_none());
}
