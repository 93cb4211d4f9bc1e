use lab_core::{DaemonMode, ExperimentPlan, PlanError};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn loads_json_plan_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "plan.json",
        r#"{
            "baseline_id": "baseline",
            "gates": {"fps_min": 15, "rtt_avg_delta_max": 5},
            "daemon": {"mode": "spawn", "start": "make run", "stop": ["make", "stop"]},
            "experiments": [
                {"id": "baseline", "notes": "reference"},
                {"id": "lz4-fast", "commands": ["make build"], "measure_s": 10}
            ]
        }"#,
    );

    let plan = ExperimentPlan::from_path(&path).unwrap();
    assert_eq!(plan.experiments.len(), 2);
    assert_eq!(plan.experiments[0].notes, "reference");
    assert_eq!(plan.daemon.mode, DaemonMode::Spawn);
    assert_eq!(
        plan.daemon.start_argv().unwrap(),
        Some(vec!["make".to_string(), "run".to_string()])
    );
    assert_eq!(plan.gates.rtt_avg_delta_max, Some(5.0));
}

#[test]
fn loads_yaml_plan_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "plan.yml",
        "experiments:\n  - id: a\n    commands:\n      - [git, checkout, topic]\nworktree:\n  enabled: true\n",
    );

    let plan = ExperimentPlan::from_path(&path).unwrap();
    assert!(plan.worktree.enabled);
    assert_eq!(
        plan.experiments[0].command_argvs().unwrap(),
        vec![vec!["git", "checkout", "topic"]]
    );
}

#[test]
fn missing_file_is_read_error() {
    let dir = TempDir::new().unwrap();
    let err = ExperimentPlan::from_path(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, PlanError::Read { .. }));
}

#[test]
fn resolved_plan_serializes_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "plan.toml", "[[experiments]]\nid = \"only\"\n");
    let plan = ExperimentPlan::from_path(&path).unwrap().resolve(dir.path());

    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["poll_interval_s"], serde_json::json!(2.0));
    assert_eq!(json["worktree"]["branch_template"], serde_json::json!("exp/{id}"));
    assert_eq!(
        PathBuf::from(json["results_dir"].as_str().unwrap()),
        dir.path().join("experiments/results")
    );
}
