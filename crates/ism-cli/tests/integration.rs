#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const LIFECYCLE: &str = r#"{ "policy": {
    "description": "hot logs, deleted after a month",
    "default_state": "Ingest",
    "states": [
        { "name": "Ingest", "actions": [{ "rollover": { "min_doc_count": 10 } }],
          "transitions": [{ "state_name": "Search" }] },
        { "name": "Search", "actions": [],
          "transitions": [{ "state_name": "Delete", "conditions": { "min_index_age": "30d" } }] },
        { "name": "Delete", "actions": [{ "delete": {} }] }
    ]
} }"#;

const CLOSER: &str = r#"{
    "default_state": "hot",
    "states": [
        { "name": "hot", "actions": [{ "retry": { "count": 1 }, "close": {} }] }
    ]
}"#;

const T0: &str = "2024-01-01T00:00:00Z";

fn ism(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ism").unwrap();
    cmd.current_dir(dir.path()).env("ISM_ROOT", dir.path());
    cmd
}

fn init(dir: &TempDir) {
    ism(dir).arg("init").assert().success();
}

fn put_policy(dir: &TempDir, id: &str, body: &str) {
    let file = dir.path().join(format!("{id}.json"));
    std::fs::write(&file, body).unwrap();
    ism(dir)
        .args(["policy", "put", id, "--file"])
        .arg(&file)
        .assert()
        .success();
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// ism init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_data_directory() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    assert!(dir.path().join(".ism/ism.yaml").exists());
    assert!(dir.path().join(".ism/policies.redb").exists());
    assert!(dir.path().join(".ism/managed.yaml").exists());
    assert!(dir.path().join(".ism/indices.yaml").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    ism(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .ism/ism.yaml"));
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    ism(&dir)
        .args(["policy", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ism init"));
}

// ---------------------------------------------------------------------------
// ism policy
// ---------------------------------------------------------------------------

#[test]
fn policy_put_get_list() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);

    ism(&dir)
        .args(["policy", "get", "lifecycle"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ingest [rollover] -> Search"));
    ism(&dir)
        .args(["policy", "list", "--search", "month"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lifecycle"));

    let doc = stdout_json(ism(&dir).args(["--json", "policy", "get", "lifecycle"]));
    assert_eq!(doc["id"], "lifecycle");
    assert_eq!(doc["primaryTerm"], 1);
    assert_eq!(doc["policy"]["default_state"], "Ingest");
}

#[test]
fn policy_create_twice_fails() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);

    let file = dir.path().join("lifecycle.json");
    ism(&dir)
        .args(["policy", "put", "lifecycle", "--file"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn policy_update_requires_current_version() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);
    let doc = stdout_json(ism(&dir).args(["--json", "policy", "get", "lifecycle"]));
    let seq = doc["seqNo"].as_u64().unwrap();
    let file = dir.path().join("lifecycle.json");

    ism(&dir)
        .args(["policy", "put", "lifecycle", "--file"])
        .arg(&file)
        .args(["--seq-no", &(seq + 5).to_string(), "--primary-term", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("version conflict"));

    ism(&dir)
        .args(["policy", "put", "lifecycle", "--file"])
        .arg(&file)
        .args(["--seq-no", &seq.to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("provided together"));

    let updated = stdout_json(
        ism(&dir)
            .args(["--json", "policy", "put", "lifecycle", "--file"])
            .arg(&file)
            .args(["--seq-no", &seq.to_string(), "--primary-term", "1"]),
    );
    assert!(updated["seqNo"].as_u64().unwrap() > seq);
}

#[test]
fn policy_with_unknown_action_is_rejected() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    let file = dir.path().join("bad.json");
    std::fs::write(
        &file,
        r#"{ "default_state": "a", "states": [{ "name": "a", "actions": [{ "shrink": {} }] }] }"#,
    )
    .unwrap();
    ism(&dir)
        .args(["policy", "put", "bad", "--file"])
        .arg(&file)
        .assert()
        .failure();
}

#[test]
fn policy_delete() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);
    ism(&dir)
        .args(["policy", "delete", "lifecycle"])
        .assert()
        .success();
    ism(&dir)
        .args(["policy", "get", "lifecycle"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn index_walks_through_lifecycle() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);
    ism(&dir)
        .args(["index", "create", "logs-1", "--rollover-alias", "logs", "--at", T0])
        .assert()
        .success();

    let applied = stdout_json(ism(&dir).args(["--json", "apply", "lifecycle", "logs-1", "--at", T0]));
    assert_eq!(applied["updatedIndices"], 1);
    assert_eq!(applied["failures"], false);

    ism(&dir)
        .args(["tick", "--at", "2024-01-01T01:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rollover in progress"));

    ism(&dir)
        .args(["index", "update", "logs-1", "--docs", "20"])
        .assert()
        .success();
    ism(&dir)
        .args(["tick", "--at", "2024-01-01T02:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ingest -> Search"));

    let explained = stdout_json(ism(&dir).args(["--json", "explain", "logs-1"]));
    assert_eq!(explained[0]["state"]["name"], "Search");
    assert_eq!(explained[0]["rolled_over"], true);

    ism(&dir)
        .args(["tick", "--at", "2024-01-10T00:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("waiting in Search"));
    ism(&dir)
        .args(["tick", "--at", "2024-02-15T00:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Search -> Delete"));
    ism(&dir)
        .args(["tick", "--at", "2024-02-15T01:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("policy completed in Delete"));

    ism(&dir)
        .args(["index", "show", "logs-1"])
        .assert()
        .failure();
}

#[test]
fn rollover_without_alias_fails_until_alias_is_set() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);
    ism(&dir)
        .args(["index", "create", "logs-1", "--docs", "20", "--at", T0])
        .assert()
        .success();
    ism(&dir)
        .args(["apply", "lifecycle", "logs-1", "--at", T0])
        .assert()
        .success();

    ism(&dir)
        .args(["tick", "--at", "2024-01-01T01:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rollover failed (attempt 1)"));
    let explained = stdout_json(ism(&dir).args(["--json", "explain", "logs-1"]));
    assert!(explained[0]["info"]["message"]
        .as_str()
        .unwrap()
        .contains("rollover_alias"));

    ism(&dir)
        .args(["index", "update", "logs-1", "--rollover-alias", "logs"])
        .assert()
        .success();
    ism(&dir)
        .args(["tick", "--at", "2024-01-01T02:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ingest -> Search"));
}

#[test]
fn tick_saves_healthy_indices_when_one_errors() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);
    put_policy(&dir, "closer", CLOSER);
    ism(&dir)
        .args(["index", "create", "a", "--docs", "20", "--rollover-alias", "logs", "--at", T0])
        .assert()
        .success();
    ism(&dir).args(["index", "create", "b", "--at", T0]).assert().success();
    ism(&dir).args(["apply", "lifecycle", "a", "--at", T0]).assert().success();
    ism(&dir)
        .args(["tick", "a", "--at", "2024-01-01T01:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ingest -> Search"));
    ism(&dir).args(["apply", "closer", "b", "--at", T0]).assert().success();

    // Point b's current action past the end of its state.
    let snapshot = dir.path().join(".ism/managed.yaml");
    let yaml = std::fs::read_to_string(&snapshot).unwrap();
    assert_eq!(yaml.matches("index: 0").count(), 1, "{yaml}");
    std::fs::write(&snapshot, yaml.replacen("index: 0", "index: 7", 1)).unwrap();

    ism(&dir)
        .args(["tick", "--at", "2024-02-15T00:00:00Z"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Search -> Delete"))
        .stdout(predicate::str::contains("out of range"))
        .stderr(predicate::str::contains("1 tick(s) failed"));

    let explained = stdout_json(ism(&dir).args(["--json", "explain", "a"]));
    assert_eq!(explained[0]["state"]["name"], "Delete");
}

#[test]
fn explain_searches_sorts_and_pages() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);
    put_policy(&dir, "closer", CLOSER);
    for name in ["logs-a", "logs-b", "metrics-a"] {
        ism(&dir).args(["index", "create", name]).assert().success();
    }
    ism(&dir).args(["apply", "closer", "logs-a"]).assert().success();
    ism(&dir)
        .args(["apply", "lifecycle", "logs-b", "metrics-a"])
        .assert()
        .success();

    let page = stdout_json(ism(&dir).args(["--json", "explain", "--search", "logs"]));
    assert_eq!(page["totalManagedIndices"], 2);
    assert_eq!(page["managedIndices"][0]["index"], "logs-a");

    let page = stdout_json(ism(&dir).args([
        "--json", "explain", "--sort", "policy_id", "--desc", "--size", "1",
    ]));
    assert_eq!(page["totalManagedIndices"], 3);
    assert_eq!(page["managedIndices"][0]["index"], "metrics-a");

    ism(&dir)
        .args(["explain", "--sort", "age"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown sort field"));
}

#[test]
fn apply_reports_per_index_failures() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);
    ism(&dir).args(["index", "create", "logs-1"]).assert().success();

    let result = stdout_json(ism(&dir).args(["--json", "apply", "lifecycle", "logs-1", "ghost"]));
    assert_eq!(result["updatedIndices"], 1);
    assert_eq!(result["failures"], true);
    assert_eq!(result["failedIndices"][0]["indexName"], "ghost");

    ism(&dir)
        .args(["apply", "nope", "logs-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("policy not found"));
}

#[test]
fn remove_stops_management() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);
    ism(&dir).args(["index", "create", "logs-1"]).assert().success();
    ism(&dir).args(["apply", "lifecycle", "logs-1"]).assert().success();

    ism(&dir)
        .args(["remove", "logs-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("remove: 1 updated"));
    ism(&dir)
        .args(["explain", "logs-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not being managed"));
}

// ---------------------------------------------------------------------------
// Retry / change policy
// ---------------------------------------------------------------------------

#[test]
fn failed_action_parks_until_retried() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "closer", CLOSER);
    ism(&dir)
        .args(["index", "create", "logs-1", "--fail", "close"])
        .assert()
        .success();
    ism(&dir).args(["apply", "closer", "logs-1"]).assert().success();

    ism(&dir)
        .arg("tick")
        .assert()
        .success()
        .stdout(predicate::str::contains("close failed after 1 retries"));
    ism(&dir)
        .arg("tick")
        .assert()
        .success()
        .stdout(predicate::str::contains("failed, waiting for retry"));
    ism(&dir)
        .arg("explain")
        .assert()
        .success()
        .stdout(predicate::str::contains("failed"));

    ism(&dir)
        .args(["index", "update", "logs-1", "--clear-fail"])
        .assert()
        .success();
    ism(&dir)
        .args(["retry", "logs-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("retry: 1 updated"));
    ism(&dir)
        .arg("tick")
        .assert()
        .success()
        .stdout(predicate::str::contains("policy completed in hot"));

    let record = stdout_json(ism(&dir).args(["--json", "index", "show", "logs-1"]));
    assert_eq!(record["closed"], true);
}

#[test]
fn retry_of_healthy_index_is_a_reported_failure() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "closer", CLOSER);
    ism(&dir).args(["index", "create", "logs-1"]).assert().success();
    ism(&dir).args(["apply", "closer", "logs-1"]).assert().success();

    ism(&dir)
        .args(["retry", "logs-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not in a failed state"));
}

#[test]
fn retry_lists_common_states() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);
    put_policy(&dir, "closer", CLOSER);
    for name in ["a", "b"] {
        ism(&dir).args(["index", "create", name]).assert().success();
    }
    ism(&dir).args(["apply", "lifecycle", "a"]).assert().success();
    ism(&dir).args(["apply", "closer", "b"]).assert().success();

    let states = stdout_json(ism(&dir).args(["--json", "retry", "a", "--list-states"]));
    assert_eq!(states, serde_json::json!(["Delete", "Ingest", "Search"]));
    let states = stdout_json(ism(&dir).args(["--json", "retry", "a", "b", "--list-states"]));
    assert_eq!(states, serde_json::json!([]));

    ism(&dir)
        .args(["retry", "a", "b", "--state", "Search"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not shared"));
    ism(&dir)
        .args(["retry", "a", "ghost", "--state", "Ingest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("index 'ghost' has no resolvable policy"));
}

#[test]
fn change_policy_keeps_shared_state() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    put_policy(&dir, "lifecycle", LIFECYCLE);
    put_policy(
        &dir,
        "archive",
        r#"{ "default_state": "Ingest", "states": [
            { "name": "Ingest", "actions": [{ "read_only": {} }] }
        ] }"#,
    );
    ism(&dir).args(["index", "create", "logs-1"]).assert().success();
    ism(&dir).args(["apply", "lifecycle", "logs-1"]).assert().success();

    let result = stdout_json(ism(&dir).args([
        "--json",
        "change-policy",
        "logs-1",
        "--policy",
        "archive",
    ]));
    assert_eq!(result["updatedIndices"], 1);

    let explained = stdout_json(ism(&dir).args(["--json", "explain", "logs-1"]));
    assert_eq!(explained[0]["policy_id"], "archive");
    assert_eq!(explained[0]["state"]["name"], "Ingest");
    assert_eq!(explained[0]["action"]["name"], "read_only");

    ism(&dir)
        .args(["change-policy", "logs-1", "--policy", "archive", "--state", "Delete"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not present"));
}

// ---------------------------------------------------------------------------
// ism job / ism config
// ---------------------------------------------------------------------------

#[test]
fn job_validate_accepts_yaml_rollup() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("rollup.yaml");
    std::fs::write(
        &file,
        "rollup:\n  source_index: logs-*\n  target_index: logs-rollup\n  page_size: 100\n  \
         schedule:\n    interval:\n      period: 1\n      unit: Hours\n  \
         dimensions:\n    - date_histogram:\n        source_field: \"@timestamp\"\n        fixed_interval: 1h\n  \
         metrics:\n    - source_field: bytes\n      metrics:\n        - sum: {}\n",
    )
    .unwrap();
    ism(&dir)
        .args(["job", "validate"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Valid rollup job."));
}

#[test]
fn job_validate_rejects_same_source_and_target() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("transform.json");
    std::fs::write(
        &file,
        r#"{ "transform": { "source_index": "a", "target_index": "a", "page_size": 10,
             "schedule": { "interval": { "period": 1, "unit": "Minutes" } },
             "groups": [{ "terms": { "source_field": "host" } }] } }"#,
    )
    .unwrap();
    ism(&dir).args(["job", "validate"]).arg(&file).assert().failure();
}

#[test]
fn config_validate_default_is_clean() {
    let dir = TempDir::new().unwrap();
    init(&dir);
    ism(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No warnings"));
}
