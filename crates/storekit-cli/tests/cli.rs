#![cfg(not(target_arch = "wasm32"))]

use assert_cmd::Command;
use serde_json::{json, Value};

fn storekit(root: &std::path::Path, backend: &str) -> Command {
    let mut cmd = Command::cargo_bin("storekit").unwrap();
    cmd.env_remove("STOREKIT_LOG")
        .arg("--root")
        .arg(root)
        .arg("--backend")
        .arg(backend);
    cmd
}

fn run_json(root: &std::path::Path, backend: &str, args: &[&str]) -> Value {
    let output = storekit(root, backend).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn values_persist_across_invocations_and_backends() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    assert_eq!(run_json(root, "opfs", &["set", "meaning", r#"{"ofLife":42}"#]), json!(true));
    assert_eq!(run_json(root, "opfs", &["set", "greeting", "hello world"]), json!(true));
    assert_eq!(
        run_json(root, "opfs-worker", &["get", "meaning"]),
        json!({ "ofLife": 42 })
    );
    assert_eq!(
        run_json(root, "opfs-worker", &["get", "greeting"]),
        json!("hello world")
    );
    assert_eq!(
        std::fs::read_to_string(root.join("meaning")).unwrap(),
        r#"{"ofLife":42}"#
    );

    assert_eq!(run_json(root, "opfs-worker", &["remove", "greeting"]), json!(true));
    assert_eq!(run_json(root, "opfs", &["keys"]), json!(["meaning"]));
    assert_eq!(run_json(root, "opfs", &["has", "greeting"]), json!(false));
}

#[test]
fn batch_commands() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    assert_eq!(
        run_json(root, "opfs-worker", &["set-many", r#"{"a":1,"b":[2]}"#]),
        json!(true)
    );
    assert_eq!(
        run_json(root, "opfs", &["get-many", "b", "a", "c"]),
        json!([[2], 1, null])
    );
    assert_eq!(
        run_json(root, "opfs", &["entries"]),
        json!([["a", 1], ["b", [2]]])
    );
    assert_eq!(run_json(root, "opfs-worker", &["remove-many", "a", "b"]), json!(true));
    assert_eq!(run_json(root, "opfs", &["keys"]), json!([]));
}

#[test]
fn selftest_passes() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
        run_json(dir.path(), "opfs", &["selftest"]),
        json!({ "opfs": "pass", "opfs-worker": "pass" })
    );
}

#[test]
fn browser_only_backends_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    storekit(dir.path(), "cookie").arg("keys").assert().failure();
    storekit(dir.path(), "websql").arg("keys").assert().failure();
}
