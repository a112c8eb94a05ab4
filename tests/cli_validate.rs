use std::io::Write;
use std::process::Command;

const WORKFLOW: &str = r#"{
  "id": "wf-cli",
  "name": "CLI check",
  "nodes": [
    {
      "id": "fetch",
      "name": "Fetch",
      "dependencies": [],
      "action": { "type": "prompt", "tools": ["http_get"] },
      "output": { "name": "page", "description": "Raw page text" }
    },
    {
      "id": "summarize",
      "name": "Summarize",
      "dependencies": ["fetch"],
      "action": { "type": "prompt" },
      "input": { "items": [ { "name": "page" } ] },
      "output": { "name": "summary", "description": "Short summary" }
    }
  ]
}"#;

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write workflow");
    tmp
}

fn skein(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_skein"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("run skein")
}

#[test]
fn test_validate_prints_plan() {
    let tmp = write_temp(WORKFLOW);
    let out = skein(&["validate", tmp.path().to_str().unwrap(), "--tools", "http_get,grep"]);

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Workflow: CLI check (wf-cli)"));
    assert!(stdout.contains("1. fetch -> page"));
    assert!(stdout.contains("2. summarize -> summary  (after fetch)"));
}

#[test]
fn test_validate_rejects_unknown_tool() {
    let tmp = write_temp(WORKFLOW);
    let out = skein(&["validate", tmp.path().to_str().unwrap(), "--tools", "grep"]);

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("http_get"));
}

#[test]
fn test_validate_rejects_cycle() {
    let cyclic = WORKFLOW.replace(
        r#""dependencies": [],"#,
        r#""dependencies": ["summarize"],"#,
    );
    let tmp = write_temp(&cyclic);
    let out = skein(&["validate", tmp.path().to_str().unwrap()]);

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("cycle"));
}

#[test]
fn test_plan_prints_json_order() {
    let tmp = write_temp(WORKFLOW);
    let out = skein(&["plan", tmp.path().to_str().unwrap()]);

    assert!(out.status.success());
    let plan: Vec<String> = serde_json::from_slice(&out.stdout).expect("plan is JSON");
    assert_eq!(plan, vec!["fetch", "summarize"]);
}

#[test]
fn test_config_masks_api_key() {
    let tmp = write_temp("[model]\nmodel_id = \"m\"\napi_key = \"sk-secret\"\n");
    let out = skein(&["config", tmp.path().to_str().unwrap()]);

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("model_id = \"m\""));
    assert!(!stdout.contains("sk-secret"));
}
