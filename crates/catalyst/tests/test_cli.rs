//! Command-line behaviour

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    let env = TestEnv::new().unwrap();
    env.command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("tools"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn test_unknown_command_fails() {
    let env = TestEnv::new().unwrap();
    env.command().arg("deploy").assert().failure();
}

#[test]
fn test_status_without_config() {
    let env = TestEnv::new().unwrap();
    env.command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Catalyst Assist Status"))
        .stdout(predicate::str::contains("[Missing]"))
        .stdout(predicate::str::contains("qwen/qwen3-32b"));
}

#[test]
fn test_init_writes_config() {
    let env = TestEnv::new().unwrap();
    env.command()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("GROQ_API_KEY"));

    let written = std::fs::read_to_string(env.config_file()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(json["tool_server"]["command"], "python3");
    assert_eq!(json["agent"]["max_iterations"], 10);
    assert!(env.data_dir.join("sessions").is_dir());
}

#[test]
fn test_status_reads_env_overrides() {
    let env = TestEnv::new().unwrap();
    env.command()
        .arg("status")
        .env("GROQ_API_KEY", "gsk_test")
        .env("GROQ_MODEL", "llama-3.3-70b-versatile")
        .env("CATALYST_MCP_SCRIPT", "/nonexistent/catalyst-center-mcp.py")
        .assert()
        .success()
        .stdout(predicate::str::contains("[Set]"))
        .stdout(predicate::str::contains("llama-3.3-70b-versatile"))
        .stdout(predicate::str::contains(
            "/nonexistent/catalyst-center-mcp.py [Missing]",
        ));
}

#[test]
fn test_status_reads_config_file() {
    let env = TestEnv::new().unwrap();
    env.write_config(
        r#"{ "llm": { "provider": "openai", "api_key": "sk-test" },
             "agent": { "max_iterations": 4 } }"#,
    )
    .unwrap();

    env.command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("gpt-4o"))
        .stdout(predicate::str::contains("Max steps: 4"));
}

#[test]
fn test_tools_missing_script_names_path() {
    let env = TestEnv::new().unwrap();
    env.command()
        .arg("tools")
        .env("CATALYST_MCP_SCRIPT", "/nonexistent/catalyst-center-mcp.py")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "File Not Found: /nonexistent/catalyst-center-mcp.py",
        ));
}

#[test]
fn test_chat_requires_api_key() {
    let env = TestEnv::new().unwrap();
    env.command()
        .args(["chat", "-m", "How many devices?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No API key configured"));
}

#[test]
fn test_chat_missing_script_answers_with_path() {
    let env = TestEnv::new().unwrap();
    env.command()
        .args(["chat", "-m", "How many devices?", "-s", "ops"])
        .env("GROQ_API_KEY", "gsk_test")
        .env("CATALYST_MCP_SCRIPT", "/nonexistent/catalyst-center-mcp.py")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "File Not Found: /nonexistent/catalyst-center-mcp.py. Please ensure the tool provider script exists.",
        ));

    let stored = env.data_dir.join("sessions").join("ops.json");
    let session: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(stored).unwrap()).unwrap();
    assert_eq!(session["messages"][0]["content"], "How many devices?");
    assert_eq!(session["messages"][0]["role"], "user");
}

#[test]
fn test_chat_presentation_footnote() {
    let env = TestEnv::new().unwrap();
    env.command()
        .args(["chat", "-m", "make slides about site health"])
        .env("GROQ_API_KEY", "gsk_test")
        .env("CATALYST_MCP_SCRIPT", "/nonexistent/catalyst-center-mcp.py")
        .assert()
        .success()
        .stdout(predicate::str::contains("Footnote:"));
}
