//! Common test utilities for CLI integration tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

const LEAKY_VARS: &[&str] = &[
    "GROQ_API_KEY",
    "GROQ_MODEL",
    "OPENAI_API_KEY",
    "OPENAI_MODEL",
    "CATALYST_LLM_PROVIDER",
    "CATALYST_MCP_COMMAND",
    "CATALYST_MCP_SCRIPT",
    "RUST_LOG",
];

/// Isolated home directory for one test
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub data_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let data_dir = temp_dir.path().join(".catalyst");
        Ok(Self { temp_dir, data_dir })
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// `catalyst` with HOME and the working directory inside the temp dir
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_catalyst"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.current_dir(self.temp_dir.path());
        for var in LEAKY_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    pub fn write_config(&self, json: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::write(self.config_file(), json)?;
        Ok(())
    }
}
