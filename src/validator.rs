//! Wrapper around the external YAML validator process.
//!
//! Schema validation is not implemented here: the candidate document is
//! written to a temp file and a configurable validator executable is run
//! against it. Exit status zero means valid.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub output: String,
}

pub async fn validate_yaml(command: &str, content: &str) -> Result<ValidationOutcome> {
    let path = temp_yaml_path();
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("writing candidate YAML to {}", path.display()))?;

    let result = run_validator(command, &path).await;

    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!("Could not remove temp file {}: {e}", path.display());
    }

    result
}

async fn run_validator(command: &str, path: &PathBuf) -> Result<ValidationOutcome> {
    debug!(command, file = %path.display(), "Running external validator");

    let output = Command::new(command)
        .arg("validate")
        .arg(path)
        .output()
        .await
        .with_context(|| format!("spawning validator '{command}'"))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(stderr.trim());
    }

    Ok(ValidationOutcome {
        valid: output.status.success(),
        output: combined.trim().to_string(),
    })
}

fn temp_yaml_path() -> PathBuf {
    std::env::temp_dir().join(format!("flowforge-validate-{}.yaml", Uuid::new_v4()))
}
