//! # restic Commands
//!
//! Builds and runs the restic command lines used by the backup and restore
//! loops. Every invocation receives the provisioned repository environment
//! and reads the repository password from a private temporary file.

use crate::observability::metrics;
use crate::provider::RepositoryEnvironment;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info_span, Instrument};

#[derive(Debug, Error)]
pub enum ResticError {
    #[error("unable to start restic {command}: {source}")]
    Spawn {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("restic {command} failed ({status}): {stderr}")]
    Failed {
        command: &'static str,
        status: String,
        stderr: String,
    },

    #[error("unable to parse restic snapshots output: {0}")]
    ParseSnapshots(#[from] serde_json::Error),

    #[error("expected exactly one matching snapshot, found {0}")]
    SnapshotCount(usize),
}

/// One restic invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResticCommand {
    binary: PathBuf,
    command: &'static str,
    repo_identifier: String,
    password_file: PathBuf,
    dir: Option<PathBuf>,
    args: Vec<String>,
    extra_flags: Vec<String>,
}

impl ResticCommand {
    fn new(
        binary: &Path,
        command: &'static str,
        repo_identifier: &str,
        password_file: &Path,
    ) -> Self {
        Self {
            binary: binary.to_path_buf(),
            command,
            repo_identifier: repo_identifier.to_string(),
            password_file: password_file.to_path_buf(),
            dir: None,
            args: Vec::new(),
            extra_flags: Vec::new(),
        }
    }

    /// `restic backup <path>`, tagged with every entry of `tags`
    pub fn backup(
        binary: &Path,
        repo_identifier: &str,
        password_file: &Path,
        path: &Path,
        tags: &BTreeMap<String, String>,
    ) -> Self {
        let mut command = Self::new(binary, "backup", repo_identifier, password_file);
        command.args.push(path.display().to_string());
        command.extra_flags = tags
            .iter()
            .map(|(key, value)| format!("--tag={key}={value}"))
            .collect();
        command
    }

    /// `restic snapshots --json --last` restricted to snapshots carrying all `tags`
    pub fn snapshots(
        binary: &Path,
        repo_identifier: &str,
        password_file: &Path,
        tags: &BTreeMap<String, String>,
    ) -> Self {
        let mut command = Self::new(binary, "snapshots", repo_identifier, password_file);
        command.extra_flags = vec!["--json".to_string(), "--last".to_string()];
        if !tags.is_empty() {
            let joined = tags
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(",");
            command.extra_flags.push(format!("--tag={joined}"));
        }
        command
    }

    /// `restic restore <snapshot> --target=.` run inside `path`
    pub fn restore(
        binary: &Path,
        repo_identifier: &str,
        password_file: &Path,
        snapshot_id: &str,
        path: &Path,
    ) -> Self {
        let mut command = Self::new(binary, "restore", repo_identifier, password_file);
        command.dir = Some(path.to_path_buf());
        command.args.push(snapshot_id.to_string());
        command.extra_flags.push("--target=.".to_string());
        command
    }

    pub fn command(&self) -> &'static str {
        self.command
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Arguments passed to the binary, starting with the subcommand
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            self.command.to_string(),
            format!("--repo={}", self.repo_identifier),
            format!("--password-file={}", self.password_file.display()),
        ];
        args.extend(self.args.iter().cloned());
        args.extend(self.extra_flags.iter().cloned());
        args
    }

    /// Run to completion and return stdout
    pub async fn run(&self, environment: &RepositoryEnvironment) -> Result<String, ResticError> {
        let span = info_span!("agent.restic", command = self.command, repo = %self.repo_identifier);
        async {
            let mut process = Command::new(&self.binary);
            process
                .args(self.args())
                .envs(environment.iter())
                .kill_on_drop(true);
            if let Some(dir) = &self.dir {
                process.current_dir(dir);
            }

            debug!(args = ?self.args(), "Running restic");
            let start = Instant::now();
            let output = process.output().await.map_err(|source| {
                metrics::increment_command_errors(self.command);
                ResticError::Spawn {
                    command: self.command,
                    source,
                }
            })?;
            metrics::observe_command_duration(self.command, start.elapsed().as_secs_f64());

            if !output.status.success() {
                metrics::increment_command_errors(self.command);
                return Err(ResticError::Failed {
                    command: self.command,
                    status: output.status.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    short_id: String,
}

/// Extract the snapshot id from `restic snapshots --json --last` output
pub fn parse_snapshot_id(output: &str) -> Result<String, ResticError> {
    let mut snapshots: Vec<Snapshot> = serde_json::from_str(output.trim())?;
    if snapshots.len() != 1 {
        return Err(ResticError::SnapshotCount(snapshots.len()));
    }
    Ok(snapshots.remove(0).short_id)
}

/// Write the repository password to a private temp file removed on drop
pub fn write_password_file(password: &str) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(password.as_bytes())?;
    file.flush()?;
    Ok(file)
}
