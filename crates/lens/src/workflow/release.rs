/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Helm release and pod readiness access used by the built-in stages.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::RunOptions;
use crate::error::StageError;

/// Lifecycle state of a Helm release as reported by `helm status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseState {
    Missing,
    Deployed,
    /// Install, upgrade or rollback in flight.
    Pending(String),
    Failed,
    Other(String),
}

impl ReleaseState {
    pub fn from_helm_status(status: &str) -> Self {
        match status {
            "deployed" => ReleaseState::Deployed,
            "failed" => ReleaseState::Failed,
            s if s.starts_with("pending") || s == "uninstalling" => {
                ReleaseState::Pending(s.to_string())
            }
            other => ReleaseState::Other(other.to_string()),
        }
    }
}

/// Pod readiness counts for a label selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PodReadiness {
    pub total: usize,
    pub ready: usize,
}

impl PodReadiness {
    pub fn all_ready(&self) -> bool {
        self.total > 0 && self.ready == self.total
    }
}

/// Operations the built-in stages need from the cluster.
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    async fn release_status(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        release: &str,
    ) -> Result<ReleaseState, StageError>;

    /// `helm upgrade --install`; honours `opts.dry_run`.
    async fn upgrade_install(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        release: &str,
        chart: &Path,
        values_file: Option<&Path>,
    ) -> Result<(), StageError>;

    /// Removes a release. A missing release is not an error.
    async fn uninstall(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        release: &str,
    ) -> Result<(), StageError>;

    async fn pod_readiness(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        selector: &str,
    ) -> Result<PodReadiness, StageError>;

    /// Decoded value of one key of a Secret; `None` when the Secret or the key
    /// does not exist.
    async fn secret_value(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        secret: &str,
        key: &str,
    ) -> Result<Option<String>, StageError>;

    /// `kubectl apply` of a JSON or YAML manifest; honours `opts.dry_run`.
    async fn apply_manifest(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        manifest: &str,
    ) -> Result<(), StageError>;

    /// Removes a Secret. A missing Secret is not an error.
    async fn delete_secret(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        secret: &str,
    ) -> Result<(), StageError>;
}

/// [`ReleaseClient`] that shells out to `helm` and `kubectl`.
#[derive(Debug, Clone)]
pub struct HelmCli {
    helm_bin: PathBuf,
    kubectl_bin: PathBuf,
    command_timeout: Duration,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self {
            helm_bin: PathBuf::from("helm"),
            kubectl_bin: PathBuf::from("kubectl"),
            command_timeout: Duration::from_secs(600),
        }
    }
}

impl HelmCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binaries(mut self, helm: impl Into<PathBuf>, kubectl: impl Into<PathBuf>) -> Self {
        self.helm_bin = helm.into();
        self.kubectl_bin = kubectl.into();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    fn common_args(opts: &RunOptions) -> Vec<String> {
        let mut args = vec!["--namespace".to_string(), opts.namespace.clone()];
        if let Some(kubeconfig) = &opts.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.display().to_string());
        }
        args
    }

    /// Runs a command to completion, giving up on cancellation or timeout.
    async fn exec(
        &self,
        cancel: &CancellationToken,
        program: &Path,
        args: &[String],
    ) -> Result<Output, StageError> {
        self.exec_with_input(cancel, program, args, None).await
    }

    /// Like [`HelmCli::exec`], feeding `input` to the command's stdin.
    async fn exec_with_input(
        &self,
        cancel: &CancellationToken,
        program: &Path,
        args: &[String],
        input: Option<&str>,
    ) -> Result<Output, StageError> {
        let command_line = format!("{} {}", program.display(), args.join(" "));
        debug!(command = %command_line, "Running command");

        let run = async {
            let mut child = Command::new(program)
                .args(args)
                .stdin(if input.is_some() {
                    Stdio::piped()
                } else {
                    Stdio::null()
                })
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
                stdin.write_all(input.as_bytes()).await?;
            }
            child.wait_with_output().await
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(StageError::Cancelled),
            result = tokio::time::timeout(self.command_timeout, run) => match result {
                Err(_) => Err(StageError::Timeout {
                    what: command_line,
                    seconds: self.command_timeout.as_secs(),
                }),
                Ok(Err(source)) => Err(StageError::Spawn {
                    command: command_line,
                    source,
                }),
                Ok(Ok(output)) => Ok(output),
            },
        }
    }

    fn check(command: &str, output: Output) -> Result<Output, StageError> {
        if output.status.success() {
            Ok(output)
        } else {
            Err(StageError::Command {
                command: command.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn is_not_found(output: &Output) -> bool {
    String::from_utf8_lossy(&output.stderr).contains("not found")
}

/// Counts pods whose `Ready` condition is `True` in `kubectl get pods -o json`
/// output.
pub fn parse_pod_readiness(json: &Value) -> PodReadiness {
    let items = json
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let ready = items
        .iter()
        .filter(|pod| {
            pod.pointer("/status/conditions")
                .and_then(Value::as_array)
                .map_or(false, |conditions| {
                    conditions.iter().any(|c| {
                        c.get("type").and_then(Value::as_str) == Some("Ready")
                            && c.get("status").and_then(Value::as_str) == Some("True")
                    })
                })
        })
        .count();

    PodReadiness {
        total: items.len(),
        ready,
    }
}

#[async_trait]
impl ReleaseClient for HelmCli {
    async fn release_status(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        release: &str,
    ) -> Result<ReleaseState, StageError> {
        let mut args = vec![
            "status".to_string(),
            release.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        args.extend(Self::common_args(opts));

        let output = self.exec(cancel, &self.helm_bin, &args).await?;
        if !output.status.success() && is_not_found(&output) {
            return Ok(ReleaseState::Missing);
        }
        let output = Self::check("helm status", output)?;

        let json: Value =
            serde_json::from_slice(&output.stdout).map_err(|e| StageError::Output {
                command: "helm status".to_string(),
                reason: e.to_string(),
            })?;
        let status = json
            .pointer("/info/status")
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::Output {
                command: "helm status".to_string(),
                reason: "missing info.status".to_string(),
            })?;
        Ok(ReleaseState::from_helm_status(status))
    }

    async fn upgrade_install(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        release: &str,
        chart: &Path,
        values_file: Option<&Path>,
    ) -> Result<(), StageError> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            release.to_string(),
            chart.display().to_string(),
            "--create-namespace".to_string(),
        ];
        args.extend(Self::common_args(opts));
        if let Some(values) = values_file {
            args.push("--values".to_string());
            args.push(values.display().to_string());
        }
        if opts.dry_run {
            args.push("--dry-run".to_string());
        }
        if opts.verbose {
            args.push("--debug".to_string());
        }

        let output = self.exec(cancel, &self.helm_bin, &args).await?;
        Self::check("helm upgrade --install", output)?;
        Ok(())
    }

    async fn uninstall(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        release: &str,
    ) -> Result<(), StageError> {
        let mut args = vec!["uninstall".to_string(), release.to_string()];
        args.extend(Self::common_args(opts));
        if opts.dry_run {
            args.push("--dry-run".to_string());
        }

        let output = self.exec(cancel, &self.helm_bin, &args).await?;
        if !output.status.success() && is_not_found(&output) {
            debug!(release, "Release already absent");
            return Ok(());
        }
        Self::check("helm uninstall", output)?;
        Ok(())
    }

    async fn pod_readiness(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        selector: &str,
    ) -> Result<PodReadiness, StageError> {
        let mut args = vec![
            "get".to_string(),
            "pods".to_string(),
            "--selector".to_string(),
            selector.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        args.extend(Self::common_args(opts));

        let output = self.exec(cancel, &self.kubectl_bin, &args).await?;
        let output = Self::check("kubectl get pods", output)?;
        let json: Value =
            serde_json::from_slice(&output.stdout).map_err(|e| StageError::Output {
                command: "kubectl get pods".to_string(),
                reason: e.to_string(),
            })?;
        Ok(parse_pod_readiness(&json))
    }

    async fn secret_value(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        secret: &str,
        key: &str,
    ) -> Result<Option<String>, StageError> {
        let mut args = vec![
            "get".to_string(),
            "secret".to_string(),
            secret.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        args.extend(Self::common_args(opts));

        let output = self.exec(cancel, &self.kubectl_bin, &args).await?;
        if !output.status.success() && is_not_found(&output) {
            return Ok(None);
        }
        let output = Self::check("kubectl get secret", output)?;
        let json: Value =
            serde_json::from_slice(&output.stdout).map_err(|e| StageError::Output {
                command: "kubectl get secret".to_string(),
                reason: e.to_string(),
            })?;
        decode_secret_key(&json, key)
    }

    async fn apply_manifest(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        manifest: &str,
    ) -> Result<(), StageError> {
        let mut args = vec![
            "apply".to_string(),
            "--filename".to_string(),
            "-".to_string(),
        ];
        args.extend(Self::common_args(opts));
        if opts.dry_run {
            args.push("--dry-run=client".to_string());
        }

        let output = self
            .exec_with_input(cancel, &self.kubectl_bin, &args, Some(manifest))
            .await?;
        Self::check("kubectl apply", output)?;
        Ok(())
    }

    async fn delete_secret(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        secret: &str,
    ) -> Result<(), StageError> {
        let mut args = vec![
            "delete".to_string(),
            "secret".to_string(),
            secret.to_string(),
            "--ignore-not-found".to_string(),
        ];
        args.extend(Self::common_args(opts));
        if opts.dry_run {
            args.push("--dry-run=client".to_string());
        }

        let output = self.exec(cancel, &self.kubectl_bin, &args).await?;
        Self::check("kubectl delete secret", output)?;
        Ok(())
    }
}

/// Reads `data.<key>` from `kubectl get secret -o json` output.
pub fn decode_secret_key(secret: &Value, key: &str) -> Result<Option<String>, StageError> {
    let Some(encoded) = secret
        .get("data")
        .and_then(|data| data.get(key))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };

    let bytes = BASE64.decode(encoded).map_err(|e| StageError::Output {
        command: "kubectl get secret".to_string(),
        reason: format!("key '{}' is not valid base64: {}", key, e),
    })?;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| StageError::Output {
            command: "kubectl get secret".to_string(),
            reason: format!("key '{}' is not UTF-8: {}", key, e),
        })
}
