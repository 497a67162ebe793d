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

//! # Install workflows
//!
//! A [`Workflow`] is an ordered list of [`Stage`]s that together install one
//! product into a cluster. Install runs the stages forward, checking each with
//! `verify` before moving on; uninstall rolls them back in reverse; status
//! verifies every stage and folds the results into one [`StageState`].
//!
//! Stages own no persisted state. Whatever they create lives in the cluster
//! (Helm releases, pods), so `run` must be safe to repeat: a second install
//! re-runs every stage from the top.
//!
//! ```rust,ignore
//! let registry = WorkflowRegistry::with_builtin(Arc::new(HelmCli::default()));
//! let workflow = registry.new_workflow("dataplane", &WorkflowConfig::default())?;
//! workflow.install(&cancel, &RunOptions::default()).await?;
//! ```

pub mod base;
pub mod builtin;
pub mod progress;
pub mod registry;
pub mod release;
pub mod stages;
pub mod storage;

pub use base::BaseWorkflow;
pub use builtin::{InstallScope, StorageMode, WorkflowConfig};
pub use progress::{ProgressReporter, TracingProgress};
pub use registry::{WorkflowFactory, WorkflowRegistry};
pub use release::{HelmCli, PodReadiness, ReleaseClient, ReleaseState};
pub use stages::{HelmReleaseStage, PodWait, WaitForPodsStage};
pub use storage::{
    DatabaseMigrationStage, EmbeddedMigrator, ExternalStorage, SchemaMigrator, StorageSecretStage,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::error::{StageError, WorkflowError};

pub const DEFAULT_NAMESPACE: &str = "primus-lens";

/// Options shared by every stage operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub namespace: String,
    /// `None` uses the ambient kubeconfig (in-cluster or `$KUBECONFIG`).
    pub kubeconfig: Option<PathBuf>,
    pub dry_run: bool,
    pub verbose: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            kubeconfig: None,
            dry_run: false,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UninstallOptions {
    /// Keep rolling back earlier stages after one fails.
    pub force: bool,
}

/// Observed state of a stage, or of a whole workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Ready,
    Unknown,
    Pending,
    InProgress,
    Failed,
}

impl StageState {
    /// Rank used when folding stage states into a workflow state; the highest
    /// rank wins.
    pub fn precedence(&self) -> u8 {
        match self {
            StageState::Ready => 0,
            StageState::Unknown => 1,
            StageState::Pending => 2,
            StageState::InProgress => 3,
            StageState::Failed => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Ready => "Ready",
            StageState::Unknown => "Unknown",
            StageState::Pending => "Pending",
            StageState::InProgress => "InProgress",
            StageState::Failed => "Failed",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Folds stage states into one: `Failed > InProgress > Pending > Unknown >
/// Ready`. An empty input is `Ready`.
///
/// The plain four-state fold has no slot for `Unknown` and lets it collapse
/// into `Ready`. Here it ranks above `Ready` instead, so a workflow whose only
/// non-ready stage could not be verified reports `Unknown` rather than
/// `Ready`. It still ranks below `Pending`, so the `Failed`, `InProgress` and
/// `Pending` outcomes are unchanged.
pub fn overall_state<I>(states: I) -> StageState
where
    I: IntoIterator<Item = StageState>,
{
    states
        .into_iter()
        .fold(StageState::Ready, |acc, state| {
            if state.precedence() > acc.precedence() {
                state
            } else {
                acc
            }
        })
}

/// Result of a stage's `verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatus {
    pub state: StageState,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

impl StageStatus {
    pub fn new(state: StageState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn ready(message: impl Into<String>) -> Self {
        Self::new(StageState::Ready, message)
    }

    pub fn pending(message: impl Into<String>) -> Self {
        Self::new(StageState::Pending, message)
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        Self::new(StageState::InProgress, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(StageState::Failed, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(StageState::Unknown, message)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// One idempotent provisioning step.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Applies the step. Must be safe to call again after success.
    async fn run(&self, cancel: &CancellationToken, opts: &RunOptions) -> Result<(), StageError>;

    /// Inspects the cluster and reports how far the step has got.
    async fn verify(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<StageStatus, StageError>;

    /// Removes whatever `run` created, regardless of the current state.
    async fn rollback(&self, cancel: &CancellationToken, opts: &RunOptions)
        -> Result<(), StageError>;
}

/// Status of one stage inside a [`WorkflowStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedStageStatus {
    pub stage: String,
    pub status: StageStatus,
}

/// Aggregated status, recomputed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub workflow: String,
    pub overall: StageState,
    pub stages: Vec<NamedStageStatus>,
}

impl WorkflowStatus {
    pub fn from_stages(workflow: impl Into<String>, stages: Vec<NamedStageStatus>) -> Self {
        let overall = overall_state(stages.iter().map(|s| s.status.state));
        Self {
            workflow: workflow.into(),
            overall,
            stages,
        }
    }
}

/// An installable product made of ordered stages.
#[async_trait]
pub trait Workflow: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Stage names in execution order.
    fn stage_names(&self) -> Vec<String>;

    /// Runs and verifies each stage in order, stopping at the first failure.
    /// Cancellation is checked before each stage; a stage already running is
    /// not interrupted by the workflow.
    async fn install(&self, cancel: &CancellationToken, opts: &RunOptions)
        -> Result<(), WorkflowError>;

    /// Rolls stages back in reverse order.
    async fn uninstall(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        uninstall: &UninstallOptions,
    ) -> Result<(), WorkflowError>;

    async fn status(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<WorkflowStatus, WorkflowError>;

    /// Rebuilds the stage list around a Helm values file. Only allowed before
    /// the workflow first runs.
    fn set_values_file(&self, path: PathBuf) -> Result<(), WorkflowError> {
        let _ = path;
        Err(WorkflowError::InvalidConfig(format!(
            "workflow '{}' does not accept a values file",
            self.name()
        )))
    }
}
