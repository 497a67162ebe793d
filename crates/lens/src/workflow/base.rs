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

//! Generic stage sequencing.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress::{ProgressReporter, TracingProgress};
use super::{
    NamedStageStatus, RunOptions, Stage, StageState, StageStatus, UninstallOptions, Workflow,
    WorkflowStatus,
};
use crate::error::{StageError, WorkflowError};

/// Wraps a stage error, keeping cancellation distinguishable.
fn stage_failed(stage: &dyn Stage, source: StageError) -> WorkflowError {
    match source {
        StageError::Cancelled => WorkflowError::Cancelled,
        source => WorkflowError::StageFailed {
            stage: stage.name().to_string(),
            source,
        },
    }
}

/// Workflow over an explicit list of stages.
///
/// The list can be replaced with [`BaseWorkflow::set_stages`] until the first
/// install or uninstall; after that it is fixed.
pub struct BaseWorkflow {
    name: String,
    description: String,
    stages: RwLock<Vec<Arc<dyn Stage>>>,
    started: AtomicBool,
    progress: Arc<dyn ProgressReporter>,
}

impl BaseWorkflow {
    pub fn new(name: impl Into<String>, stages: Vec<Arc<dyn Stage>>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            stages: RwLock::new(stages),
            started: AtomicBool::new(false),
            progress: Arc::new(TracingProgress),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Replaces the whole stage list.
    pub fn set_stages(&self, stages: Vec<Arc<dyn Stage>>) -> Result<(), WorkflowError> {
        let mut current = self.stages.write();
        if self.has_started() {
            return Err(WorkflowError::AlreadyStarted(self.name.clone()));
        }
        *current = stages;
        Ok(())
    }

    /// Marks the workflow started and returns the stage list it will use.
    fn begin(&self) -> Vec<Arc<dyn Stage>> {
        let stages = self.stages.read();
        self.started.store(true, Ordering::Release);
        stages.clone()
    }
}

#[async_trait]
impl Workflow for BaseWorkflow {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn stage_names(&self) -> Vec<String> {
        self.stages
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    async fn install(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<(), WorkflowError> {
        let stages = self.begin();
        let total = stages.len();
        info!(
            workflow = %self.name,
            stages = total,
            namespace = %opts.namespace,
            dry_run = opts.dry_run,
            "Installing workflow"
        );

        // A started stage runs to completion; `cancel` only stops the next one
        // from starting, so a Helm command is never killed mid-upgrade.
        let stage_cancel = CancellationToken::new();

        for (i, stage) in stages.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(workflow = %self.name, next_stage = stage.name(), "Install cancelled");
                return Err(WorkflowError::Cancelled);
            }

            self.progress.stage_started(i + 1, total, stage.name());

            stage
                .run(&stage_cancel, opts)
                .await
                .map_err(|source| stage_failed(stage.as_ref(), source))?;

            let status = stage
                .verify(&stage_cancel, opts)
                .await
                .map_err(|source| stage_failed(stage.as_ref(), source))?;
            self.progress
                .stage_verified(i + 1, total, stage.name(), &status);

            if status.state == StageState::Failed {
                return Err(WorkflowError::VerificationFailed {
                    stage: stage.name().to_string(),
                    message: status.message,
                });
            }
        }

        info!(workflow = %self.name, "Workflow installed");
        Ok(())
    }

    async fn uninstall(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        uninstall: &UninstallOptions,
    ) -> Result<(), WorkflowError> {
        let stages = self.begin();
        let total = stages.len();
        info!(workflow = %self.name, stages = total, force = uninstall.force, "Uninstalling workflow");

        let stage_cancel = CancellationToken::new();

        for (i, stage) in stages.iter().enumerate().rev() {
            if cancel.is_cancelled() {
                warn!(workflow = %self.name, next_stage = stage.name(), "Uninstall cancelled");
                return Err(WorkflowError::Cancelled);
            }

            self.progress.rollback_started(total - i, total, stage.name());

            if let Err(source) = stage.rollback(&stage_cancel, opts).await {
                if uninstall.force {
                    self.progress.rollback_skipped(stage.name(), &source);
                    continue;
                }
                return Err(WorkflowError::RollbackFailed {
                    stage: stage.name().to_string(),
                    source,
                });
            }
        }

        info!(workflow = %self.name, "Workflow uninstalled");
        Ok(())
    }

    async fn status(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<WorkflowStatus, WorkflowError> {
        let stages: Vec<Arc<dyn Stage>> = self.stages.read().clone();
        let mut statuses = Vec::with_capacity(stages.len());

        for stage in &stages {
            if cancel.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }
            let status = match stage.verify(cancel, opts).await {
                Ok(status) => status,
                Err(e) => {
                    debug!(stage = stage.name(), error = %e, "Stage verification errored");
                    StageStatus::unknown(e.to_string())
                }
            };
            statuses.push(NamedStageStatus {
                stage: stage.name().to_string(),
                status,
            });
        }

        Ok(WorkflowStatus::from_stages(&self.name, statuses))
    }
}
