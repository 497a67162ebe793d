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

//! Housekeeping job that prunes old history and finished action tasks.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{ExecutionStats, Job};
use crate::clients::{K8sClientSet, StorageClientSet};
use crate::error::JobError;

pub const RETENTION_JOB_NAME: &str = "retention";

/// Deletes execution history and terminal action tasks older than the
/// retention window. Runs hourly in every instance mode.
#[derive(Debug, Clone)]
pub struct RetentionJob {
    retention: Duration,
}

impl RetentionJob {
    pub fn new(retention: Duration) -> Self {
        Self { retention }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }
}

impl Default for RetentionJob {
    fn default() -> Self {
        Self::new(Duration::from_secs(7 * 24 * 3600))
    }
}

#[async_trait]
impl Job for RetentionJob {
    fn name(&self) -> &str {
        RETENTION_JOB_NAME
    }

    fn schedule(&self) -> String {
        "@every 1h".to_string()
    }

    async fn run(
        &self,
        cancel: CancellationToken,
        _k8s: &K8sClientSet,
        storage: &StorageClientSet,
    ) -> Result<ExecutionStats, JobError> {
        let retention = ChronoDuration::from_std(self.retention)
            .map_err(|e| JobError::Other(format!("retention window out of range: {}", e)))?;
        let cutoff = Utc::now() - retention;
        let mut stats = ExecutionStats::new();

        let started = Instant::now();
        let history = storage.history().prune_before(cutoff).await?;
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let tasks = storage.action_tasks().delete_finished_before(cutoff).await?;
        stats.add_query_duration(started.elapsed());

        stats.items_deleted = (history + tasks) as u64;
        stats.add_custom_metric("history_pruned", history as f64);
        stats.add_custom_metric("action_tasks_pruned", tasks as f64);

        if history + tasks > 0 {
            info!(
                history_pruned = history,
                action_tasks_pruned = tasks,
                %cutoff,
                "Pruned expired records"
            );
        }

        Ok(stats)
    }
}
