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

//! Persistence facades consumed by jobs and the action-task executor.
//!
//! The traits here are the only view the orchestration core has of storage.
//! [`memory`] provides process-local implementations for standalone use and
//! tests; [`crate::dal`] provides the database-backed ones.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::action_task::{ActionTask, ActionTaskStatus, ExtMap, NewActionTask};
use crate::error::StoreError;
use crate::jobs::ExecutionResult;

/// Query parameters for [`ActionTaskStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub cluster_name: Option<String>,
    pub status: Option<ActionTaskStatus>,
    /// Maximum number of rows; zero means no limit.
    pub limit: usize,
}

impl TaskFilter {
    pub fn for_cluster(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: Some(cluster_name.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ActionTaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Access to the shared `action_tasks` table.
///
/// Every `mark_*` method is a guarded transition: it only touches the row when
/// the move is legal (`running` from `pending`, terminal states from `pending`
/// or `running`) and reports whether the row actually moved.
#[async_trait]
pub trait ActionTaskStore: Send + Sync {
    async fn create(&self, task: NewActionTask) -> Result<ActionTask, StoreError>;

    async fn get(&self, id: i64) -> Result<ActionTask, StoreError>;

    /// Oldest-first pending tasks for one cluster, at most `batch_size` of them.
    async fn get_pending_tasks(
        &self,
        cluster_name: &str,
        batch_size: usize,
    ) -> Result<Vec<ActionTask>, StoreError>;

    async fn mark_running(&self, id: i64) -> Result<bool, StoreError>;

    async fn mark_completed(&self, id: i64, result: Option<ExtMap>) -> Result<bool, StoreError>;

    async fn mark_failed(&self, id: i64, message: &str) -> Result<bool, StoreError>;

    async fn mark_timeout(&self, id: i64) -> Result<bool, StoreError>;

    /// Newest-first listing.
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<ActionTask>, StoreError>;

    /// Removes terminal tasks last updated before `cutoff`.
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Access to persisted job execution history.
#[async_trait]
pub trait ExecutionHistoryStore: Send + Sync {
    async fn record(&self, result: &ExecutionResult) -> Result<(), StoreError>;

    /// Newest-first results for one job.
    async fn recent(&self, job_name: &str, limit: usize)
        -> Result<Vec<ExecutionResult>, StoreError>;

    /// Removes results that started before `cutoff`.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}
