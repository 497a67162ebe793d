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

//! In-memory facades.
//!
//! Used by standalone deployments without a shared database and throughout the
//! test suite. Transition guards match the database-backed DAL exactly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::{ActionTaskStore, ExecutionHistoryStore, TaskFilter};
use crate::action_task::{ActionTask, ActionTaskStatus, ExtMap, NewActionTask};
use crate::error::StoreError;
use crate::jobs::ExecutionResult;

#[derive(Debug, Default)]
struct TaskTable {
    next_id: i64,
    rows: BTreeMap<i64, ActionTask>,
}

/// Process-local action task table. Ids are assigned monotonically from 1.
#[derive(Debug, Default)]
pub struct MemoryActionTaskStore {
    inner: Mutex<TaskTable>,
}

impl MemoryActionTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully-formed row, keeping its timestamps. Test helper for
    /// seeding stale tasks.
    pub fn insert_raw(&self, mut task: ActionTask) -> ActionTask {
        let mut table = self.inner.lock();
        table.next_id += 1;
        task.id = table.next_id;
        table.rows.insert(task.id, task.clone());
        task
    }

    fn transition<F>(&self, id: i64, next: ActionTaskStatus, apply: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut ActionTask, DateTime<Utc>),
    {
        let mut table = self.inner.lock();
        let row = table.rows.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "action_task",
            id,
        })?;
        if !row.status.can_transition_to(next) {
            return Ok(false);
        }
        let now = Utc::now();
        row.status = next;
        row.updated_at = now;
        apply(row, now);
        Ok(true)
    }
}

#[async_trait]
impl ActionTaskStore for MemoryActionTaskStore {
    async fn create(&self, task: NewActionTask) -> Result<ActionTask, StoreError> {
        let now = Utc::now();
        let mut table = self.inner.lock();
        table.next_id += 1;
        let row = ActionTask {
            id: table.next_id,
            action_type: task.action_type,
            target_type: task.target_type,
            target_id: task.target_id,
            target_node: task.target_node,
            cluster_name: task.cluster_name,
            parameters: task.parameters,
            status: ActionTaskStatus::Pending,
            result: None,
            error_message: None,
            timeout_seconds: task.timeout_seconds,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };
        table.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: i64) -> Result<ActionTask, StoreError> {
        self.inner
            .lock()
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "action_task",
                id,
            })
    }

    async fn get_pending_tasks(
        &self,
        cluster_name: &str,
        batch_size: usize,
    ) -> Result<Vec<ActionTask>, StoreError> {
        let table = self.inner.lock();
        Ok(table
            .rows
            .values()
            .filter(|t| t.cluster_name == cluster_name && t.status == ActionTaskStatus::Pending)
            .take(batch_size)
            .cloned()
            .collect())
    }

    async fn mark_running(&self, id: i64) -> Result<bool, StoreError> {
        self.transition(id, ActionTaskStatus::Running, |row, now| {
            row.started_at = Some(now);
        })
    }

    async fn mark_completed(&self, id: i64, result: Option<ExtMap>) -> Result<bool, StoreError> {
        self.transition(id, ActionTaskStatus::Completed, |row, now| {
            row.result = result;
            row.completed_at = Some(now);
        })
    }

    async fn mark_failed(&self, id: i64, message: &str) -> Result<bool, StoreError> {
        self.transition(id, ActionTaskStatus::Failed, |row, now| {
            row.error_message = Some(message.to_string());
            row.completed_at = Some(now);
        })
    }

    async fn mark_timeout(&self, id: i64) -> Result<bool, StoreError> {
        self.transition(id, ActionTaskStatus::Timeout, |row, now| {
            row.completed_at = Some(now);
        })
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<ActionTask>, StoreError> {
        let table = self.inner.lock();
        let matching = table.rows.values().rev().filter(|t| {
            filter
                .cluster_name
                .as_deref()
                .map_or(true, |c| t.cluster_name == c)
                && filter.status.map_or(true, |s| t.status == s)
        });
        let rows = if filter.limit > 0 {
            matching.take(filter.limit).cloned().collect()
        } else {
            matching.cloned().collect()
        };
        Ok(rows)
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut table = self.inner.lock();
        let before = table.rows.len();
        table
            .rows
            .retain(|_, t| !(t.status.is_terminal() && t.updated_at < cutoff));
        Ok(before - table.rows.len())
    }
}

/// Process-local execution history.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    results: Mutex<Vec<ExecutionResult>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }
}

#[async_trait]
impl ExecutionHistoryStore for MemoryHistoryStore {
    async fn record(&self, result: &ExecutionResult) -> Result<(), StoreError> {
        self.results.lock().push(result.clone());
        Ok(())
    }

    async fn recent(
        &self,
        job_name: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionResult>, StoreError> {
        Ok(self
            .results
            .lock()
            .iter()
            .rev()
            .filter(|r| r.job_name == job_name)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut results = self.results.lock();
        let before = results.len();
        results.retain(|r| r.started_at >= cutoff);
        Ok(before - results.len())
    }
}
