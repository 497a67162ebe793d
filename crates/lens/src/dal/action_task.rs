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

//! Action task DAL.
//!
//! Status transitions are conditional `UPDATE`s: the `WHERE` clause carries the
//! set of states the row may move out of, and the affected-row count tells the
//! caller whether the transition happened.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::models::{ActionTaskRow, NewActionTaskRow};
use crate::action_task::{ActionTask, ActionTaskStatus, ExtMap, NewActionTask};
use crate::database::schema::action_tasks;
use crate::database::Database;
use crate::error::StoreError;
use crate::store::{ActionTaskStore, TaskFilter};

const PENDING: &str = "pending";
const RUNNING: &str = "running";

fn open_states() -> Vec<&'static str> {
    vec![PENDING, RUNNING]
}

fn terminal_states() -> Vec<&'static str> {
    ActionTaskStatus::terminal_statuses()
        .iter()
        .map(|s| s.as_str())
        .collect()
}

/// Database-backed [`ActionTaskStore`].
#[derive(Clone, Debug)]
pub struct ActionTaskDAL {
    database: Database,
}

impl ActionTaskDAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Moves an open task to a terminal state.
    async fn finish(
        &self,
        id: i64,
        status: ActionTaskStatus,
        result: Option<String>,
        error_message: Option<String>,
    ) -> Result<bool, StoreError> {
        let now = Utc::now().naive_utc();
        let status = status.as_str();
        let updated = interact!(self.database, |conn| {
            diesel::update(
                action_tasks::table
                    .filter(action_tasks::id.eq(id))
                    .filter(action_tasks::status.eq_any(open_states())),
            )
            .set((
                action_tasks::status.eq(status),
                action_tasks::result.eq(result),
                action_tasks::error_message.eq(error_message),
                action_tasks::completed_at.eq(Some(now)),
                action_tasks::updated_at.eq(now),
            ))
            .execute(conn)
        })?;
        self.moved_or_missing(id, updated).await
    }

    /// Zero affected rows means either an illegal transition or a missing row;
    /// only the latter is an error.
    async fn moved_or_missing(&self, id: i64, updated: usize) -> Result<bool, StoreError> {
        if updated > 0 {
            return Ok(true);
        }
        self.get(id).await.map(|_| false)
    }
}

#[async_trait]
impl ActionTaskStore for ActionTaskDAL {
    async fn create(&self, task: NewActionTask) -> Result<ActionTask, StoreError> {
        let now = Utc::now().naive_utc();
        let row = NewActionTaskRow {
            action_type: task.action_type,
            target_type: task.target_type,
            target_id: task.target_id,
            target_node: task.target_node,
            cluster_name: task.cluster_name,
            parameters: serde_json::to_string(&task.parameters)?,
            status: PENDING.to_string(),
            timeout_seconds: task.timeout_seconds,
            created_at: now,
            updated_at: now,
        };

        let inserted = interact!(self.database, |conn| {
            diesel::insert_into(action_tasks::table)
                .values(&row)
                .get_result::<ActionTaskRow>(conn)
        })?;
        inserted.try_into()
    }

    async fn get(&self, id: i64) -> Result<ActionTask, StoreError> {
        let row = interact!(self.database, |conn| {
            action_tasks::table
                .find(id)
                .first::<ActionTaskRow>(conn)
                .optional()
        })?;
        row.ok_or(StoreError::NotFound {
            entity: "action_task",
            id,
        })?
        .try_into()
    }

    async fn get_pending_tasks(
        &self,
        cluster_name: &str,
        batch_size: usize,
    ) -> Result<Vec<ActionTask>, StoreError> {
        let cluster_name = cluster_name.to_string();
        let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);
        let rows = interact!(self.database, |conn| {
            action_tasks::table
                .filter(action_tasks::cluster_name.eq(cluster_name))
                .filter(action_tasks::status.eq(PENDING))
                .order(action_tasks::id.asc())
                .limit(limit)
                .load::<ActionTaskRow>(conn)
        })?;
        rows.into_iter().map(ActionTask::try_from).collect()
    }

    async fn mark_running(&self, id: i64) -> Result<bool, StoreError> {
        let now = Utc::now().naive_utc();
        let updated = interact!(self.database, |conn| {
            diesel::update(
                action_tasks::table
                    .filter(action_tasks::id.eq(id))
                    .filter(action_tasks::status.eq(PENDING)),
            )
            .set((
                action_tasks::status.eq(RUNNING),
                action_tasks::started_at.eq(Some(now)),
                action_tasks::updated_at.eq(now),
            ))
            .execute(conn)
        })?;
        self.moved_or_missing(id, updated).await
    }

    async fn mark_completed(&self, id: i64, result: Option<ExtMap>) -> Result<bool, StoreError> {
        let encoded = result.as_ref().map(serde_json::to_string).transpose()?;
        self.finish(id, ActionTaskStatus::Completed, encoded, None)
            .await
    }

    async fn mark_failed(&self, id: i64, message: &str) -> Result<bool, StoreError> {
        self.finish(id, ActionTaskStatus::Failed, None, Some(message.to_string()))
            .await
    }

    async fn mark_timeout(&self, id: i64) -> Result<bool, StoreError> {
        self.finish(id, ActionTaskStatus::Timeout, None, None).await
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<ActionTask>, StoreError> {
        let cluster_name = filter.cluster_name.clone();
        let status = filter.status.map(|s| s.as_str());
        let limit = filter.limit;
        let rows = interact!(self.database, |conn| {
            let mut query = action_tasks::table
                .order(action_tasks::id.desc())
                .into_boxed();
            if let Some(cluster_name) = cluster_name {
                query = query.filter(action_tasks::cluster_name.eq(cluster_name));
            }
            if let Some(status) = status {
                query = query.filter(action_tasks::status.eq(status));
            }
            if limit > 0 {
                query = query.limit(i64::try_from(limit).unwrap_or(i64::MAX));
            }
            query.load::<ActionTaskRow>(conn)
        })?;
        rows.into_iter().map(ActionTask::try_from).collect()
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = cutoff.naive_utc();
        interact!(self.database, |conn| {
            diesel::delete(
                action_tasks::table
                    .filter(action_tasks::status.eq_any(terminal_states()))
                    .filter(action_tasks::updated_at.lt(cutoff)),
            )
            .execute(conn)
        })
    }
}
