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

//! Row types mapped onto [`crate::database::schema`].

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use std::time::Duration;

use crate::action_task::{ActionTask, ActionTaskStatus, ExtMap};
use crate::database::schema::{action_tasks, job_execution_history};
use crate::error::StoreError;
use crate::jobs::{ExecutionResult, ExecutionStats};

pub(crate) fn to_utc(ts: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc)
}

#[derive(Debug, Clone, Queryable)]
pub struct ActionTaskRow {
    pub id: i64,
    pub action_type: String,
    pub target_type: String,
    pub target_id: String,
    pub target_node: Option<String>,
    pub cluster_name: String,
    pub parameters: String,
    pub status: String,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub timeout_seconds: i64,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = action_tasks)]
pub struct NewActionTaskRow {
    pub action_type: String,
    pub target_type: String,
    pub target_id: String,
    pub target_node: Option<String>,
    pub cluster_name: String,
    pub parameters: String,
    pub status: String,
    pub timeout_seconds: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<ActionTaskRow> for ActionTask {
    type Error = StoreError;

    fn try_from(row: ActionTaskRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ActionTaskStatus>()
            .map_err(StoreError::InvalidValue)?;
        let parameters: ExtMap = serde_json::from_str(&row.parameters)?;
        let result = row
            .result
            .as_deref()
            .map(serde_json::from_str::<ExtMap>)
            .transpose()?;

        Ok(ActionTask {
            id: row.id,
            action_type: row.action_type,
            target_type: row.target_type,
            target_id: row.target_id,
            target_node: row.target_node,
            cluster_name: row.cluster_name,
            parameters,
            status,
            result,
            error_message: row.error_message,
            timeout_seconds: row.timeout_seconds,
            created_at: to_utc(row.created_at),
            started_at: row.started_at.map(to_utc),
            completed_at: row.completed_at.map(to_utc),
            updated_at: to_utc(row.updated_at),
        })
    }
}

#[derive(Debug, Clone, Queryable)]
pub struct ExecutionHistoryRow {
    pub id: i64,
    pub job_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub stats: String,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = job_execution_history)]
pub struct NewExecutionHistoryRow {
    pub job_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub stats: String,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub duration_ms: i64,
}

impl TryFrom<&ExecutionResult> for NewExecutionHistoryRow {
    type Error = StoreError;

    fn try_from(result: &ExecutionResult) -> Result<Self, Self::Error> {
        Ok(NewExecutionHistoryRow {
            job_name: result.job_name.clone(),
            success: result.success,
            error: result.error.clone(),
            stats: serde_json::to_string(&result.stats)?,
            started_at: result.started_at.naive_utc(),
            finished_at: result.finished_at.naive_utc(),
            duration_ms: i64::try_from(result.duration.as_millis()).unwrap_or(i64::MAX),
        })
    }
}

impl TryFrom<ExecutionHistoryRow> for ExecutionResult {
    type Error = StoreError;

    fn try_from(row: ExecutionHistoryRow) -> Result<Self, Self::Error> {
        let stats: ExecutionStats = serde_json::from_str(&row.stats)?;
        Ok(ExecutionResult {
            job_name: row.job_name,
            success: row.success,
            error: row.error,
            stats,
            started_at: to_utc(row.started_at),
            finished_at: to_utc(row.finished_at),
            duration: Duration::from_millis(u64::try_from(row.duration_ms).unwrap_or(0)),
        })
    }
}
