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

//! Execution history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::stats::ExecutionStats;

/// Outcome of one scheduled job firing, as persisted to the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub job_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub stats: ExecutionStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn succeeded(
        job_name: impl Into<String>,
        stats: ExecutionStats,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            success: true,
            error: None,
            stats,
            started_at,
            finished_at: Utc::now(),
            duration,
        }
    }

    /// A failed run keeps whatever partial stats the job produced, if any.
    pub fn failed(
        job_name: impl Into<String>,
        error: impl Into<String>,
        stats: Option<ExecutionStats>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            success: false,
            error: Some(error.into()),
            stats: stats.unwrap_or_default(),
            started_at,
            finished_at: Utc::now(),
            duration,
        }
    }
}
