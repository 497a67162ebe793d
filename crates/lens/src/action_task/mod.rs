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

//! # Cross-cluster action tasks
//!
//! An [`ActionTask`] is a row in the shared `action_tasks` table. A
//! management-plane caller inserts it tagged with the target cluster's name;
//! the [`ActionTaskExecutor`] running inside that cluster polls for it,
//! executes it through a registered handler and writes the terminal state back
//! to the same row. The table is the only channel between the two sides.
//!
//! Lifecycle:
//!
//! ```text
//! pending ──► running ──► completed | failed | timeout
//!    └──────────────────► timeout | failed
//! ```
//!
//! Transitions only move forward; the storage layer refuses to move a row out
//! of a terminal state.

pub mod builtin;
pub mod executor;
pub mod handler;

pub use executor::{ActionTaskExecutor, ActionTaskExecutorConfig, ClaimStrategy};
pub use handler::{ActionHandler, HandlerRegistry};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque JSON object stored in the `parameters` and `result` columns.
pub type ExtMap = serde_json::Map<String, serde_json::Value>;

/// Timeout applied to new tasks when the caller does not pick one.
pub const DEFAULT_TASK_TIMEOUT_SECS: i64 = 300;

/// Lifecycle state of an action task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl ActionTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTaskStatus::Pending => "pending",
            ActionTaskStatus::Running => "running",
            ActionTaskStatus::Completed => "completed",
            ActionTaskStatus::Failed => "failed",
            ActionTaskStatus::Timeout => "timeout",
        }
    }

    /// Whether no further transition is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionTaskStatus::Completed | ActionTaskStatus::Failed | ActionTaskStatus::Timeout
        )
    }

    /// Whether a row in this state may move to `next`.
    pub fn can_transition_to(&self, next: ActionTaskStatus) -> bool {
        match (self, next) {
            (ActionTaskStatus::Pending, ActionTaskStatus::Running) => true,
            (ActionTaskStatus::Pending, n) | (ActionTaskStatus::Running, n) => n.is_terminal(),
            _ => false,
        }
    }

    pub fn terminal_statuses() -> [ActionTaskStatus; 3] {
        [
            ActionTaskStatus::Completed,
            ActionTaskStatus::Failed,
            ActionTaskStatus::Timeout,
        ]
    }
}

impl fmt::Display for ActionTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionTaskStatus::Pending),
            "running" => Ok(ActionTaskStatus::Running),
            "completed" => Ok(ActionTaskStatus::Completed),
            "failed" => Ok(ActionTaskStatus::Failed),
            "timeout" => Ok(ActionTaskStatus::Timeout),
            other => Err(format!("unknown action task status '{}'", other)),
        }
    }
}

/// A unit of cross-cluster work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTask {
    pub id: i64,
    pub action_type: String,
    pub target_type: String,
    pub target_id: String,
    pub target_node: Option<String>,
    pub cluster_name: String,
    pub parameters: ExtMap,
    pub status: ActionTaskStatus,
    pub result: Option<ExtMap>,
    pub error_message: Option<String>,
    pub timeout_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ActionTask {
    /// Whether the task sat in the queue longer than its timeout.
    ///
    /// A non-positive timeout disables the check.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.timeout_seconds <= 0 {
            return false;
        }
        now.signed_duration_since(self.created_at) > ChronoDuration::seconds(self.timeout_seconds)
    }

    /// Convenience accessor for a string parameter.
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }
}

/// Insert payload used by management-plane callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActionTask {
    pub action_type: String,
    pub target_type: String,
    pub target_id: String,
    pub target_node: Option<String>,
    pub cluster_name: String,
    pub parameters: ExtMap,
    pub timeout_seconds: i64,
}

impl NewActionTask {
    pub fn new(
        cluster_name: impl Into<String>,
        action_type: impl Into<String>,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            target_type: target_type.into(),
            target_id: target_id.into(),
            target_node: None,
            cluster_name: cluster_name.into(),
            parameters: ExtMap::new(),
            timeout_seconds: DEFAULT_TASK_TIMEOUT_SECS,
        }
    }

    pub fn with_target_node(mut self, node: impl Into<String>) -> Self {
        self.target_node = Some(node.into());
        self
    }

    pub fn with_parameters(mut self, parameters: ExtMap) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: i64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}
