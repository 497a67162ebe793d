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

//! The action-task executor job.
//!
//! Runs inside a workload cluster and turns the shared `action_tasks` table
//! into an RPC channel: each poll fetches a batch of this cluster's pending
//! tasks and processes them one after another.
//!
//! Per task:
//!
//! 1. A task older than its `timeout_seconds` is marked `timeout` and never
//!    reaches a handler.
//! 2. The task is marked `running`. What happens when that fails depends on the
//!    [`ClaimStrategy`].
//! 3. An unregistered action type fails the task with `unknown action type`.
//! 4. The handler runs; an error fails the task with the error text, a value
//!    that is not a JSON object fails it as unmarshallable, anything else
//!    completes it.
//!
//! A failing task never aborts the batch. [`Job::run`] only returns an error
//! when the initial fetch fails.
//!
//! Non-overlap between polls comes from the scheduler, which skips a firing
//! while the previous run is still in flight.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::{ActionHandler, HandlerRegistry};
use super::{ActionTask, ExtMap};
use crate::clients::{K8sClientSet, StorageClientSet};
use crate::error::JobError;
use crate::jobs::{metrics, ExecutionStats, Job};
use crate::store::ActionTaskStore;

pub const ACTION_TASK_EXECUTOR_JOB_NAME: &str = "action_task_executor";

/// How the executor treats the `pending → running` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStrategy {
    /// Attempt the transition, but execute the task whatever the outcome.
    /// Two executors polling the same cluster may both run a task.
    #[default]
    BestEffort,
    /// Execute only when this executor moved the row out of `pending`.
    Conditional,
}

impl fmt::Display for ClaimStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimStrategy::BestEffort => f.write_str("best_effort"),
            ClaimStrategy::Conditional => f.write_str("conditional"),
        }
    }
}

impl FromStr for ClaimStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "best_effort" => Ok(ClaimStrategy::BestEffort),
            "conditional" => Ok(ClaimStrategy::Conditional),
            other => Err(format!(
                "unknown claim strategy '{}' (expected best_effort or conditional)",
                other
            )),
        }
    }
}

/// Configuration for [`ActionTaskExecutor`].
///
/// ```rust,ignore
/// let config = ActionTaskExecutorConfig::builder()
///     .cluster_name("east")
///     .batch_size(10)
///     .poll_interval(Duration::from_millis(300))
///     .build();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ActionTaskExecutorConfig {
    cluster_name: Option<String>,
    batch_size: usize,
    poll_interval: Duration,
    claim_strategy: ClaimStrategy,
}

impl ActionTaskExecutorConfig {
    pub fn builder() -> ActionTaskExecutorConfigBuilder {
        ActionTaskExecutorConfigBuilder::default()
    }

    /// Cluster whose tasks are polled; `None` uses the cluster of the
    /// [`K8sClientSet`] passed to each run.
    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// Maximum number of tasks fetched per poll.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn claim_strategy(&self) -> ClaimStrategy {
        self.claim_strategy
    }
}

impl Default for ActionTaskExecutorConfig {
    fn default() -> Self {
        ActionTaskExecutorConfigBuilder::default().build()
    }
}

#[derive(Debug, Clone)]
pub struct ActionTaskExecutorConfigBuilder {
    config: ActionTaskExecutorConfig,
}

impl Default for ActionTaskExecutorConfigBuilder {
    fn default() -> Self {
        Self {
            config: ActionTaskExecutorConfig {
                cluster_name: None,
                batch_size: 10,
                poll_interval: Duration::from_millis(300),
                claim_strategy: ClaimStrategy::BestEffort,
            },
        }
    }
}

impl ActionTaskExecutorConfigBuilder {
    pub fn cluster_name(mut self, value: impl Into<String>) -> Self {
        self.config.cluster_name = Some(value.into());
        self
    }

    pub fn batch_size(mut self, value: usize) -> Self {
        self.config.batch_size = value.max(1);
        self
    }

    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value;
        self
    }

    pub fn claim_strategy(mut self, value: ClaimStrategy) -> Self {
        self.config.claim_strategy = value;
        self
    }

    pub fn build(self) -> ActionTaskExecutorConfig {
        self.config
    }
}

/// What happened to one task within a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed,
    TimedOut,
    /// Left alone because another executor claimed it first.
    Skipped,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Failed => "failed",
            TaskOutcome::TimedOut => "timeout",
            TaskOutcome::Skipped => "skipped",
        }
    }
}

/// Polls the shared table for this cluster's action tasks and executes them.
pub struct ActionTaskExecutor {
    config: ActionTaskExecutorConfig,
    handlers: Arc<HandlerRegistry>,
}

impl ActionTaskExecutor {
    pub fn new(config: ActionTaskExecutorConfig) -> Self {
        Self::with_handlers(config, Arc::new(HandlerRegistry::new()))
    }

    /// Uses a handler registry shared with other components.
    pub fn with_handlers(config: ActionTaskExecutorConfig, handlers: Arc<HandlerRegistry>) -> Self {
        Self { config, handlers }
    }

    pub fn config(&self) -> &ActionTaskExecutorConfig {
        &self.config
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    /// Installs `handler` for `action_type`; the last registration wins.
    pub fn register_handler<H>(&self, action_type: impl Into<String>, handler: H)
    where
        H: ActionHandler + 'static,
    {
        self.handlers.register(action_type, handler);
    }

    /// Processes a single task that has already been fetched.
    pub async fn process_task(
        &self,
        cancel: &CancellationToken,
        task: &ActionTask,
        k8s: &K8sClientSet,
        store: &dyn ActionTaskStore,
    ) -> TaskOutcome {
        let now = Utc::now();
        if task.is_expired(now) {
            warn!(
                task_id = task.id,
                action_type = %task.action_type,
                age_secs = now.signed_duration_since(task.created_at).num_seconds(),
                timeout_secs = task.timeout_seconds,
                "Action task expired before execution"
            );
            if let Err(e) = store.mark_timeout(task.id).await {
                error!(task_id = task.id, error = %e, "Failed to mark action task as timed out");
            }
            return TaskOutcome::TimedOut;
        }

        match (store.mark_running(task.id).await, self.config.claim_strategy) {
            (Ok(true), _) => {}
            (Ok(false), ClaimStrategy::BestEffort) => {
                debug!(task_id = task.id, "Action task no longer pending; executing anyway");
            }
            (Ok(false), ClaimStrategy::Conditional) => {
                info!(task_id = task.id, "Action task claimed by another executor; skipping");
                return TaskOutcome::Skipped;
            }
            (Err(e), ClaimStrategy::BestEffort) => {
                warn!(task_id = task.id, error = %e, "Failed to mark action task running; executing anyway");
            }
            (Err(e), ClaimStrategy::Conditional) => {
                warn!(task_id = task.id, error = %e, "Failed to claim action task; leaving it pending");
                return TaskOutcome::Skipped;
            }
        }

        let Some(handler) = self.handlers.get(&task.action_type) else {
            let message = format!("unknown action type: {}", task.action_type);
            warn!(task_id = task.id, action_type = %task.action_type, "No handler registered for action type");
            self.fail(store, task, &message).await;
            return TaskOutcome::Failed;
        };

        debug!(
            task_id = task.id,
            action_type = %task.action_type,
            target = %format!("{}/{}", task.target_type, task.target_id),
            "Executing action task"
        );

        let value = match handler.handle(cancel.clone(), task, k8s).await {
            Ok(value) => value,
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(task_id = task.id, action_type = %task.action_type, error = %message, "Action handler failed");
                self.fail(store, task, &message).await;
                return TaskOutcome::Failed;
            }
        };

        let result = match into_result_map(value) {
            Ok(result) => result,
            Err(message) => {
                warn!(task_id = task.id, error = %message, "Action handler returned an unusable result");
                self.fail(store, task, &message).await;
                return TaskOutcome::Failed;
            }
        };

        if let Err(e) = store.mark_completed(task.id, result).await {
            error!(task_id = task.id, error = %e, "Failed to mark action task completed");
        } else {
            info!(task_id = task.id, action_type = %task.action_type, "Action task completed");
        }
        TaskOutcome::Completed
    }

    async fn fail(&self, store: &dyn ActionTaskStore, task: &ActionTask, message: &str) {
        if let Err(e) = store.mark_failed(task.id, message).await {
            error!(task_id = task.id, error = %e, "Failed to mark action task failed");
        }
    }
}

/// Normalizes a handler's return value into the stored result shape.
fn into_result_map(value: serde_json::Value) -> Result<Option<ExtMap>, String> {
    match value {
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::Null => Ok(None),
        other => {
            let kind = match other {
                serde_json::Value::Bool(_) => "boolean",
                serde_json::Value::Number(_) => "number",
                serde_json::Value::String(_) => "string",
                _ => "array",
            };
            Err(format!(
                "failed to marshal result: expected a JSON object, got a {}",
                kind
            ))
        }
    }
}

#[async_trait]
impl Job for ActionTaskExecutor {
    fn name(&self) -> &str {
        ACTION_TASK_EXECUTOR_JOB_NAME
    }

    fn schedule(&self) -> String {
        format!("@every {}ms", self.config.poll_interval.as_millis().max(1))
    }

    async fn run(
        &self,
        cancel: CancellationToken,
        k8s: &K8sClientSet,
        storage: &StorageClientSet,
    ) -> Result<ExecutionStats, JobError> {
        let cluster_name = self
            .config
            .cluster_name()
            .unwrap_or_else(|| k8s.cluster_name());
        let store = storage.action_tasks();
        let mut stats = ExecutionStats::new();

        let fetch_start = Instant::now();
        let tasks = store
            .get_pending_tasks(cluster_name, self.config.batch_size)
            .await?;
        stats.add_query_duration(fetch_start.elapsed());

        if tasks.is_empty() {
            return Ok(stats);
        }
        debug!(cluster = cluster_name, count = tasks.len(), "Processing pending action tasks");

        for task in &tasks {
            if cancel.is_cancelled() {
                debug!(cluster = cluster_name, "Cancelled; leaving remaining tasks pending");
                break;
            }

            let outcome = self.process_task(&cancel, task, k8s, store.as_ref()).await;
            metrics::record_action_task(&task.action_type, outcome.as_str());

            stats.records_processed += 1;
            stats.incr_custom_metric(outcome.as_str(), 1.0);
            match outcome {
                TaskOutcome::Completed => stats.items_updated += 1,
                TaskOutcome::Failed | TaskOutcome::TimedOut => {
                    stats.items_updated += 1;
                    stats.error_count += 1;
                }
                TaskOutcome::Skipped => {}
            }
        }

        Ok(stats)
    }
}
