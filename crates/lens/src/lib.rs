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

//! # Lens
//!
//! Orchestration core for running work across many independently operated
//! Kubernetes clusters. Clusters that cannot reach each other share one
//! relational database, and that database is the message bus.
//!
//! ## Pieces
//!
//! - [`action_task`]: management-plane callers insert [`action_task::ActionTask`]
//!   rows addressed to a cluster; the [`action_task::ActionTaskExecutor`] running
//!   in that cluster polls for them, dispatches each to a registered
//!   [`action_task::ActionHandler`] and writes the outcome back to the same row.
//! - [`jobs`]: the [`jobs::Job`] contract and the [`jobs::JobScheduler`] that fires
//!   jobs on cron or `@every` schedules, skips overlapping runs, emits metrics
//!   and persists execution history.
//! - [`workflow`]: ordered, idempotent install [`workflow::Stage`]s composed into
//!   [`workflow::Workflow`]s with forward install, reverse uninstall and an
//!   aggregated status query.
//! - [`store`] and [`dal`]: the persistence facade, with in-memory and diesel
//!   backed implementations.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use lens::*;
//!
//! let database = Database::new("sqlite://lens.db", 1)?;
//! database.run_migrations().await?;
//! let storage = StorageClientSet::from_dal(&DAL::new(database));
//!
//! let executor = ActionTaskExecutor::new(ActionTaskExecutorConfig::default());
//! lens::action_task::builtin::register_builtin_handlers(executor.handlers());
//!
//! let handle = JobScheduler::new(SchedulerConfig::default(), K8sClientSet::new("east"), storage)
//!     .start(vec![Arc::new(executor)]);
//! ```

pub mod action_task;
pub mod clients;
pub mod dal;
pub mod database;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod store;
pub mod workflow;

pub use action_task::{
    ActionHandler, ActionTask, ActionTaskExecutor, ActionTaskExecutorConfig, ActionTaskStatus,
    ClaimStrategy, HandlerRegistry, NewActionTask,
};
pub use clients::{K8sClientSet, StorageClientSet};
pub use dal::DAL;
pub use database::{BackendType, Database};
pub use error::{
    DatabaseError, JobError, RegistryError, ScheduleError, StageError, StoreError, WorkflowError,
};
pub use jobs::{
    ExecutionResult, ExecutionStats, InstanceMode, Job, JobPlacement, JobRegistry, JobScheduler,
    RetentionJob, Schedule, SchedulerConfig, SchedulerHandle,
};
pub use logging::{init_logging, init_logging_with_format, LogFormat};
pub use store::{ActionTaskStore, ExecutionHistoryStore, TaskFilter};
pub use workflow::{
    RunOptions, Stage, StageState, StageStatus, UninstallOptions, Workflow, WorkflowConfig,
    WorkflowRegistry, WorkflowStatus,
};
