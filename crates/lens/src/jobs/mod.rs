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

//! # Periodic jobs
//!
//! A [`Job`] is a unit of recurring background work. The [`JobScheduler`]
//! fires every registered job on its own [`Schedule`], never overlapping two
//! runs of the same job, and wraps each run with metrics and an
//! [`ExecutionResult`] written to the history store.
//!
//! ```rust,ignore
//! use lens::jobs::{Job, JobPlacement, JobRegistry, JobScheduler, SchedulerConfig};
//!
//! let registry = JobRegistry::new();
//! registry.register(JobPlacement::DataPlane, Arc::new(executor));
//! registry.register(JobPlacement::Everywhere, Arc::new(RetentionJob::new(retention)));
//!
//! let handle = JobScheduler::new(SchedulerConfig::default(), k8s, storage)
//!     .start(registry.jobs_for(InstanceMode::Data));
//! // ...
//! handle.shutdown().await;
//! ```

pub mod history;
pub mod metrics;
pub mod registry;
pub mod retention;
pub mod schedule;
pub mod scheduler;
pub mod stats;

pub use history::ExecutionResult;
pub use registry::{InstanceMode, JobPlacement, JobRegistry};
pub use retention::RetentionJob;
pub use schedule::Schedule;
pub use scheduler::{JobScheduler, SchedulerConfig, SchedulerConfigBuilder, SchedulerHandle};
pub use stats::ExecutionStats;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::clients::{K8sClientSet, StorageClientSet};
use crate::error::JobError;

/// A periodically scheduled unit of work.
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable identifier used as the metrics label and history key.
    fn name(&self) -> &str;

    /// Schedule expression, see [`Schedule`].
    fn schedule(&self) -> String;

    /// Performs one run.
    ///
    /// `cancel` fires when the scheduler shuts down; long-running jobs should
    /// stop at the next convenient point.
    async fn run(
        &self,
        cancel: CancellationToken,
        k8s: &K8sClientSet,
        storage: &StorageClientSet,
    ) -> Result<ExecutionStats, JobError>;
}
