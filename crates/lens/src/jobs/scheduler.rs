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

//! Job scheduler.
//!
//! Each job gets its own timer loop. When a firing comes due while the previous
//! run of the same job is still in flight, the firing is skipped rather than
//! queued, so a job never overlaps itself; different jobs never block each
//! other. Every run is spawned as its own task and wrapped by
//! [`JobScheduler::run_job_with_metrics`].

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::history::ExecutionResult;
use super::metrics;
use super::schedule::Schedule;
use super::Job;
use crate::clients::{K8sClientSet, StorageClientSet};

/// Configuration for the [`JobScheduler`].
///
/// ```rust,ignore
/// let config = SchedulerConfig::builder()
///     .record_history(false)
///     .shutdown_timeout(Duration::from_secs(5))
///     .build();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SchedulerConfig {
    record_history: bool,
    shutdown_timeout: Duration,
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }

    /// Whether each run is written to the execution history store.
    pub fn record_history(&self) -> bool {
        self.record_history
    }

    /// How long [`SchedulerHandle::shutdown`] waits for in-flight runs.
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfigBuilder::default().build()
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self {
            config: SchedulerConfig {
                record_history: true,
                shutdown_timeout: Duration::from_secs(30),
            },
        }
    }
}

impl SchedulerConfigBuilder {
    pub fn record_history(mut self, value: bool) -> Self {
        self.config.record_history = value;
        self
    }

    pub fn shutdown_timeout(mut self, value: Duration) -> Self {
        self.config.shutdown_timeout = value;
        self
    }

    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

/// Clears the in-flight flag when a run ends, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Harness {
    config: SchedulerConfig,
    k8s: K8sClientSet,
    storage: StorageClientSet,
}

impl Harness {
    async fn run_job_with_metrics(&self, job: &dyn Job, cancel: CancellationToken) -> ExecutionResult {
        let name = job.name().to_string();
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        metrics::record_started(&name);
        debug!(job = %name, %run_id, "Job run starting");

        let outcome = job.run(cancel, &self.k8s, &self.storage).await;
        let elapsed = start.elapsed();
        metrics::record_finished(&name, elapsed, Utc::now().timestamp_millis() as f64 / 1000.0);

        let result = match outcome {
            Ok(stats) => {
                debug!(
                    job = %name,
                    %run_id,
                    duration_ms = elapsed.as_millis() as u64,
                    records = stats.records_processed,
                    errors = stats.error_count,
                    "Job run finished"
                );
                ExecutionResult::succeeded(&name, stats, started_at, elapsed)
            }
            Err(e) => {
                metrics::record_failure(&name);
                error!(job = %name, %run_id, error = %e, "Job run failed");
                ExecutionResult::failed(&name, e.to_string(), None, started_at, elapsed)
            }
        };

        if self.config.record_history {
            if let Err(e) = self.storage.history().record(&result).await {
                warn!(job = %name, %run_id, error = %e, "Failed to record job execution history");
            }
        }

        result
    }
}

/// Fires registered jobs on their schedules.
pub struct JobScheduler {
    harness: Arc<Harness>,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig, k8s: K8sClientSet, storage: StorageClientSet) -> Self {
        Self {
            harness: Arc::new(Harness {
                config,
                k8s,
                storage,
            }),
        }
    }

    /// Runs `job` once with timing, metrics and history recording.
    ///
    /// Errors from the job are captured in the returned result; history write
    /// failures are logged and otherwise ignored.
    pub async fn run_job_with_metrics(
        &self,
        job: &dyn Job,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        self.harness.run_job_with_metrics(job, cancel).await
    }

    /// Starts one timer loop per job and returns a handle for shutdown.
    ///
    /// Jobs whose schedule does not parse are logged and left out; the rest
    /// start normally. Must be called from within a Tokio runtime.
    pub fn start(self, jobs: Vec<Arc<dyn Job>>) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let mut scheduled = Vec::with_capacity(jobs.len());

        for job in jobs {
            let expr = job.schedule();
            let schedule = match Schedule::parse(&expr) {
                Ok(schedule) => schedule,
                Err(e) => {
                    error!(job = job.name(), schedule = %expr, error = %e, "Invalid job schedule; job not started");
                    continue;
                }
            };

            info!(job = job.name(), schedule = %schedule, "Scheduling job");
            scheduled.push(job.name().to_string());

            tracker.spawn(job_loop(
                Arc::clone(&self.harness),
                job,
                schedule,
                cancel.clone(),
                tracker.clone(),
            ));
        }

        SchedulerHandle {
            cancel,
            tracker,
            scheduled,
            shutdown_timeout: self.harness.config.shutdown_timeout,
        }
    }
}

async fn job_loop(
    harness: Arc<Harness>,
    job: Arc<dyn Job>,
    schedule: Schedule,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    let running = Arc::new(AtomicBool::new(false));

    loop {
        let delay = match schedule.next_delay(Utc::now()) {
            Ok(delay) => delay,
            Err(e) => {
                error!(job = job.name(), error = %e, "Job has no further firings; stopping its loop");
                return;
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        if running.swap(true, Ordering::AcqRel) {
            debug!(job = job.name(), "Previous run still in flight; skipping firing");
            metrics::record_skipped(job.name());
            continue;
        }

        let guard = RunningGuard(Arc::clone(&running));
        let harness = Arc::clone(&harness);
        let job = Arc::clone(&job);
        let run_cancel = cancel.child_token();
        tracker.spawn(async move {
            let _guard = guard;
            harness.run_job_with_metrics(job.as_ref(), run_cancel).await;
        });
    }

    debug!(job = job.name(), "Job loop stopped");
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    tracker: TaskTracker,
    scheduled: Vec<String>,
    shutdown_timeout: Duration,
}

impl SchedulerHandle {
    /// Names of the jobs that were started.
    pub fn scheduled_jobs(&self) -> &[String] {
        &self.scheduled
    }

    /// Token cancelled on shutdown; runs receive child tokens of it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops all timer loops, signals in-flight runs and waits for them up to
    /// the configured shutdown timeout.
    pub async fn shutdown(self) {
        info!("Stopping job scheduler");
        self.cancel.cancel();
        self.tracker.close();
        if tokio::time::timeout(self.shutdown_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Timed out waiting for in-flight job runs"
            );
        }
    }
}
