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

//! Metric names and recording helpers for the job harness.
//!
//! Everything goes through the `metrics` facade; without an installed
//! recorder the calls are no-ops.

use std::time::Duration;

pub const JOB_EXECUTIONS_TOTAL: &str = "lens_job_executions_total";
pub const JOB_FAILURES_TOTAL: &str = "lens_job_failures_total";
pub const JOB_SKIPPED_TOTAL: &str = "lens_job_skipped_total";
pub const JOB_DURATION_SECONDS: &str = "lens_job_duration_seconds";
pub const JOB_LAST_EXECUTION_TIMESTAMP: &str = "lens_job_last_execution_timestamp_seconds";
pub const ACTION_TASKS_TOTAL: &str = "lens_action_tasks_total";

/// Registers descriptions with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(JOB_EXECUTIONS_TOTAL, "Number of job runs started");
    metrics::describe_counter!(JOB_FAILURES_TOTAL, "Number of job runs that returned an error");
    metrics::describe_counter!(
        JOB_SKIPPED_TOTAL,
        "Number of firings skipped because the previous run was still in flight"
    );
    metrics::describe_histogram!(
        JOB_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Wall-clock duration of job runs"
    );
    metrics::describe_gauge!(
        JOB_LAST_EXECUTION_TIMESTAMP,
        metrics::Unit::Seconds,
        "Unix timestamp of the most recent job run"
    );
    metrics::describe_counter!(ACTION_TASKS_TOTAL, "Action tasks processed, by outcome");
}

pub(crate) fn record_started(job: &str) {
    metrics::counter!(JOB_EXECUTIONS_TOTAL, "job" => job.to_string()).increment(1);
}

pub(crate) fn record_finished(job: &str, elapsed: Duration, finished_at_unix: f64) {
    metrics::histogram!(JOB_DURATION_SECONDS, "job" => job.to_string())
        .record(elapsed.as_secs_f64());
    metrics::gauge!(JOB_LAST_EXECUTION_TIMESTAMP, "job" => job.to_string()).set(finished_at_unix);
}

pub(crate) fn record_failure(job: &str) {
    metrics::counter!(JOB_FAILURES_TOTAL, "job" => job.to_string()).increment(1);
}

pub(crate) fn record_skipped(job: &str) {
    metrics::counter!(JOB_SKIPPED_TOTAL, "job" => job.to_string()).increment(1);
}

pub(crate) fn record_action_task(action_type: &str, status: &'static str) {
    metrics::counter!(
        ACTION_TASKS_TOTAL,
        "action_type" => action_type.to_string(),
        "status" => status
    )
    .increment(1);
}
