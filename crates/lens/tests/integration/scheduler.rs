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

use async_trait::async_trait;
use lens::{
    ExecutionHistoryStore, ExecutionStats, Job, JobError, JobScheduler, K8sClientSet,
    SchedulerConfig, StorageClientSet,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::fixtures::TestFixture;

/// Fires often but takes far longer than its interval to finish.
struct SlowJob {
    started: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    max_concurrent: Arc<AtomicUsize>,
}

#[async_trait]
impl Job for SlowJob {
    fn name(&self) -> &str {
        "slow"
    }

    fn schedule(&self) -> String {
        "@every 10ms".to_string()
    }

    async fn run(
        &self,
        cancel: CancellationToken,
        _k8s: &K8sClientSet,
        _storage: &StorageClientSet,
    ) -> Result<ExecutionStats, JobError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_millis(150)) => {}
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(ExecutionStats::new())
    }
}

#[tokio::test]
async fn test_overlapping_firings_are_skipped() {
    let job = SlowJob {
        started: Arc::new(AtomicUsize::new(0)),
        running: Arc::new(AtomicUsize::new(0)),
        max_concurrent: Arc::new(AtomicUsize::new(0)),
    };
    let started = Arc::clone(&job.started);
    let max_concurrent = Arc::clone(&job.max_concurrent);

    let scheduler = JobScheduler::new(
        SchedulerConfig::builder()
            .shutdown_timeout(Duration::from_secs(2))
            .build(),
        K8sClientSet::new("east"),
        StorageClientSet::in_memory(),
    );
    let handle = scheduler.start(vec![Arc::new(job)]);
    tokio::time::sleep(Duration::from_millis(400)).await;
    handle.shutdown().await;

    assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    let runs = started.load(Ordering::SeqCst);
    assert!((1..=4).contains(&runs), "unexpected run count {runs}");
}

struct QuickJob;

#[async_trait]
impl Job for QuickJob {
    fn name(&self) -> &str {
        "quick"
    }

    fn schedule(&self) -> String {
        "@every 20ms".to_string()
    }

    async fn run(
        &self,
        _cancel: CancellationToken,
        _k8s: &K8sClientSet,
        _storage: &StorageClientSet,
    ) -> Result<ExecutionStats, JobError> {
        let mut stats = ExecutionStats::new();
        stats.records_processed = 1;
        Ok(stats)
    }
}

#[tokio::test]
async fn test_history_is_persisted_to_sqlite() {
    let fixture = TestFixture::sqlite().await;
    let storage = fixture.storage();

    let scheduler = JobScheduler::new(
        SchedulerConfig::builder().record_history(true).build(),
        K8sClientSet::new("east"),
        storage.clone(),
    );
    let handle = scheduler.start(vec![Arc::new(QuickJob)]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown().await;

    let history = storage.history().recent("quick", 100).await.unwrap();
    assert!(!history.is_empty());
    assert!(history.iter().all(|r| r.success && r.job_name == "quick"));
    assert!(history.windows(2).all(|w| w[0].started_at >= w[1].started_at));
}
