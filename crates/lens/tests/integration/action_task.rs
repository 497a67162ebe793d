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

use chrono::{Duration as ChronoDuration, Utc};
use lens::action_task::ExtMap;
use lens::store::memory::{MemoryActionTaskStore, MemoryHistoryStore};
use lens::{
    ActionTask, ActionTaskExecutor, ActionTaskExecutorConfig, ActionTaskStatus, ActionTaskStore,
    Job, K8sClientSet, NewActionTask, StorageClientSet, TaskFilter,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::fixtures::TestFixture;

fn executor_for(cluster: &str, calls: &Arc<AtomicUsize>) -> ActionTaskExecutor {
    let executor = ActionTaskExecutor::new(
        ActionTaskExecutorConfig::builder()
            .cluster_name(cluster)
            .batch_size(10)
            .build(),
    );
    let calls = Arc::clone(calls);
    executor.register_handler(
        "restart_pod",
        move |_cancel: CancellationToken, task: ActionTask, _k8s: K8sClientSet| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<Value, anyhow::Error>(json!({ "restarted": task.target_id }))
            }
        },
    );
    executor
}

fn memory_storage() -> (Arc<MemoryActionTaskStore>, StorageClientSet) {
    let tasks = Arc::new(MemoryActionTaskStore::new());
    let storage = StorageClientSet::new(tasks.clone(), Arc::new(MemoryHistoryStore::new()));
    (tasks, storage)
}

fn stale_task(cluster: &str, action_type: &str, age_secs: i64, timeout_secs: i64) -> ActionTask {
    let created_at = Utc::now() - ChronoDuration::seconds(age_secs);
    ActionTask {
        id: 0,
        action_type: action_type.to_string(),
        target_type: "pod".to_string(),
        target_id: "web-0".to_string(),
        target_node: None,
        cluster_name: cluster.to_string(),
        parameters: ExtMap::new(),
        status: ActionTaskStatus::Pending,
        result: None,
        error_message: None,
        timeout_seconds: timeout_secs,
        created_at,
        started_at: None,
        completed_at: None,
        updated_at: created_at,
    }
}

#[tokio::test]
async fn test_expired_task_times_out_without_running_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let executor = executor_for("east", &calls);
    let (tasks, storage) = memory_storage();
    let stale = tasks.insert_raw(stale_task("east", "restart_pod", 3600, 60));

    let stats = executor
        .run(CancellationToken::new(), &K8sClientSet::new("east"), &storage)
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let task = tasks.get(stale.id).await.unwrap();
    assert_eq!(task.status, ActionTaskStatus::Timeout);
    assert!(task.completed_at.is_some());
    assert_eq!(stats.error_count, 1);
}

#[tokio::test]
async fn test_unknown_action_type_fails_task() {
    let calls = Arc::new(AtomicUsize::new(0));
    let executor = executor_for("east", &calls);
    let (tasks, storage) = memory_storage();
    let task = tasks
        .create(NewActionTask::new("east", "foo", "cluster", ""))
        .await
        .unwrap();

    executor
        .run(CancellationToken::new(), &K8sClientSet::new("east"), &storage)
        .await
        .unwrap();

    let task = tasks.get(task.id).await.unwrap();
    assert_eq!(task.status, ActionTaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some("unknown action type: foo"));
}

#[tokio::test]
async fn test_mixed_batch_completes_known_and_fails_unknown() {
    let calls = Arc::new(AtomicUsize::new(0));
    let executor = executor_for("east", &calls);
    let (tasks, storage) = memory_storage();
    tasks
        .create(NewActionTask::new("east", "restart_pod", "pod", "web-0"))
        .await
        .unwrap();
    tasks
        .create(NewActionTask::new("east", "foo", "cluster", ""))
        .await
        .unwrap();
    tasks
        .create(NewActionTask::new("east", "foo", "cluster", ""))
        .await
        .unwrap();
    // Another cluster's work is never picked up.
    let west = tasks
        .create(NewActionTask::new("west", "restart_pod", "pod", "api-0"))
        .await
        .unwrap();

    let stats = executor
        .run(CancellationToken::new(), &K8sClientSet::new("east"), &storage)
        .await
        .unwrap();

    assert_eq!(stats.records_processed, 3);
    assert_eq!(stats.error_count, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let completed = tasks
        .list(&TaskFilter::for_cluster("east").with_status(ActionTaskStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(
        completed[0].result.as_ref().and_then(|r| r.get("restarted")),
        Some(&json!("web-0"))
    );

    let failed = tasks
        .list(&TaskFilter::for_cluster("east").with_status(ActionTaskStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 2);

    assert_eq!(
        tasks.get(west.id).await.unwrap().status,
        ActionTaskStatus::Pending
    );
}

#[tokio::test]
async fn test_cancelled_run_leaves_tasks_pending() {
    let calls = Arc::new(AtomicUsize::new(0));
    let executor = executor_for("east", &calls);
    let (tasks, storage) = memory_storage();
    let task = tasks
        .create(NewActionTask::new("east", "restart_pod", "pod", "web-0"))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let stats = executor
        .run(cancel, &K8sClientSet::new("east"), &storage)
        .await
        .unwrap();

    assert_eq!(stats.records_processed, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        tasks.get(task.id).await.unwrap().status,
        ActionTaskStatus::Pending
    );
}

#[tokio::test]
async fn test_handler_result_must_be_an_object() {
    let executor = ActionTaskExecutor::new(
        ActionTaskExecutorConfig::builder().cluster_name("east").build(),
    );
    executor.register_handler(
        "count_nodes",
        |_cancel: CancellationToken, _task: ActionTask, _k8s: K8sClientSet| async move {
            Ok::<Value, anyhow::Error>(json!(42))
        },
    );
    let (tasks, storage) = memory_storage();
    let task = tasks
        .create(NewActionTask::new("east", "count_nodes", "cluster", ""))
        .await
        .unwrap();

    executor
        .run(CancellationToken::new(), &K8sClientSet::new("east"), &storage)
        .await
        .unwrap();

    let task = tasks.get(task.id).await.unwrap();
    assert_eq!(task.status, ActionTaskStatus::Failed);
    assert!(task
        .error_message
        .unwrap_or_default()
        .contains("failed to marshal result"));
}

#[tokio::test]
async fn test_executor_against_sqlite_store() {
    let fixture = TestFixture::sqlite().await;
    let storage = fixture.storage();
    let calls = Arc::new(AtomicUsize::new(0));
    let executor = executor_for("east", &calls);

    let ok = storage
        .action_tasks()
        .create(
            NewActionTask::new("east", "restart_pod", "pod", "web-0")
                .with_target_node("gpu-01")
                .with_parameter("grace_period", json!(30)),
        )
        .await
        .unwrap();
    let unknown = storage
        .action_tasks()
        .create(NewActionTask::new("east", "foo", "cluster", ""))
        .await
        .unwrap();

    let stats = executor
        .run(CancellationToken::new(), &K8sClientSet::new("east"), &storage)
        .await
        .unwrap();
    assert_eq!(stats.records_processed, 2);

    let ok = storage.action_tasks().get(ok.id).await.unwrap();
    assert_eq!(ok.status, ActionTaskStatus::Completed);
    assert_eq!(ok.target_node.as_deref(), Some("gpu-01"));
    assert!(ok.started_at.is_some());

    let unknown = storage.action_tasks().get(unknown.id).await.unwrap();
    assert_eq!(unknown.status, ActionTaskStatus::Failed);
    assert_eq!(
        unknown.error_message.as_deref(),
        Some("unknown action type: foo")
    );
}
