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
use diesel::sql_types::{Integer, Text};
use diesel::{QueryableByName, RunQueryDsl};
use lens::database::connection::SQLITE_BUSY_TIMEOUT_MS;
use lens::{
    ActionTaskStatus, ActionTaskStore, BackendType, Database, NewActionTask, StoreError,
    TaskFilter, DAL,
};
use serde_json::json;

use crate::fixtures::TestFixture;

#[tokio::test]
async fn test_create_and_fetch_round_trip() {
    let fixture = TestFixture::sqlite().await;
    assert_eq!(fixture.dal.backend(), BackendType::Sqlite);
    let tasks = fixture.dal.action_tasks();

    let created = tasks
        .create(
            NewActionTask::new("east", "cluster_ping", "cluster", "east")
                .with_parameter("reason", json!("smoke test"))
                .with_timeout_seconds(120),
        )
        .await
        .unwrap();
    assert_eq!(created.status, ActionTaskStatus::Pending);

    let fetched = tasks.get(created.id).await.unwrap();
    assert_eq!(fetched.action_type, "cluster_ping");
    assert_eq!(fetched.timeout_seconds, 120);
    assert_eq!(fetched.parameter_str("reason"), Some("smoke test"));
    assert!(fetched.started_at.is_none());
}

#[tokio::test]
async fn test_missing_task_is_not_found() {
    let fixture = TestFixture::sqlite().await;
    let err = fixture.dal.action_tasks().get(9999).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn test_pending_tasks_are_oldest_first_per_cluster() {
    let fixture = TestFixture::sqlite().await;
    let tasks = fixture.dal.action_tasks();

    let first = tasks
        .create(NewActionTask::new("east", "a", "cluster", ""))
        .await
        .unwrap();
    tasks
        .create(NewActionTask::new("west", "b", "cluster", ""))
        .await
        .unwrap();
    let third = tasks
        .create(NewActionTask::new("east", "c", "cluster", ""))
        .await
        .unwrap();
    let fourth = tasks
        .create(NewActionTask::new("east", "d", "cluster", ""))
        .await
        .unwrap();

    let pending = tasks.get_pending_tasks("east", 2).await.unwrap();
    let ids: Vec<i64> = pending.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![first.id, third.id]);

    assert!(tasks.mark_running(first.id).await.unwrap());
    let pending = tasks.get_pending_tasks("east", 10).await.unwrap();
    let ids: Vec<i64> = pending.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![third.id, fourth.id]);
}

#[tokio::test]
async fn test_status_transitions_are_guarded() {
    let fixture = TestFixture::sqlite().await;
    let tasks = fixture.dal.action_tasks();
    let task = tasks
        .create(NewActionTask::new("east", "a", "cluster", ""))
        .await
        .unwrap();

    assert!(tasks.mark_running(task.id).await.unwrap());
    // A second claim loses.
    assert!(!tasks.mark_running(task.id).await.unwrap());

    let mut result = serde_json::Map::new();
    result.insert("ok".to_string(), json!(true));
    assert!(tasks.mark_completed(task.id, Some(result)).await.unwrap());

    // Terminal rows never move again.
    assert!(!tasks.mark_failed(task.id, "late failure").await.unwrap());
    assert!(!tasks.mark_timeout(task.id).await.unwrap());

    let done = tasks.get(task.id).await.unwrap();
    assert_eq!(done.status, ActionTaskStatus::Completed);
    assert!(done.error_message.is_none());
    assert!(done.completed_at.is_some());
    assert_eq!(done.result.and_then(|r| r.get("ok").cloned()), Some(json!(true)));
}

#[tokio::test]
async fn test_list_filters_and_retention_delete() {
    let fixture = TestFixture::sqlite().await;
    let tasks = fixture.dal.action_tasks();

    let failed = tasks
        .create(NewActionTask::new("east", "a", "cluster", ""))
        .await
        .unwrap();
    tasks.mark_failed(failed.id, "boom").await.unwrap();
    let pending = tasks
        .create(NewActionTask::new("east", "b", "cluster", ""))
        .await
        .unwrap();

    let only_failed = tasks
        .list(&TaskFilter::for_cluster("east").with_status(ActionTaskStatus::Failed))
        .await
        .unwrap();
    assert_eq!(only_failed.len(), 1);
    assert_eq!(only_failed[0].error_message.as_deref(), Some("boom"));

    let deleted = tasks
        .delete_finished_before(Utc::now() + ChronoDuration::seconds(60))
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let remaining = tasks.list(&TaskFilter::default()).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, pending.id);
}

#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer)]
    timeout: i32,
}

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}

#[tokio::test]
async fn test_pooled_sqlite_connections_wait_on_locks() {
    let fixture = TestFixture::sqlite().await;
    let conn = fixture.database.get_sqlite_connection().await.unwrap();

    let (timeout, mode) = conn
        .interact(|conn| {
            let timeout = diesel::sql_query("PRAGMA busy_timeout;").get_result::<BusyTimeout>(conn)?;
            let mode = diesel::sql_query("PRAGMA journal_mode;").get_result::<JournalMode>(conn)?;
            Ok::<_, diesel::result::Error>((timeout.timeout, mode.journal_mode))
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(timeout, SQLITE_BUSY_TIMEOUT_MS as i32);
    assert_eq!(mode.to_lowercase(), "wal");
}

#[tokio::test]
async fn test_second_process_can_reopen_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("shared.db").display());

    // The long-lived agent side.
    let agent = Database::new(&url, 1).unwrap();
    agent.run_migrations().await.unwrap();
    let agent_tasks = DAL::new(agent).action_tasks();

    // Short-lived CLI invocations open, migrate and write alongside it.
    for i in 0..20 {
        let cli = Database::new(&url, 1).unwrap();
        cli.run_migrations().await.unwrap();
        let cli_tasks = DAL::new(cli).action_tasks();

        let (from_agent, from_cli) = tokio::join!(
            agent_tasks.create(NewActionTask::new("east", "agent", "cluster", i.to_string())),
            cli_tasks.create(NewActionTask::new("east", "cli", "cluster", i.to_string())),
        );
        from_agent.unwrap();
        from_cli.unwrap();
    }

    let all = agent_tasks.list(&TaskFilter::default()).await.unwrap();
    assert_eq!(all.len(), 40);
}
