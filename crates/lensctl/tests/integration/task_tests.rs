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

use lens::{ActionTaskStatus, ActionTaskStore, TaskFilter};
use lensctl::cli::TaskCommands;
use lensctl::commands::open_dal;
use lensctl::{run_task_command, LensConfig};
use tempfile::TempDir;

fn sqlite_config(dir: &TempDir) -> LensConfig {
    let mut config = LensConfig::default();
    config.database.url = format!("sqlite://{}", dir.path().join("lens.db").display());
    config
}

#[tokio::test]
async fn test_submit_then_list() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);

    run_task_command(
        &config,
        TaskCommands::Submit {
            cluster: "east".to_string(),
            action_type: "cluster_ping".to_string(),
            target_type: "node".to_string(),
            target_id: "gpu-01".to_string(),
            node: Some("gpu-01".to_string()),
            params: r#"{"reason": "smoke"}"#.to_string(),
            timeout_secs: None,
        },
    )
    .await
    .unwrap();

    let tasks = open_dal(&config)
        .await
        .unwrap()
        .action_tasks()
        .list(&TaskFilter::for_cluster("east"))
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, ActionTaskStatus::Pending);
    assert_eq!(tasks[0].target_node.as_deref(), Some("gpu-01"));
    assert_eq!(tasks[0].parameter_str("reason"), Some("smoke"));
    assert_eq!(tasks[0].timeout_seconds, config.executor.default_timeout_secs);

    run_task_command(
        &config,
        TaskCommands::List {
            cluster: Some("east".to_string()),
            status: Some("pending".to_string()),
            limit: 10,
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_submit_rejects_non_object_params() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);

    let err = run_task_command(
        &config,
        TaskCommands::Submit {
            cluster: "east".to_string(),
            action_type: "cluster_ping".to_string(),
            target_type: "cluster".to_string(),
            target_id: String::new(),
            node: None,
            params: "[1, 2, 3]".to_string(),
            timeout_secs: Some(60),
        },
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("must be a JSON object"));
}

#[tokio::test]
async fn test_get_missing_task_fails() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);

    let result = run_task_command(&config, TaskCommands::Get { id: 42 }).await;
    assert!(result.is_err());
}
