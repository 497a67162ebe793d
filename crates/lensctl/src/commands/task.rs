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

use anyhow::{anyhow, bail, Context, Result};
use lens::action_task::ExtMap;
use lens::{ActionTask, ActionTaskStatus, ActionTaskStore, NewActionTask, TaskFilter};
use serde_json::Value;

use super::open_dal;
use crate::cli::TaskCommands;
use crate::config::LensConfig;

/// Parses `--params`; only JSON objects are accepted.
pub fn parse_params(raw: &str) -> Result<ExtMap> {
    match serde_json::from_str::<Value>(raw).context("--params is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--params must be a JSON object, got {}", other),
    }
}

pub fn build_filter(
    cluster: Option<String>,
    status: Option<String>,
    limit: usize,
) -> Result<TaskFilter> {
    let mut filter = TaskFilter {
        cluster_name: cluster,
        ..TaskFilter::default()
    }
    .with_limit(limit);
    if let Some(status) = status {
        let status: ActionTaskStatus = status.parse().map_err(|e: String| anyhow!(e))?;
        filter = filter.with_status(status);
    }
    Ok(filter)
}

fn print_task(task: &ActionTask) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(task)?);
    Ok(())
}

pub async fn run_task_command(config: &LensConfig, command: TaskCommands) -> Result<()> {
    let store = open_dal(config).await?.action_tasks();

    match command {
        TaskCommands::Submit {
            cluster,
            action_type,
            target_type,
            target_id,
            node,
            params,
            timeout_secs,
        } => {
            let mut new_task = NewActionTask::new(cluster, action_type, target_type, target_id)
                .with_parameters(parse_params(&params)?)
                .with_timeout_seconds(timeout_secs.unwrap_or(config.executor.default_timeout_secs));
            if let Some(node) = node {
                new_task = new_task.with_target_node(node);
            }
            let task = store.create(new_task).await?;
            print_task(&task)?;
        }
        TaskCommands::Get { id } => {
            let task = store.get(id).await?;
            print_task(&task)?;
        }
        TaskCommands::List {
            cluster,
            status,
            limit,
        } => {
            let tasks = store.list(&build_filter(cluster, status, limit)?).await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
    }
    Ok(())
}
