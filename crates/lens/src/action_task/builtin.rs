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

//! Handlers every agent registers.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::handler::{ActionHandler, HandlerRegistry};
use super::ActionTask;
use crate::clients::K8sClientSet;

pub const CLUSTER_PING: &str = "cluster_ping";

/// Answers liveness probes from the management plane.
///
/// Completing a `cluster_ping` task proves that the agent for the target
/// cluster is up and polling the shared table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterPingHandler;

#[async_trait]
impl ActionHandler for ClusterPingHandler {
    async fn handle(
        &self,
        _cancel: CancellationToken,
        task: &ActionTask,
        k8s: &K8sClientSet,
    ) -> anyhow::Result<serde_json::Value> {
        Ok(json!({
            "cluster": k8s.cluster_name(),
            "node": task.target_node,
            "target": format!("{}/{}", task.target_type, task.target_id),
            "received_at": Utc::now().to_rfc3339(),
        }))
    }
}

/// Installs the built-in handlers into `registry`.
pub fn register_builtin_handlers(registry: &HandlerRegistry) {
    registry.register(CLUSTER_PING, ClusterPingHandler);
}
