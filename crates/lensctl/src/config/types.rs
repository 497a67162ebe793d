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

use lens::action_task::ClaimStrategy;
use lens::jobs::InstanceMode;
use lens::workflow::{ExternalStorage, InstallScope, StorageMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level `lens.toml` contents. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub instance: InstanceConfig,
    pub database: DatabaseConfig,
    pub executor: ExecutorConfig,
    pub scheduler: SchedulerSection,
    pub installer: InstallerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub mode: InstanceMode,
    /// Cluster served by this agent; required unless running standalone.
    pub cluster_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub claim_strategy: ClaimStrategy,
    /// Timeout given to tasks submitted without one.
    pub default_timeout_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub record_history: bool,
    pub history_retention_days: u64,
    pub shutdown_timeout_secs: u64,
    /// `host:port` for the Prometheus exporter; unset disables it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_listen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub namespace: String,
    pub charts_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values_file: Option<PathBuf>,
    pub storage_mode: StorageMode,
    pub scope: InstallScope,
    /// Connection details used when `storage_mode` is external.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_storage: Option<ExternalStorage>,
}
