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

use crate::config::types::*;
use lens::action_task::{ClaimStrategy, DEFAULT_TASK_TIMEOUT_SECS};
use lens::jobs::InstanceMode;
use lens::workflow::builtin::DEFAULT_CHARTS_DIR;
use lens::workflow::{InstallScope, StorageMode, DEFAULT_NAMESPACE};
use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://lens.db";

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            mode: InstanceMode::Standalone,
            cluster_name: "local".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            pool_size: 10,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval_ms: 300,
            claim_strategy: ClaimStrategy::BestEffort,
            default_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            record_history: true,
            history_retention_days: 7,
            shutdown_timeout_secs: 30,
            metrics_listen: None,
        }
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            charts_dir: PathBuf::from(DEFAULT_CHARTS_DIR),
            kubeconfig: None,
            values_file: None,
            storage_mode: StorageMode::LensManaged,
            scope: InstallScope::Full,
            external_storage: None,
        }
    }
}
