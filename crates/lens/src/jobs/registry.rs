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

//! Mode-aware job registry.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Job;

/// Role this process plays in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceMode {
    /// Runs inside a workload cluster and executes that cluster's work.
    Data,
    /// Runs in the management cluster.
    Management,
    /// Single-cluster deployment running everything.
    #[default]
    Standalone,
}

impl InstanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceMode::Data => "data",
            InstanceMode::Management => "management",
            InstanceMode::Standalone => "standalone",
        }
    }
}

impl fmt::Display for InstanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "data" | "dataplane" => Ok(InstanceMode::Data),
            "management" | "controlplane" => Ok(InstanceMode::Management),
            "standalone" => Ok(InstanceMode::Standalone),
            other => Err(format!(
                "unknown instance mode '{}' (expected data, management or standalone)",
                other
            )),
        }
    }
}

/// Where a registered job is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobPlacement {
    DataPlane,
    ControlPlane,
    Everywhere,
}

impl JobPlacement {
    pub fn runs_in(&self, mode: InstanceMode) -> bool {
        match (self, mode) {
            (JobPlacement::Everywhere, _) | (_, InstanceMode::Standalone) => true,
            (JobPlacement::DataPlane, InstanceMode::Data) => true,
            (JobPlacement::ControlPlane, InstanceMode::Management) => true,
            _ => false,
        }
    }
}

struct Entry {
    placement: JobPlacement,
    job: Arc<dyn Job>,
}

/// Registry of every job the process knows about.
///
/// Built once at startup and queried by the scheduler; registering a second
/// job with an existing name replaces the first.
#[derive(Default)]
pub struct JobRegistry {
    entries: RwLock<Vec<Entry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, placement: JobPlacement, job: Arc<dyn Job>) {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter_mut().find(|e| e.job.name() == job.name()) {
            warn!(job = job.name(), "Replacing previously registered job");
            existing.placement = placement;
            existing.job = job;
        } else {
            debug!(job = job.name(), ?placement, "Registered job");
            entries.push(Entry { placement, job });
        }
    }

    /// Jobs to schedule for `mode`, in registration order.
    pub fn jobs_for(&self, mode: InstanceMode) -> Vec<Arc<dyn Job>> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.placement.runs_in(mode))
            .map(|e| Arc::clone(&e.job))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|e| e.job.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
