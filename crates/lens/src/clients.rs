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

//! Client handles passed into every job run.
//!
//! Jobs and action handlers never construct their own connections; the
//! scheduler hands them a [`K8sClientSet`] describing the cluster this process
//! is responsible for and a [`StorageClientSet`] bundling the persistence
//! facades.

use std::path::PathBuf;
use std::sync::Arc;

use crate::dal::DAL;
use crate::store::memory::{MemoryActionTaskStore, MemoryHistoryStore};
use crate::store::{ActionTaskStore, ExecutionHistoryStore};

/// Identifies the Kubernetes cluster this process acts on.
#[derive(Debug, Clone, Default)]
pub struct K8sClientSet {
    cluster_name: String,
    kubeconfig: Option<PathBuf>,
    namespace: String,
}

impl K8sClientSet {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            kubeconfig: None,
            namespace: "primus-lens".to_string(),
        }
    }

    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Kubeconfig path; `None` means in-cluster credentials.
    pub fn kubeconfig(&self) -> Option<&std::path::Path> {
        self.kubeconfig.as_deref()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Persistence facades shared by all jobs.
#[derive(Clone)]
pub struct StorageClientSet {
    action_tasks: Arc<dyn ActionTaskStore>,
    history: Arc<dyn ExecutionHistoryStore>,
}

impl StorageClientSet {
    pub fn new(
        action_tasks: Arc<dyn ActionTaskStore>,
        history: Arc<dyn ExecutionHistoryStore>,
    ) -> Self {
        Self {
            action_tasks,
            history,
        }
    }

    /// Builds the client set on top of a database-backed DAL.
    pub fn from_dal(dal: &DAL) -> Self {
        Self {
            action_tasks: Arc::new(dal.action_tasks()),
            history: Arc::new(dal.execution_history()),
        }
    }

    /// Builds a process-local client set with no external database.
    pub fn in_memory() -> Self {
        Self {
            action_tasks: Arc::new(MemoryActionTaskStore::new()),
            history: Arc::new(MemoryHistoryStore::new()),
        }
    }

    pub fn action_tasks(&self) -> &Arc<dyn ActionTaskStore> {
        &self.action_tasks
    }

    pub fn history(&self) -> &Arc<dyn ExecutionHistoryStore> {
        &self.history
    }
}

impl std::fmt::Debug for StorageClientSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClientSet").finish_non_exhaustive()
    }
}
