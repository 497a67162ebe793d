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

//! Name to workflow factory lookup.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::builtin::{Product, ProductWorkflow, WorkflowConfig};
use super::release::ReleaseClient;
use super::Workflow;
use crate::error::{RegistryError, WorkflowError};

/// Builds a fresh workflow instance from a config.
pub type WorkflowFactory =
    Arc<dyn Fn(&WorkflowConfig) -> Result<Arc<dyn Workflow>, WorkflowError> + Send + Sync>;

/// Registry of workflow factories keyed by name.
///
/// Every [`WorkflowRegistry::new_workflow`] call constructs a new instance, so
/// stage lists are never shared between runs.
#[derive(Default)]
pub struct WorkflowRegistry {
    factories: RwLock<BTreeMap<String, WorkflowFactory>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `dataplane`, `controlplane` and `standalone`
    /// products, all driven through `client`.
    pub fn with_builtin(client: Arc<dyn ReleaseClient>) -> Self {
        let registry = Self::new();
        for product in [Product::DataPlane, Product::ControlPlane, Product::Standalone] {
            let client = Arc::clone(&client);
            registry.register(
                product.name(),
                Arc::new(
                    move |config: &WorkflowConfig| -> Result<Arc<dyn Workflow>, WorkflowError> {
                        config.validate()?;
                        Ok(Arc::new(ProductWorkflow::new(
                            product,
                            config.clone(),
                            Arc::clone(&client),
                        )))
                    },
                ),
            );
        }
        registry
    }

    /// Registers a factory, replacing any previous one with the same name.
    pub fn register(&self, name: impl Into<String>, factory: WorkflowFactory) {
        let name = name.into();
        if self.factories.write().insert(name.clone(), factory).is_some() {
            warn!(workflow = %name, "Replacing previously registered workflow");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }

    pub fn new_workflow(
        &self,
        name: &str,
        config: &WorkflowConfig,
    ) -> Result<Arc<dyn Workflow>, RegistryError> {
        let factory = self
            .factories
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownWorkflow {
                name: name.to_string(),
            })?;

        factory(config).map_err(|source| RegistryError::Construction {
            name: name.to_string(),
            source,
        })
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &self.names())
            .finish()
    }
}
