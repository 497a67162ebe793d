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

//! Action handlers and their registry.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ActionTask;
use crate::clients::K8sClientSet;

/// Executes one kind of action task.
///
/// The returned value becomes the task's `result`. It must be a JSON object
/// (or `null` for no result); anything else fails the task.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        cancel: CancellationToken,
        task: &ActionTask,
        k8s: &K8sClientSet,
    ) -> anyhow::Result<serde_json::Value>;
}

/// Plain async functions and closures can be registered directly.
#[async_trait]
impl<F, Fut> ActionHandler for F
where
    F: Fn(CancellationToken, ActionTask, K8sClientSet) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    async fn handle(
        &self,
        cancel: CancellationToken,
        task: &ActionTask,
        k8s: &K8sClientSet,
    ) -> anyhow::Result<serde_json::Value> {
        (self)(cancel, task.clone(), k8s.clone()).await
    }
}

/// Action type → handler map.
///
/// Registration normally happens once at startup while lookups happen on every
/// poll, hence the read-write lock. Registering an action type twice keeps the
/// last handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&self, action_type: impl Into<String>, handler: H)
    where
        H: ActionHandler + 'static,
    {
        self.register_arc(action_type, Arc::new(handler));
    }

    pub fn register_arc(&self, action_type: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        let action_type = action_type.into();
        let previous = self.handlers.write().insert(action_type.clone(), handler);
        if previous.is_some() {
            warn!(action_type = %action_type, "Replaced existing action handler");
        } else {
            debug!(action_type = %action_type, "Registered action handler");
        }
    }

    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.read().get(action_type).cloned()
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.handlers.read().contains_key(action_type)
    }

    /// Registered action types, sorted.
    pub fn action_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("action_types", &self.action_types())
            .finish()
    }
}
