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

//! Per-run execution statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Counters and timings produced by one [`crate::jobs::Job`] run.
///
/// A fresh value is created for every run and handed to the scheduler, which
/// folds it into metrics and the execution history before dropping it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub records_processed: u64,
    pub items_created: u64,
    pub items_updated: u64,
    pub items_deleted: u64,
    pub error_count: u64,
    pub query_duration: Duration,
    pub custom_metrics: BTreeMap<String, f64>,
    pub messages: Vec<String>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Sets a named metric, replacing any previous value.
    pub fn add_custom_metric(&mut self, name: impl Into<String>, value: f64) {
        self.custom_metrics.insert(name.into(), value);
    }

    /// Adds `delta` to a named metric, starting from zero.
    pub fn incr_custom_metric(&mut self, name: &str, delta: f64) {
        *self.custom_metrics.entry(name.to_string()).or_insert(0.0) += delta;
    }

    /// Counts an error and keeps its description.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_count += 1;
        self.messages.push(message.into());
    }

    pub fn add_query_duration(&mut self, elapsed: Duration) {
        self.query_duration += elapsed;
    }
}
