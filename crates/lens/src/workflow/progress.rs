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

//! Stage progress reporting.

use tracing::{info, warn};

use super::StageStatus;
use crate::error::StageError;

/// Receives per-stage events from a running workflow.
///
/// Indices are 1-based so they can be shown as `[i/N]` directly.
pub trait ProgressReporter: Send + Sync {
    fn stage_started(&self, index: usize, total: usize, stage: &str);

    fn stage_verified(&self, index: usize, total: usize, stage: &str, status: &StageStatus) {
        let _ = (index, total, stage, status);
    }

    fn rollback_started(&self, index: usize, total: usize, stage: &str) {
        let _ = (index, total, stage);
    }

    /// A rollback failed but uninstall continues because of `force`.
    fn rollback_skipped(&self, stage: &str, error: &StageError) {
        let _ = (stage, error);
    }
}

/// Default reporter that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn stage_started(&self, index: usize, total: usize, stage: &str) {
        info!("[{}/{}] Running stage: {}", index, total, stage);
    }

    fn stage_verified(&self, index: usize, total: usize, stage: &str, status: &StageStatus) {
        info!(
            state = %status.state,
            "[{}/{}] Stage {} verified: {}",
            index,
            total,
            stage,
            status.message
        );
    }

    fn rollback_started(&self, index: usize, total: usize, stage: &str) {
        info!("[{}/{}] Rolling back stage: {}", index, total, stage);
    }

    fn rollback_skipped(&self, stage: &str, error: &StageError) {
        warn!(stage, error = %error, "Rollback failed; continuing because of --force");
    }
}
