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

use lens::workflow::{ProgressReporter, StageState, StageStatus};
use lens::StageError;

/// Prints stage progress to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProgress {
    pub quiet: bool,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressReporter for ConsoleProgress {
    fn stage_started(&self, index: usize, total: usize, stage: &str) {
        if !self.quiet {
            println!("[{}/{}] Running stage: {}", index, total, stage);
        }
    }

    fn stage_verified(&self, _index: usize, _total: usize, stage: &str, status: &StageStatus) {
        if self.quiet {
            return;
        }
        if status.state != StageState::Ready {
            println!("      {} is {}: {}", stage, status.state, status.message);
        }
    }

    fn rollback_started(&self, index: usize, total: usize, stage: &str) {
        if !self.quiet {
            println!("[{}/{}] Rolling back stage: {}", index, total, stage);
        }
    }

    fn rollback_skipped(&self, stage: &str, error: &StageError) {
        eprintln!("warning: rollback of {} failed, continuing: {}", stage, error);
    }
}
