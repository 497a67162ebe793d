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

//! Built-in stages backed by a [`ReleaseClient`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::release::{ReleaseClient, ReleaseState};
use super::{RunOptions, Stage, StageState, StageStatus};
use crate::error::StageError;

/// Installs or upgrades one Helm release.
pub struct HelmReleaseStage {
    name: String,
    release: String,
    chart: PathBuf,
    values_file: Option<PathBuf>,
    once: bool,
    client: Arc<dyn ReleaseClient>,
}

impl HelmReleaseStage {
    pub fn new(
        name: impl Into<String>,
        release: impl Into<String>,
        chart: impl Into<PathBuf>,
        client: Arc<dyn ReleaseClient>,
    ) -> Self {
        Self {
            name: name.into(),
            release: release.into(),
            chart: chart.into(),
            values_file: None,
            once: false,
            client,
        }
    }

    /// Installs the release only if it does not exist yet. Used for charts
    /// that wrap one-shot jobs, where a finished or failed release must not
    /// be upgraded again.
    pub fn install_once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn with_values_file(mut self, values_file: Option<PathBuf>) -> Self {
        self.values_file = values_file;
        self
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn chart(&self) -> &PathBuf {
        &self.chart
    }
}

#[async_trait]
impl Stage for HelmReleaseStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: &CancellationToken, opts: &RunOptions) -> Result<(), StageError> {
        let state = self
            .client
            .release_status(cancel, opts, &self.release)
            .await?;

        if self.once && state != ReleaseState::Missing {
            info!(release = %self.release, state = ?state, "Release already created, skipping");
            return Ok(());
        }

        // A healthy release is left alone unless new values were supplied.
        if state == ReleaseState::Deployed && self.values_file.is_none() {
            info!(release = %self.release, "Release already deployed, skipping");
            return Ok(());
        }

        info!(
            release = %self.release,
            chart = %self.chart.display(),
            previous = ?state,
            "Installing release"
        );
        self.client
            .upgrade_install(
                cancel,
                opts,
                &self.release,
                &self.chart,
                self.values_file.as_deref(),
            )
            .await
    }

    async fn verify(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<StageStatus, StageError> {
        let state = self
            .client
            .release_status(cancel, opts, &self.release)
            .await?;

        let status = match &state {
            ReleaseState::Deployed => StageStatus::ready("release deployed"),
            ReleaseState::Pending(phase) => StageStatus::in_progress(format!("release {}", phase)),
            ReleaseState::Missing if opts.dry_run => StageStatus::pending("dry run, release not created"),
            ReleaseState::Missing => StageStatus::pending("release not installed"),
            ReleaseState::Failed => StageStatus::failed("release failed"),
            ReleaseState::Other(s) => StageStatus::unknown(format!("release status {}", s)),
        };
        Ok(status.with_detail("release", self.release.clone()))
    }

    async fn rollback(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<(), StageError> {
        info!(release = %self.release, dry_run = opts.dry_run, "Uninstalling release");
        self.client.uninstall(cancel, opts, &self.release).await
    }
}

/// One set of pods a [`WaitForPodsStage`] waits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodWait {
    /// Human name used in logs and status details.
    pub component: String,
    pub selector: String,
    pub timeout: Duration,
    /// An optional component that never becomes ready only logs a warning.
    pub required: bool,
}

impl PodWait {
    pub fn required(component: impl Into<String>, selector: impl Into<String>, timeout: Duration) -> Self {
        Self {
            component: component.into(),
            selector: selector.into(),
            timeout,
            required: true,
        }
    }

    pub fn optional(component: impl Into<String>, selector: impl Into<String>, timeout: Duration) -> Self {
        Self {
            required: false,
            ..Self::required(component, selector, timeout)
        }
    }
}

pub const DEFAULT_POD_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Polls pod readiness for one or more label selectors.
pub struct WaitForPodsStage {
    name: String,
    waits: Vec<PodWait>,
    poll_interval: Duration,
    client: Arc<dyn ReleaseClient>,
}

impl WaitForPodsStage {
    pub fn new(name: impl Into<String>, waits: Vec<PodWait>, client: Arc<dyn ReleaseClient>) -> Self {
        Self {
            name: name.into(),
            waits,
            poll_interval: DEFAULT_POD_POLL_INTERVAL,
            client,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn waits(&self) -> &[PodWait] {
        &self.waits
    }

    async fn wait_for(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        wait: &PodWait,
    ) -> Result<(), StageError> {
        let deadline = Instant::now() + wait.timeout;

        loop {
            match self.client.pod_readiness(cancel, opts, &wait.selector).await {
                Ok(readiness) if readiness.all_ready() => {
                    info!(component = %wait.component, pods = readiness.total, "Pods are ready");
                    return Ok(());
                }
                Ok(readiness) => debug!(
                    component = %wait.component,
                    ready = readiness.ready,
                    total = readiness.total,
                    "Waiting for pods"
                ),
                Err(StageError::Cancelled) => return Err(StageError::Cancelled),
                Err(e) => debug!(component = %wait.component, error = %e, "Readiness check failed, retrying"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StageError::Timeout {
                    what: format!("{} pods ({})", wait.component, wait.selector),
                    seconds: wait.timeout.as_secs(),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(StageError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval.min(deadline - now)) => {}
            }
        }
    }
}

#[async_trait]
impl Stage for WaitForPodsStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: &CancellationToken, opts: &RunOptions) -> Result<(), StageError> {
        if opts.dry_run {
            info!(stage = %self.name, "Dry run, not waiting for pods");
            return Ok(());
        }

        for wait in &self.waits {
            match self.wait_for(cancel, opts, wait).await {
                Ok(()) => {}
                Err(StageError::Cancelled) => return Err(StageError::Cancelled),
                Err(e) if !wait.required => {
                    warn!(component = %wait.component, error = %e, "Optional component not ready, continuing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn verify(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<StageStatus, StageError> {
        let mut state = StageState::Ready;
        let mut waiting = Vec::new();
        let mut details = Vec::new();

        for wait in &self.waits {
            let readiness = self.client.pod_readiness(cancel, opts, &wait.selector).await?;
            details.push((
                wait.component.clone(),
                format!("{}/{}", readiness.ready, readiness.total),
            ));

            if readiness.all_ready() || !wait.required {
                continue;
            }
            let component_state = if readiness.total == 0 {
                StageState::Pending
            } else {
                StageState::InProgress
            };
            if component_state.precedence() > state.precedence() {
                state = component_state;
            }
            waiting.push(format!(
                "{} {}/{} pods ready",
                wait.component, readiness.ready, readiness.total
            ));
        }

        let message = if waiting.is_empty() {
            "all required pods ready".to_string()
        } else {
            waiting.join(", ")
        };
        Ok(details
            .into_iter()
            .fold(StageStatus::new(state, message), |status, (k, v)| {
                status.with_detail(k, v)
            }))
    }

    async fn rollback(
        &self,
        _cancel: &CancellationToken,
        _opts: &RunOptions,
    ) -> Result<(), StageError> {
        Ok(())
    }
}
