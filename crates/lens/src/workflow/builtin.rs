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

//! The `dataplane`, `controlplane` and `standalone` product workflows.
//!
//! Each product is a fixed sequence of stages in two parts. The storage part
//! installs the operators and storage clusters, runs the one-shot init chart,
//! migrates the schema and publishes the storage secret. The release part
//! installs the product's own charts, each followed by a pod wait. When storage
//! is provided externally only the migration and the secret remain of the
//! storage part. [`InstallScope`] picks one part or both.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::base::BaseWorkflow;
use super::progress::ProgressReporter;
use super::release::ReleaseClient;
use super::stages::{HelmReleaseStage, PodWait, WaitForPodsStage};
use super::storage::{
    DatabaseMigrationStage, EmbeddedMigrator, ExternalStorage, SchemaMigrator, StorageSecretStage,
    StorageSource,
};
use super::{RunOptions, Stage, UninstallOptions, Workflow, WorkflowStatus, DEFAULT_NAMESPACE};
use crate::error::WorkflowError;

pub const DATAPLANE: &str = "dataplane";
pub const CONTROLPLANE: &str = "controlplane";
pub const STANDALONE: &str = "standalone";

pub const DEFAULT_CHARTS_DIR: &str = "charts";

const RELEASE_OPERATORS: &str = "primus-lens-operators";
const RELEASE_INFRASTRUCTURE: &str = "primus-lens-infrastructure";
const RELEASE_INIT: &str = "primus-lens-init";
const RELEASE_APPLICATIONS: &str = "primus-lens-apps";
const RELEASE_CONTROL_PLANE: &str = "primus-lens-control-plane";

const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Who provides the Postgres, OpenSearch and VictoriaMetrics backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Operators and storage clusters are installed alongside the product.
    #[default]
    LensManaged,
    /// Storage already exists; only the product releases are installed.
    External,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::LensManaged => "lens-managed",
            StorageMode::External => "external",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "lens-managed" | "managed" => Ok(StorageMode::LensManaged),
            "external" => Ok(StorageMode::External),
            other => Err(WorkflowError::InvalidConfig(format!(
                "unknown storage mode '{}'",
                other
            ))),
        }
    }
}

/// Which part of a product an install covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallScope {
    /// Storage backends followed by the product releases.
    #[default]
    Full,
    /// Only the storage backends, schema and storage secret.
    Infrastructure,
    /// Only the product releases, against storage that is already prepared.
    Apps,
}

impl InstallScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallScope::Full => "full",
            InstallScope::Infrastructure => "infrastructure",
            InstallScope::Apps => "apps",
        }
    }

    fn includes_storage(&self) -> bool {
        matches!(self, InstallScope::Full | InstallScope::Infrastructure)
    }

    fn includes_releases(&self) -> bool {
        matches!(self, InstallScope::Full | InstallScope::Apps)
    }
}

impl fmt::Display for InstallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallScope {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" | "all" => Ok(InstallScope::Full),
            "infrastructure" | "infra" => Ok(InstallScope::Infrastructure),
            "apps" | "applications" => Ok(InstallScope::Apps),
            other => Err(WorkflowError::InvalidConfig(format!(
                "unknown install scope '{}' (expected full, infrastructure or apps)",
                other
            ))),
        }
    }
}

/// Inputs shared by the built-in workflow factories.
#[derive(Clone)]
pub struct WorkflowConfig {
    pub namespace: String,
    pub charts_dir: PathBuf,
    /// Helm values applied to the product releases.
    pub values_file: Option<PathBuf>,
    pub storage_mode: StorageMode,
    pub scope: InstallScope,
    /// Required when `storage_mode` is external and the scope covers storage.
    pub external_storage: Option<ExternalStorage>,
    /// `None` applies the migrations embedded in this crate.
    pub migrator: Option<Arc<dyn SchemaMigrator>>,
    /// `None` logs progress through `tracing`.
    pub progress: Option<Arc<dyn ProgressReporter>>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            charts_dir: PathBuf::from(DEFAULT_CHARTS_DIR),
            values_file: None,
            storage_mode: StorageMode::default(),
            scope: InstallScope::default(),
            external_storage: None,
            migrator: None,
            progress: None,
        }
    }
}

impl fmt::Debug for WorkflowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowConfig")
            .field("namespace", &self.namespace)
            .field("charts_dir", &self.charts_dir)
            .field("values_file", &self.values_file)
            .field("storage_mode", &self.storage_mode)
            .field("scope", &self.scope)
            .field("external_storage", &self.external_storage)
            .field("migrator", &self.migrator.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl WorkflowConfig {
    /// Run options targeting this config's namespace.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            namespace: self.namespace.clone(),
            ..RunOptions::default()
        }
    }

    /// Rejects combinations no stage list can satisfy.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.storage_mode == StorageMode::External
            && self.scope.includes_storage()
            && self.external_storage.is_none()
        {
            return Err(WorkflowError::InvalidConfig(format!(
                "external storage mode with scope '{}' requires external storage settings",
                self.scope
            )));
        }
        Ok(())
    }
}

/// Finds a chart under `charts_dir`: an unpacked chart directory, else the
/// highest-sorting `<chart>-<version>.tgz` archive, else the bare path (left
/// for helm to report).
pub fn resolve_chart(charts_dir: &Path, chart: &str) -> PathBuf {
    let unpacked = charts_dir.join(chart);
    if unpacked.is_dir() {
        return unpacked;
    }

    let prefix = format!("{}-", chart);
    let archive = std::fs::read_dir(charts_dir).ok().and_then(|entries| {
        entries
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(&prefix) && name.ends_with(".tgz"))
            .max()
    });

    match archive {
        Some(name) => {
            debug!(chart, archive = %name, "Using packaged chart");
            charts_dir.join(name)
        }
        None => unpacked,
    }
}

fn instance_selector(release: &str) -> String {
    format!("{}={}", INSTANCE_LABEL, release)
}

/// The products built in to the installer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    DataPlane,
    ControlPlane,
    Standalone,
}

impl Product {
    pub fn name(&self) -> &'static str {
        match self {
            Product::DataPlane => DATAPLANE,
            Product::ControlPlane => CONTROLPLANE,
            Product::Standalone => STANDALONE,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Product::DataPlane => "Telemetry collection and cluster agents for a GPU cluster",
            Product::ControlPlane => "Management plane that dispatches work to data-plane clusters",
            Product::Standalone => "Data plane and control plane in a single cluster",
        }
    }

    fn includes_applications(&self) -> bool {
        matches!(self, Product::DataPlane | Product::Standalone)
    }

    fn includes_control_plane(&self) -> bool {
        matches!(self, Product::ControlPlane | Product::Standalone)
    }

    /// Builds the ordered stage list for this product.
    pub fn stages(
        &self,
        config: &WorkflowConfig,
        client: &Arc<dyn ReleaseClient>,
    ) -> Vec<Arc<dyn Stage>> {
        let mut stages = Vec::new();
        if config.scope.includes_storage() {
            stages.extend(storage_stages(config, client));
        }
        if config.scope.includes_releases() {
            stages.extend(self.release_stages(config, client));
        }
        stages
    }

    fn release_stages(
        &self,
        config: &WorkflowConfig,
        client: &Arc<dyn ReleaseClient>,
    ) -> Vec<Arc<dyn Stage>> {
        let chart = |name: &str| resolve_chart(&config.charts_dir, name);
        let mut stages: Vec<Arc<dyn Stage>> = Vec::new();

        if self.includes_applications() {
            stages.push(Arc::new(
                HelmReleaseStage::new(
                    "applications",
                    RELEASE_APPLICATIONS,
                    chart(RELEASE_APPLICATIONS),
                    Arc::clone(client),
                )
                .with_values_file(config.values_file.clone()),
            ));
            stages.push(Arc::new(WaitForPodsStage::new(
                "wait_applications",
                vec![PodWait::required(
                    "Applications",
                    instance_selector(RELEASE_APPLICATIONS),
                    minutes(5),
                )],
                Arc::clone(client),
            )));
        }

        if self.includes_control_plane() {
            stages.push(Arc::new(
                HelmReleaseStage::new(
                    "control_plane",
                    RELEASE_CONTROL_PLANE,
                    chart(RELEASE_CONTROL_PLANE),
                    Arc::clone(client),
                )
                .with_values_file(config.values_file.clone()),
            ));
            stages.push(Arc::new(WaitForPodsStage::new(
                "wait_control_plane",
                vec![PodWait::required(
                    "Control plane",
                    instance_selector(RELEASE_CONTROL_PLANE),
                    minutes(5),
                )],
                Arc::clone(client),
            )));
        }

        stages
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

/// Stages that prepare storage; shared by every product.
fn storage_stages(config: &WorkflowConfig, client: &Arc<dyn ReleaseClient>) -> Vec<Arc<dyn Stage>> {
    let chart = |name: &str| resolve_chart(&config.charts_dir, name);
    let mut stages: Vec<Arc<dyn Stage>> = Vec::new();

    if config.storage_mode == StorageMode::LensManaged {
        stages.push(Arc::new(HelmReleaseStage::new(
            "operators",
            RELEASE_OPERATORS,
            chart(RELEASE_OPERATORS),
            Arc::clone(client),
        )));
        stages.push(Arc::new(WaitForPodsStage::new(
            "wait_operators",
            vec![PodWait::required(
                "Operators",
                instance_selector(RELEASE_OPERATORS),
                minutes(5),
            )],
            Arc::clone(client),
        )));
        stages.push(Arc::new(HelmReleaseStage::new(
            "infrastructure",
            RELEASE_INFRASTRUCTURE,
            chart(RELEASE_INFRASTRUCTURE),
            Arc::clone(client),
        )));
        stages.push(Arc::new(WaitForPodsStage::new(
            "wait_infrastructure",
            vec![
                PodWait::required(
                    "Postgres",
                    "postgres-operator.crunchydata.com/cluster=primus-lens",
                    minutes(10),
                ),
                PodWait::optional(
                    "OpenSearch",
                    "opster.io/opensearch-cluster=primus-lens-logs",
                    minutes(10),
                ),
                PodWait::optional(
                    "VictoriaMetrics",
                    instance_selector("primus-lens-vmcluster"),
                    minutes(5),
                ),
            ],
            Arc::clone(client),
        )));
        stages.push(Arc::new(
            HelmReleaseStage::new("init", RELEASE_INIT, chart(RELEASE_INIT), Arc::clone(client))
                .install_once(),
        ));
    }

    let source = StorageSource {
        mode: config.storage_mode,
        external: config.external_storage.clone(),
        client: Arc::clone(client),
    };
    let migrator: Arc<dyn SchemaMigrator> = match &config.migrator {
        Some(migrator) => Arc::clone(migrator),
        None => Arc::new(EmbeddedMigrator),
    };
    stages.push(Arc::new(DatabaseMigrationStage::new(source.clone(), migrator)));
    stages.push(Arc::new(StorageSecretStage::new(source)));

    stages
}

/// A built-in product workflow.
pub struct ProductWorkflow {
    product: Product,
    base: BaseWorkflow,
    config: Mutex<WorkflowConfig>,
    client: Arc<dyn ReleaseClient>,
}

impl ProductWorkflow {
    pub fn new(product: Product, config: WorkflowConfig, client: Arc<dyn ReleaseClient>) -> Self {
        let mut base = BaseWorkflow::new(product.name(), product.stages(&config, &client))
            .with_description(product.description());
        if let Some(progress) = &config.progress {
            base = base.with_progress(Arc::clone(progress));
        }
        Self {
            product,
            base,
            config: Mutex::new(config),
            client,
        }
    }

    pub fn product(&self) -> Product {
        self.product
    }

    pub fn config(&self) -> WorkflowConfig {
        self.config.lock().clone()
    }
}

#[async_trait]
impl Workflow for ProductWorkflow {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn description(&self) -> &str {
        self.base.description()
    }

    fn stage_names(&self) -> Vec<String> {
        self.base.stage_names()
    }

    async fn install(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<(), WorkflowError> {
        self.base.install(cancel, opts).await
    }

    async fn uninstall(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        uninstall: &UninstallOptions,
    ) -> Result<(), WorkflowError> {
        self.base.uninstall(cancel, opts, uninstall).await
    }

    async fn status(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<WorkflowStatus, WorkflowError> {
        self.base.status(cancel, opts).await
    }

    fn set_values_file(&self, path: PathBuf) -> Result<(), WorkflowError> {
        let mut config = self.config.lock();
        let mut next = config.clone();
        next.values_file = Some(path);

        self.base
            .set_stages(self.product.stages(&next, &self.client))?;
        info!(workflow = self.product.name(), values = ?next.values_file, "Rebuilt stages with values file");
        *config = next;
        Ok(())
    }
}
