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

use anyhow::{anyhow, Context, Result};
use lens::action_task::builtin::register_builtin_handlers;
use lens::jobs::metrics::describe_metrics;
use lens::{
    ActionTaskExecutor, ActionTaskExecutorConfig, InstanceMode, JobPlacement, JobRegistry,
    JobScheduler, K8sClientSet, RetentionJob, SchedulerConfig, StorageClientSet,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::open_dal;
use crate::config::LensConfig;

/// Builds the job registry for an agent from its configuration.
pub fn build_job_registry(config: &LensConfig, cluster_name: &str) -> JobRegistry {
    let executor_config = ActionTaskExecutorConfig::builder()
        .cluster_name(cluster_name)
        .batch_size(config.executor.batch_size)
        .poll_interval(Duration::from_millis(config.executor.poll_interval_ms))
        .claim_strategy(config.executor.claim_strategy)
        .build();
    let executor = ActionTaskExecutor::new(executor_config);
    register_builtin_handlers(executor.handlers());

    let retention = Duration::from_secs(config.scheduler.history_retention_days * 24 * 3600);

    let registry = JobRegistry::new();
    registry.register(JobPlacement::DataPlane, Arc::new(executor));
    registry.register(JobPlacement::Everywhere, Arc::new(RetentionJob::new(retention)));
    registry
}

fn install_metrics_exporter(listen: &str) -> Result<()> {
    let address: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid metrics listen address '{}'", listen))?;
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("failed to start Prometheus exporter")?;
    describe_metrics();
    info!(%address, "Prometheus exporter listening");
    Ok(())
}

/// Runs the agent until Ctrl-C.
pub async fn run_agent(
    config: &LensConfig,
    mode: Option<String>,
    cluster: Option<String>,
) -> Result<()> {
    let mode: InstanceMode = match mode {
        Some(mode) => mode.parse().map_err(|e: String| anyhow!(e))?,
        None => config.instance.mode,
    };
    let cluster_name = cluster.unwrap_or_else(|| config.instance.cluster_name.clone());

    if let Some(listen) = &config.scheduler.metrics_listen {
        install_metrics_exporter(listen)?;
    }

    let dal = open_dal(config).await?;
    let storage = StorageClientSet::from_dal(&dal);

    let mut k8s = K8sClientSet::new(cluster_name.clone()).with_namespace(config.installer.namespace.clone());
    if let Some(kubeconfig) = &config.installer.kubeconfig {
        k8s = k8s.with_kubeconfig(kubeconfig.clone());
    }

    let registry = build_job_registry(config, &cluster_name);
    let scheduler_config = SchedulerConfig::builder()
        .record_history(config.scheduler.record_history)
        .shutdown_timeout(Duration::from_secs(config.scheduler.shutdown_timeout_secs))
        .build();

    let handle = JobScheduler::new(scheduler_config, k8s, storage).start(registry.jobs_for(mode));
    info!(
        %mode,
        cluster = %cluster_name,
        jobs = ?handle.scheduled_jobs(),
        "Lens agent started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown requested");
    handle.shutdown().await;
    Ok(())
}
