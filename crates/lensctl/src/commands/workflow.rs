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

use anyhow::{Context, Result};
use lens::workflow::{
    HelmCli, InstallScope, ProgressReporter, RunOptions, UninstallOptions, WorkflowConfig, WorkflowRegistry,
    WorkflowStatus,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::LensConfig;
use crate::utils::{should_print, ConsoleProgress, LogLevel};

/// Cluster selection flags shared by the workflow commands.
#[derive(Debug, Clone, Default)]
pub struct Target {
    pub namespace: Option<String>,
    pub kubeconfig: Option<PathBuf>,
}

/// Registry of the built-in workflows driven through the `helm` and `kubectl`
/// binaries on `PATH`.
pub fn builtin_registry() -> WorkflowRegistry {
    WorkflowRegistry::with_builtin(Arc::new(HelmCli::new()))
}

pub fn workflow_config(
    config: &LensConfig,
    progress: Option<Arc<dyn ProgressReporter>>,
) -> WorkflowConfig {
    WorkflowConfig {
        namespace: config.installer.namespace.clone(),
        charts_dir: config.installer.charts_dir.clone(),
        values_file: config.installer.values_file.clone(),
        storage_mode: config.installer.storage_mode,
        scope: config.installer.scope,
        external_storage: config.installer.external_storage.clone(),
        migrator: None,
        progress,
    }
}

pub fn run_options(config: &LensConfig, target: Target, dry_run: bool, verbose: bool) -> RunOptions {
    RunOptions {
        namespace: target
            .namespace
            .unwrap_or_else(|| config.installer.namespace.clone()),
        kubeconfig: target
            .kubeconfig
            .or_else(|| config.installer.kubeconfig.clone()),
        dry_run,
        verbose,
    }
}

/// Cancels the token on Ctrl-C or after `timeout`. The watchers stop when
/// this is dropped.
struct Interrupts {
    handles: Vec<JoinHandle<()>>,
    timed_out: Arc<AtomicBool>,
}

impl Interrupts {
    fn watch(cancel: &CancellationToken, timeout: Option<Duration>) -> Self {
        let timed_out = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current stage");
                token.cancel();
            }
        }));

        if let Some(timeout) = timeout {
            let token = cancel.clone();
            let flag = Arc::clone(&timed_out);
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                flag.store(true, Ordering::Release);
                token.cancel();
            }));
        }

        Self { handles, timed_out }
    }

    fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }
}

impl Drop for Interrupts {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn install_workflow(
    cli: &Cli,
    config: &LensConfig,
    registry: &WorkflowRegistry,
    name: &str,
    dry_run: bool,
    timeout: Option<Duration>,
    values: Option<PathBuf>,
    scope: Option<InstallScope>,
    target: Target,
) -> Result<()> {
    let progress: Arc<dyn ProgressReporter> = Arc::new(ConsoleProgress::new(cli.quiet));
    let mut wf_config = workflow_config(config, Some(progress));
    if let Some(scope) = scope {
        wf_config.scope = scope;
    }
    let workflow = registry.new_workflow(name, &wf_config)?;
    if let Some(values) = values {
        workflow
            .set_values_file(values)
            .context("failed to apply values file")?;
    }

    let opts = run_options(config, target, dry_run, cli.verbose);
    info!(
        workflow = name,
        namespace = %opts.namespace,
        dry_run,
        scope = %wf_config.scope,
        stages = ?workflow.stage_names(),
        "Starting install"
    );

    let cancel = CancellationToken::new();
    let interrupts = Interrupts::watch(&cancel, timeout);

    let result = workflow.install(&cancel, &opts).await;
    let timed_out = interrupts.timed_out();
    match (result, timeout) {
        (Err(e), Some(timeout)) if timed_out => {
            return Err(e).with_context(|| {
                format!(
                    "install of '{}' timed out after {}",
                    name,
                    humantime::format_duration(timeout)
                )
            });
        }
        (result, _) => result.with_context(|| format!("install of '{}' failed", name))?,
    }

    if should_print(cli, LogLevel::Info) {
        if dry_run {
            println!("Dry run of '{}' completed", name);
        } else {
            println!("Workflow '{}' installed", name);
        }
    }
    Ok(())
}

pub async fn uninstall_workflow(
    cli: &Cli,
    config: &LensConfig,
    registry: &WorkflowRegistry,
    name: &str,
    force: bool,
    target: Target,
) -> Result<()> {
    let progress: Arc<dyn ProgressReporter> = Arc::new(ConsoleProgress::new(cli.quiet));
    let workflow = registry.new_workflow(name, &workflow_config(config, Some(progress)))?;
    let opts = run_options(config, target, false, cli.verbose);

    let cancel = CancellationToken::new();
    let _interrupts = Interrupts::watch(&cancel, None);

    workflow
        .uninstall(&cancel, &opts, &UninstallOptions { force })
        .await
        .with_context(|| format!("uninstall of '{}' failed", name))?;

    if should_print(cli, LogLevel::Info) {
        println!("Workflow '{}' uninstalled", name);
    }
    Ok(())
}

pub async fn show_status(
    cli: &Cli,
    config: &LensConfig,
    registry: &WorkflowRegistry,
    name: &str,
    json: bool,
    target: Target,
) -> Result<()> {
    let workflow = registry.new_workflow(name, &workflow_config(config, None))?;
    let opts = run_options(config, target, false, cli.verbose);

    let cancel = CancellationToken::new();
    let _interrupts = Interrupts::watch(&cancel, None);
    let status = workflow.status(&cancel, &opts).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", render_status(&status));
    }
    Ok(())
}

/// Plain-text status table.
pub fn render_status(status: &WorkflowStatus) -> String {
    let width = status
        .stages
        .iter()
        .map(|s| s.stage.len())
        .max()
        .unwrap_or(0)
        .max("STAGE".len());

    let mut out = format!("Workflow: {}\nOverall:  {}\n\n", status.workflow, status.overall);
    out.push_str(&format!("{:<width$}  {:<10}  MESSAGE\n", "STAGE", "STATE", width = width));
    for stage in &status.stages {
        out.push_str(&format!(
            "{:<width$}  {:<10}  {}\n",
            stage.stage,
            stage.status.state.as_str(),
            stage.status.message,
            width = width
        ));
    }
    out
}

pub fn list_workflows(config: &LensConfig, registry: &WorkflowRegistry) -> Result<()> {
    let wf_config = workflow_config(config, None);
    for name in registry.names() {
        let workflow = registry.new_workflow(&name, &wf_config)?;
        println!("{:<14} {}", name, workflow.description());
        println!("{:<14} stages: {}", "", workflow.stage_names().join(", "));
    }
    Ok(())
}
