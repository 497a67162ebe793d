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

use clap::{Parser, Subcommand, ValueEnum};
use lens::workflow::InstallScope;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "lensctl",
    version,
    about = "Install Lens into Kubernetes clusters and run the Lens agent",
    long_about = "Installs, removes and inspects the Lens data plane and control plane, runs the \
                  per-cluster agent, and submits cross-cluster action tasks"
)]
pub struct Cli {
    /// Configuration file (defaults to LENS_CONFIG, ./lens.toml, then the user and system config dirs)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a workflow into the target cluster
    Install {
        /// Workflow name (dataplane, controlplane, standalone)
        workflow: String,

        /// Render releases without applying them
        #[arg(long)]
        dry_run: bool,

        /// Give up after this long (e.g. 30m, 1h)
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// Helm values file applied to the product releases
        #[arg(long)]
        values: Option<PathBuf>,

        /// Part to install (full, infrastructure, apps), overriding the configuration
        #[arg(long, value_parser = parse_scope)]
        scope: Option<InstallScope>,

        /// Target namespace, overriding the configuration
        #[arg(short, long)]
        namespace: Option<String>,

        /// Kubeconfig for the target cluster
        #[arg(long)]
        kubeconfig: Option<PathBuf>,
    },

    /// Roll back every stage of a workflow in reverse order
    Uninstall {
        workflow: String,

        /// Keep going when a stage fails to roll back
        #[arg(long)]
        force: bool,

        #[arg(short, long)]
        namespace: Option<String>,

        #[arg(long)]
        kubeconfig: Option<PathBuf>,
    },

    /// Show the aggregated status of a workflow
    Status {
        workflow: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        #[arg(short, long)]
        namespace: Option<String>,

        #[arg(long)]
        kubeconfig: Option<PathBuf>,
    },

    /// List the available workflows
    Workflows,

    /// Run the scheduler and action-task executor until interrupted
    Agent {
        /// Instance mode (data, management, standalone), overriding the configuration
        #[arg(long)]
        mode: Option<String>,

        /// Cluster this agent serves, overriding the configuration
        #[arg(long)]
        cluster: Option<String>,
    },

    /// Submit and inspect cross-cluster action tasks
    #[command(subcommand)]
    Task(TaskCommands),
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCommands {
    /// Queue a task for a cluster's agent
    Submit {
        /// Cluster whose agent should run the task
        #[arg(long)]
        cluster: String,

        /// Handler to invoke (e.g. cluster_ping)
        #[arg(long = "type")]
        action_type: String,

        /// Kind of object the task acts on
        #[arg(long, default_value = "cluster")]
        target_type: String,

        /// Identifier of the object the task acts on
        #[arg(long, default_value = "")]
        target_id: String,

        /// Node the task is pinned to
        #[arg(long)]
        node: Option<String>,

        /// JSON object passed to the handler
        #[arg(long, default_value = "{}")]
        params: String,

        /// Seconds the task may wait before it is timed out
        #[arg(long)]
        timeout_secs: Option<i64>,
    },

    /// Show one task
    Get { id: i64 },

    /// List tasks, newest first
    List {
        #[arg(long)]
        cluster: Option<String>,

        /// pending, running, completed, failed or timeout
        #[arg(long)]
        status: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

fn parse_scope(value: &str) -> Result<InstallScope, String> {
    value.parse().map_err(|e: lens::WorkflowError| e.to_string())
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| e.to_string())
}
