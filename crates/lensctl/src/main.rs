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

use anyhow::Result;
use clap::Parser;
use lensctl::commands::workflow::{builtin_registry, Target};
use lensctl::*;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli);

    let config = ConfigLoader::new().load_config(cli.config.as_deref())?;
    config.validate()?;
    debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Install {
            ref workflow,
            dry_run,
            timeout,
            ref values,
            scope,
            ref namespace,
            ref kubeconfig,
        } => {
            install_workflow(
                &cli,
                &config,
                &builtin_registry(),
                workflow,
                dry_run,
                timeout,
                values.clone(),
                scope,
                Target {
                    namespace: namespace.clone(),
                    kubeconfig: kubeconfig.clone(),
                },
            )
            .await?;
        }
        Commands::Uninstall {
            ref workflow,
            force,
            ref namespace,
            ref kubeconfig,
        } => {
            uninstall_workflow(
                &cli,
                &config,
                &builtin_registry(),
                workflow,
                force,
                Target {
                    namespace: namespace.clone(),
                    kubeconfig: kubeconfig.clone(),
                },
            )
            .await?;
        }
        Commands::Status {
            ref workflow,
            json,
            ref namespace,
            ref kubeconfig,
        } => {
            show_status(
                &cli,
                &config,
                &builtin_registry(),
                workflow,
                json,
                Target {
                    namespace: namespace.clone(),
                    kubeconfig: kubeconfig.clone(),
                },
            )
            .await?;
        }
        Commands::Workflows => {
            list_workflows(&config, &builtin_registry())?;
        }
        Commands::Agent {
            ref mode,
            ref cluster,
        } => {
            run_agent(&config, mode.clone(), cluster.clone()).await?;
        }
        Commands::Task(ref command) => {
            run_task_command(&config, command.clone()).await?;
        }
    }

    Ok(())
}
