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

pub mod agent;
pub mod task;
pub mod workflow;

pub use agent::run_agent;
pub use task::run_task_command;
pub use workflow::{install_workflow, list_workflows, show_status, uninstall_workflow};

use anyhow::{Context, Result};
use lens::{Database, DAL};
use tracing::info;

use crate::config::LensConfig;

/// Connects to the configured database and applies pending migrations.
pub async fn open_dal(config: &LensConfig) -> Result<DAL> {
    let database = Database::new(&config.database.url, config.database.pool_size)
        .context("failed to open the configured database")?;
    database
        .run_migrations()
        .await
        .context("failed to run database migrations")?;
    info!(backend = ?database.backend(), "Database ready");
    Ok(DAL::new(database))
}
