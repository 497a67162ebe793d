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

//! # Data access layer
//!
//! Database-backed implementations of the [`crate::store`] facades. Every
//! operation runs on a pooled connection through `interact`, with the same
//! diesel query compiled once per enabled backend.

/// Runs a blocking diesel closure on a pooled connection for whichever backend
/// the database uses, converting pool and query errors into `StoreError`.
///
/// The body is expanded once per backend, so it must type-check against every
/// enabled connection type.
macro_rules! interact {
    ($database:expr, |$conn:ident| $body:expr) => {
        match $database.backend() {
            #[cfg(feature = "postgres")]
            $crate::database::BackendType::Postgres => {
                let pooled = $database.get_postgres_connection().await?;
                pooled
                    .interact(move |$conn| $body)
                    .await
                    .map_err(|e| $crate::error::StoreError::ConnectionPool(e.to_string()))?
                    .map_err($crate::error::StoreError::from)
            }
            #[cfg(feature = "sqlite")]
            $crate::database::BackendType::Sqlite => {
                let pooled = $database.get_sqlite_connection().await?;
                pooled
                    .interact(move |$conn| $body)
                    .await
                    .map_err(|e| $crate::error::StoreError::ConnectionPool(e.to_string()))?
                    .map_err($crate::error::StoreError::from)
            }
        }
    };
}

pub mod action_task;
pub mod execution_history;
pub mod models;

pub use action_task::ActionTaskDAL;
pub use execution_history::ExecutionHistoryDAL;

use crate::database::{BackendType, Database};

/// Entry point for database-backed storage.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn backend(&self) -> BackendType {
        self.database.backend()
    }

    pub fn action_tasks(&self) -> ActionTaskDAL {
        ActionTaskDAL::new(self.database.clone())
    }

    pub fn execution_history(&self) -> ExecutionHistoryDAL {
        ExecutionHistoryDAL::new(self.database.clone())
    }
}
