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

//! Job execution history DAL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::models::{ExecutionHistoryRow, NewExecutionHistoryRow};
use crate::database::schema::job_execution_history;
use crate::database::Database;
use crate::error::StoreError;
use crate::jobs::ExecutionResult;
use crate::store::ExecutionHistoryStore;

/// Database-backed [`ExecutionHistoryStore`].
#[derive(Clone, Debug)]
pub struct ExecutionHistoryDAL {
    database: Database,
}

impl ExecutionHistoryDAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

#[async_trait]
impl ExecutionHistoryStore for ExecutionHistoryDAL {
    async fn record(&self, result: &ExecutionResult) -> Result<(), StoreError> {
        let row = NewExecutionHistoryRow::try_from(result)?;
        interact!(self.database, |conn| {
            diesel::insert_into(job_execution_history::table)
                .values(&row)
                .execute(conn)
        })?;
        Ok(())
    }

    async fn recent(
        &self,
        job_name: &str,
        limit: usize,
    ) -> Result<Vec<ExecutionResult>, StoreError> {
        let job_name = job_name.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = interact!(self.database, |conn| {
            job_execution_history::table
                .filter(job_execution_history::job_name.eq(job_name))
                .order(job_execution_history::id.desc())
                .limit(limit)
                .load::<ExecutionHistoryRow>(conn)
        })?;
        rows.into_iter().map(ExecutionResult::try_from).collect()
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = cutoff.naive_utc();
        interact!(self.database, |conn| {
            diesel::delete(
                job_execution_history::table.filter(job_execution_history::started_at.lt(cutoff)),
            )
            .execute(conn)
        })
    }
}
