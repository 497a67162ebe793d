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

//! Error types shared across the orchestration core.
//!
//! Each subsystem has its own error enum so callers can match on the failures
//! that matter to them (for example [`RegistryError::UnknownWorkflow`]) without
//! string inspection.

use thiserror::Error;

/// Errors raised while creating connection pools or running migrations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The URL did not match any backend compiled into this build.
    #[error("Unable to detect database backend from URL '{0}'")]
    UnsupportedUrl(String),

    #[error("Failed to build connection pool: {0}")]
    PoolBuild(String),

    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Errors raised by the persistence facades.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Record not found: {entity} {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Failed to encode or decode stored payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::ConnectionPool(err.to_string())
    }
}

/// Errors returned from a [`crate::jobs::Job`] run.
#[derive(Debug, Error)]
pub enum JobError {
    /// Storage needed by the job was unavailable or failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Job was cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Errors raised while parsing a job schedule expression.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Empty schedule expression")]
    Empty,

    #[error("Invalid @every interval '{expr}': {reason}")]
    InvalidInterval { expr: String, reason: String },

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("Schedule '{0}' has no upcoming occurrence")]
    NoNextOccurrence(String),
}

/// Errors raised by an individual installation stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// An external command (helm, kubectl) exited unsuccessfully.
    #[error("Command `{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("Failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {seconds}s waiting for {what}")]
    Timeout { what: String, seconds: u64 },

    #[error("Unexpected output from {command}: {reason}")]
    Output { command: String, reason: String },

    #[error("Stage cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Errors raised by workflow install, uninstall and status operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The cancellation token fired before the next stage could start.
    #[error("Workflow cancelled")]
    Cancelled,

    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("Stage '{stage}' verification failed: {message}")]
    VerificationFailed { stage: String, message: String },

    #[error("Rollback of stage '{stage}' failed: {source}")]
    RollbackFailed {
        stage: String,
        #[source]
        source: StageError,
    },

    /// The stage list can only be replaced before the workflow first runs.
    #[error("Workflow '{0}' has already started; its stages can no longer be changed")]
    AlreadyStarted(String),

    #[error("Invalid workflow configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised when resolving a workflow by name.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No factory is registered under the requested name.
    #[error("unknown workflow: {name}")]
    UnknownWorkflow { name: String },

    /// A factory exists but failed to build the workflow.
    #[error("failed to construct workflow '{name}': {source}")]
    Construction {
        name: String,
        #[source]
        source: WorkflowError,
    },
}
