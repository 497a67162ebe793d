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

//! Stages that prepare the shared storage backends for the product releases.
//!
//! `database_migration` brings the Lens schema in Postgres up to date and
//! `storage_secret` publishes the connection details every product release
//! reads. With lens-managed storage the credentials come from the secrets the
//! operators create; with external storage they come from [`ExternalStorage`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::builtin::StorageMode;
use super::release::ReleaseClient;
use super::{RunOptions, Stage, StageStatus};
use crate::database::Database;
use crate::error::StageError;

/// Secret the product releases mount to find their storage backends.
pub const STORAGE_SECRET: &str = "primus-lens-storage-config";

const MANAGED_POSTGRES_SECRET: &str = "primus-lens-pguser-primus-lens";
const MANAGED_OPENSEARCH_SECRET: &str = "primus-lens-logs-admin-credentials";
const MANAGED_POSTGRES_SERVICE: &str = "primus-lens-primary";
const MANAGED_OPENSEARCH_SERVICE: &str = "primus-lens-logs";
const MANAGED_VMCLUSTER: &str = "primus-lens-vmcluster";
const MANAGED_DB_USER: &str = "primus-lens";
const MANAGED_DB_NAME: &str = "primus-lens";

const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DEFAULT_OPENSEARCH_PORT: u16 = 9200;
const DEFAULT_PROMETHEUS_READ_PORT: u16 = 8481;
const DEFAULT_PROMETHEUS_WRITE_PORT: u16 = 8480;
const DEFAULT_SSL_MODE: &str = "require";
const DEFAULT_OPENSEARCH_SCHEME: &str = "https";

/// Connection details for storage that already exists outside the cluster
/// install. Unset ports fall back to the backend defaults.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalStorage {
    pub postgres_host: String,
    pub postgres_port: Option<u16>,
    pub postgres_username: String,
    pub postgres_password: String,
    pub postgres_db_name: String,
    pub postgres_ssl_mode: Option<String>,
    pub opensearch_host: String,
    pub opensearch_port: Option<u16>,
    pub opensearch_username: String,
    pub opensearch_password: String,
    pub opensearch_scheme: Option<String>,
    pub prometheus_read_host: String,
    pub prometheus_read_port: Option<u16>,
    pub prometheus_write_host: String,
    pub prometheus_write_port: Option<u16>,
}

impl fmt::Debug for ExternalStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalStorage")
            .field("postgres_host", &self.postgres_host)
            .field("postgres_db_name", &self.postgres_db_name)
            .field("opensearch_host", &self.opensearch_host)
            .field("prometheus_read_host", &self.prometheus_read_host)
            .field("prometheus_write_host", &self.prometheus_write_host)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct PostgresEndpoint {
    pub service: String,
    pub port: u16,
    pub namespace: String,
    pub username: String,
    pub password: String,
    pub db_name: String,
    pub ssl_mode: String,
}

impl PostgresEndpoint {
    /// Lens-managed Postgres, reached through its in-cluster primary service.
    pub fn managed(namespace: &str, password: String) -> Self {
        Self {
            service: MANAGED_POSTGRES_SERVICE.to_string(),
            port: DEFAULT_POSTGRES_PORT,
            namespace: namespace.to_string(),
            username: MANAGED_DB_USER.to_string(),
            password,
            db_name: MANAGED_DB_NAME.to_string(),
            ssl_mode: DEFAULT_SSL_MODE.to_string(),
        }
    }

    pub fn external(namespace: &str, storage: &ExternalStorage) -> Self {
        Self {
            service: storage.postgres_host.clone(),
            port: storage.postgres_port.unwrap_or(DEFAULT_POSTGRES_PORT),
            namespace: namespace.to_string(),
            username: storage.postgres_username.clone(),
            password: storage.postgres_password.clone(),
            db_name: storage.postgres_db_name.clone(),
            ssl_mode: storage
                .postgres_ssl_mode
                .clone()
                .unwrap_or_else(|| DEFAULT_SSL_MODE.to_string()),
        }
    }

    /// Host name to connect to. A managed service name is expanded to its
    /// cluster DNS name.
    pub fn host(&self) -> String {
        if self.service == MANAGED_POSTGRES_SERVICE {
            format!("{}.{}.svc.cluster.local", self.service, self.namespace)
        } else {
            self.service.clone()
        }
    }

    /// `postgres://` URL with the credentials percent-encoded.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host(),
            self.port,
            urlencoding::encode(&self.db_name),
            self.ssl_mode
        )
    }
}

impl fmt::Debug for PostgresEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresEndpoint")
            .field("host", &self.host())
            .field("port", &self.port)
            .field("username", &self.username)
            .field("db_name", &self.db_name)
            .field("ssl_mode", &self.ssl_mode)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct OpenSearchEndpoint {
    pub service: String,
    pub port: u16,
    pub namespace: String,
    pub username: String,
    pub password: String,
    pub tls_enabled: bool,
    pub tls_insecure: bool,
    pub scheme: String,
}

impl fmt::Debug for OpenSearchEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSearchEndpoint")
            .field("service", &self.service)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

/// Everything written into [`STORAGE_SECRET`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEndpoints {
    pub postgres: PostgresEndpoint,
    pub opensearch: OpenSearchEndpoint,
    pub prometheus_read_endpoint: String,
    pub prometheus_write_endpoint: String,
}

impl StorageEndpoints {
    pub fn managed(namespace: &str, postgres_password: String, opensearch_password: String) -> Self {
        Self {
            postgres: PostgresEndpoint::managed(namespace, postgres_password),
            opensearch: OpenSearchEndpoint {
                service: MANAGED_OPENSEARCH_SERVICE.to_string(),
                port: DEFAULT_OPENSEARCH_PORT,
                namespace: namespace.to_string(),
                username: "admin".to_string(),
                password: opensearch_password,
                tls_enabled: true,
                tls_insecure: true,
                scheme: DEFAULT_OPENSEARCH_SCHEME.to_string(),
            },
            prometheus_read_endpoint: format!(
                "http://vmselect-{}.{}.svc.cluster.local:{}/select/0/prometheus",
                MANAGED_VMCLUSTER, namespace, DEFAULT_PROMETHEUS_READ_PORT
            ),
            prometheus_write_endpoint: format!(
                "http://vminsert-{}.{}.svc.cluster.local:{}/insert/0/prometheus",
                MANAGED_VMCLUSTER, namespace, DEFAULT_PROMETHEUS_WRITE_PORT
            ),
        }
    }

    pub fn external(namespace: &str, storage: &ExternalStorage) -> Self {
        let scheme = storage
            .opensearch_scheme
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENSEARCH_SCHEME.to_string());
        Self {
            postgres: PostgresEndpoint::external(namespace, storage),
            opensearch: OpenSearchEndpoint {
                service: storage.opensearch_host.clone(),
                port: storage.opensearch_port.unwrap_or(DEFAULT_OPENSEARCH_PORT),
                namespace: namespace.to_string(),
                username: storage.opensearch_username.clone(),
                password: storage.opensearch_password.clone(),
                tls_enabled: scheme == "https",
                tls_insecure: true,
                scheme,
            },
            prometheus_read_endpoint: format!(
                "http://{}:{}/select/0/prometheus",
                storage.prometheus_read_host,
                storage
                    .prometheus_read_port
                    .unwrap_or(DEFAULT_PROMETHEUS_READ_PORT)
            ),
            prometheus_write_endpoint: format!(
                "http://{}:{}/insert/0/prometheus",
                storage.prometheus_write_host,
                storage
                    .prometheus_write_port
                    .unwrap_or(DEFAULT_PROMETHEUS_WRITE_PORT)
            ),
        }
    }

    /// The Secret manifest, as JSON (which `kubectl apply` accepts).
    pub fn secret_manifest(&self, namespace: &str) -> Result<String, StageError> {
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": STORAGE_SECRET,
                "namespace": namespace,
            },
            "type": "Opaque",
            "stringData": {
                "postgres": to_json(&self.postgres)?,
                "opensearch": to_json(&self.opensearch)?,
                "prometheus_read_endpoint": self.prometheus_read_endpoint,
                "prometheus_write_endpoint": self.prometheus_write_endpoint,
            },
        });
        Ok(manifest.to_string())
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StageError> {
    serde_json::to_string(value)
        .map_err(|e| StageError::Other(format!("failed to encode storage config: {}", e)))
}

/// Where a stage gets its storage credentials from.
#[derive(Clone)]
pub struct StorageSource {
    pub mode: StorageMode,
    pub external: Option<ExternalStorage>,
    pub client: Arc<dyn ReleaseClient>,
}

impl StorageSource {
    fn external(&self) -> Result<&ExternalStorage, StageError> {
        self.external.as_ref().ok_or_else(|| {
            StageError::Other("external storage mode requires external storage settings".to_string())
        })
    }

    async fn required_secret(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
        secret: &str,
        key: &str,
    ) -> Result<String, StageError> {
        self.client
            .secret_value(cancel, opts, secret, key)
            .await?
            .ok_or_else(|| StageError::Other(format!("secret {}/{} has no '{}'", opts.namespace, secret, key)))
    }

    pub async fn postgres(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<PostgresEndpoint, StageError> {
        match self.mode {
            StorageMode::External => Ok(PostgresEndpoint::external(&opts.namespace, self.external()?)),
            StorageMode::LensManaged => {
                let password = self
                    .required_secret(cancel, opts, MANAGED_POSTGRES_SECRET, "password")
                    .await?;
                Ok(PostgresEndpoint::managed(&opts.namespace, password))
            }
        }
    }

    pub async fn endpoints(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<StorageEndpoints, StageError> {
        match self.mode {
            StorageMode::External => Ok(StorageEndpoints::external(&opts.namespace, self.external()?)),
            StorageMode::LensManaged => {
                let postgres = self
                    .required_secret(cancel, opts, MANAGED_POSTGRES_SECRET, "password")
                    .await?;
                let opensearch = self
                    .required_secret(cancel, opts, MANAGED_OPENSEARCH_SECRET, "password")
                    .await?;
                Ok(StorageEndpoints::managed(&opts.namespace, postgres, opensearch))
            }
        }
    }
}

/// Applies the Lens schema to a database.
#[async_trait]
pub trait SchemaMigrator: Send + Sync {
    /// Migrations not yet applied.
    async fn pending(&self, url: &str) -> Result<usize, StageError>;

    async fn migrate(&self, url: &str) -> Result<(), StageError>;
}

/// [`SchemaMigrator`] over the migrations embedded in this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedMigrator;

fn migration_error(e: impl fmt::Display) -> StageError {
    StageError::Other(format!("database migration failed: {}", e))
}

#[async_trait]
impl SchemaMigrator for EmbeddedMigrator {
    async fn pending(&self, url: &str) -> Result<usize, StageError> {
        let database = Database::new(url, 1).map_err(migration_error)?;
        database.pending_migrations().await.map_err(migration_error)
    }

    async fn migrate(&self, url: &str) -> Result<(), StageError> {
        let database = Database::new(url, 1).map_err(migration_error)?;
        database.run_migrations().await.map_err(migration_error)
    }
}

/// Brings the Lens schema up to date. Rollback leaves the schema in place.
pub struct DatabaseMigrationStage {
    source: StorageSource,
    migrator: Arc<dyn SchemaMigrator>,
}

impl DatabaseMigrationStage {
    pub fn new(source: StorageSource, migrator: Arc<dyn SchemaMigrator>) -> Self {
        Self { source, migrator }
    }
}

#[async_trait]
impl Stage for DatabaseMigrationStage {
    fn name(&self) -> &str {
        "database_migration"
    }

    async fn run(&self, cancel: &CancellationToken, opts: &RunOptions) -> Result<(), StageError> {
        if opts.dry_run {
            info!("Dry run, not migrating the database");
            return Ok(());
        }

        let postgres = self.source.postgres(cancel, opts).await?;
        info!(endpoint = ?postgres, "Running database migrations");
        self.migrator.migrate(&postgres.url()).await?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn verify(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<StageStatus, StageError> {
        let postgres = self.source.postgres(cancel, opts).await?;
        let status = match self.migrator.pending(&postgres.url()).await? {
            0 => StageStatus::ready("schema up to date"),
            n => StageStatus::pending(format!("{} migrations pending", n)),
        };
        Ok(status.with_detail("database", postgres.db_name))
    }

    async fn rollback(
        &self,
        _cancel: &CancellationToken,
        _opts: &RunOptions,
    ) -> Result<(), StageError> {
        Ok(())
    }
}

/// Publishes [`STORAGE_SECRET`].
pub struct StorageSecretStage {
    source: StorageSource,
}

impl StorageSecretStage {
    pub fn new(source: StorageSource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Stage for StorageSecretStage {
    fn name(&self) -> &str {
        "storage_secret"
    }

    async fn run(&self, cancel: &CancellationToken, opts: &RunOptions) -> Result<(), StageError> {
        let endpoints = self.source.endpoints(cancel, opts).await?;
        let manifest = endpoints.secret_manifest(&opts.namespace)?;
        info!(secret = STORAGE_SECRET, mode = %self.source.mode, "Applying storage secret");
        self.source
            .client
            .apply_manifest(cancel, opts, &manifest)
            .await
    }

    async fn verify(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<StageStatus, StageError> {
        let present = self
            .source
            .client
            .secret_value(cancel, opts, STORAGE_SECRET, "postgres")
            .await?
            .is_some();
        let status = if present {
            StageStatus::ready("storage secret present")
        } else if opts.dry_run {
            StageStatus::pending("dry run, storage secret not created")
        } else {
            StageStatus::pending("storage secret missing")
        };
        Ok(status.with_detail("secret", STORAGE_SECRET))
    }

    async fn rollback(
        &self,
        cancel: &CancellationToken,
        opts: &RunOptions,
    ) -> Result<(), StageError> {
        info!(secret = STORAGE_SECRET, dry_run = opts.dry_run, "Deleting storage secret");
        self.source.client.delete_secret(cancel, opts, STORAGE_SECRET).await
    }
}
