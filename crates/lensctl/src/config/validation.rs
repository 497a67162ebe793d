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

use crate::config::{types::*, ValidationError};
use lens::database::BackendType;
use lens::jobs::InstanceMode;
use lens::workflow::{InstallScope, StorageMode};
use std::net::SocketAddr;

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for LensConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors: Vec<ValidationError> = [
            self.instance.validate(),
            self.database.validate(),
            self.executor.validate(),
            self.scheduler.validate(),
            self.installer.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple { errors }),
        }
    }
}

impl Validate for InstanceConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.mode == InstanceMode::Data && self.cluster_name.trim().is_empty() {
            return Err(ValidationError::MissingClusterName {
                mode: self.mode.to_string(),
            });
        }
        Ok(())
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if BackendType::from_url(&self.url).is_err() {
            return Err(ValidationError::InvalidDatabaseUrl {
                url: self.url.clone(),
            });
        }

        if self.pool_size == 0 || self.pool_size > 100 {
            return Err(ValidationError::InvalidPoolSize {
                size: self.pool_size,
            });
        }

        Ok(())
    }
}

impl Validate for ExecutorConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize {
                size: self.batch_size,
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::NotPositive {
                field: "executor.poll_interval_ms",
                value: 0,
            });
        }
        // Zero is allowed and disables expiry.
        if self.default_timeout_secs < 0 {
            return Err(ValidationError::NotPositive {
                field: "executor.default_timeout_secs",
                value: self.default_timeout_secs,
            });
        }
        Ok(())
    }
}

impl Validate for SchedulerSection {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.history_retention_days == 0 {
            return Err(ValidationError::NotPositive {
                field: "scheduler.history_retention_days",
                value: 0,
            });
        }
        if let Some(address) = &self.metrics_listen {
            if address.parse::<SocketAddr>().is_err() {
                return Err(ValidationError::InvalidListenAddress {
                    address: address.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Validate for InstallerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.storage_mode == StorageMode::External
            && self.scope != InstallScope::Apps
            && self.external_storage.is_none()
        {
            return Err(ValidationError::MissingExternalStorage);
        }
        Ok(())
    }
}
