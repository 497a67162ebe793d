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

//! Schedule expressions.
//!
//! Two forms are accepted:
//!
//! - `@every <duration>` with a humantime duration (`300ms`, `30s`, `1h30m`);
//!   the first firing happens one interval after the loop starts.
//! - Cron expressions with five or six fields, or descriptors such as
//!   `@hourly` and `@daily`, evaluated in UTC.

use chrono::{DateTime, Utc};
use croner::Cron;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ScheduleError;

enum Kind {
    Every(Duration),
    Cron(Box<Cron>),
}

/// A parsed job schedule.
pub struct Schedule {
    expr: String,
    kind: Kind,
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(ScheduleError::Empty);
        }

        if let Some(interval) = trimmed.strip_prefix("@every") {
            let interval = interval.trim();
            let period = humantime::parse_duration(interval).map_err(|e| {
                ScheduleError::InvalidInterval {
                    expr: trimmed.to_string(),
                    reason: e.to_string(),
                }
            })?;
            if period.is_zero() {
                return Err(ScheduleError::InvalidInterval {
                    expr: trimmed.to_string(),
                    reason: "interval must be greater than zero".to_string(),
                });
            }
            return Ok(Self {
                expr: trimmed.to_string(),
                kind: Kind::Every(period),
            });
        }

        let cron = Cron::new(trimmed)
            .with_seconds_optional()
            .parse()
            .map_err(|e| ScheduleError::InvalidCron {
                expr: trimmed.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            expr: trimmed.to_string(),
            kind: Kind::Cron(Box::new(cron)),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expr
    }

    /// The fixed period for `@every` schedules.
    pub fn interval(&self) -> Option<Duration> {
        match &self.kind {
            Kind::Every(period) => Some(*period),
            Kind::Cron(_) => None,
        }
    }

    /// Time to wait from `now` until the next firing.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Result<Duration, ScheduleError> {
        match &self.kind {
            Kind::Every(period) => Ok(*period),
            Kind::Cron(cron) => {
                let next = cron
                    .find_next_occurrence(&now, false)
                    .map_err(|_| ScheduleError::NoNextOccurrence(self.expr.clone()))?;
                Ok((next - now).to_std().unwrap_or(Duration::ZERO))
            }
        }
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Schedule::parse(s)
    }
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Schedule").field(&self.expr).finish()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}
