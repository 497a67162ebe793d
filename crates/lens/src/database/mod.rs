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

//! # Database layer
//!
//! Connection pooling, backend detection and embedded migrations for the
//! shared Lens database. The backend is picked at runtime from the URL:
//!
//! - `postgres://` / `postgresql://` select PostgreSQL (`postgres` feature)
//! - `sqlite://`, file paths and `:memory:` select SQLite (`sqlite` feature)
//!
//! Query code lives in [`crate::dal`].

pub mod connection;
pub mod schema;

pub use connection::{AnyPool, BackendType, Database};

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
compile_error!("at least one of the `postgres` or `sqlite` features must be enabled");

#[cfg(feature = "postgres")]
pub const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/postgres");

#[cfg(feature = "sqlite")]
pub const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/sqlite");

/// Evaluates one of two expressions depending on the database backend.
///
/// Arms for backends not compiled into this build are removed entirely, so the
/// expressions may reference feature-gated methods.
#[macro_export]
macro_rules! dispatch_backend {
    ($backend:expr, $pg_expr:expr, $sqlite_expr:expr) => {
        match $backend {
            #[cfg(feature = "postgres")]
            $crate::database::BackendType::Postgres => $pg_expr,
            #[cfg(feature = "sqlite")]
            $crate::database::BackendType::Sqlite => $sqlite_expr,
        }
    };
}
