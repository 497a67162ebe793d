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

//! Table definitions shared by both backends.
//!
//! JSON payloads are stored as `TEXT` and timestamps as naive UTC so that the
//! same query code compiles against PostgreSQL and SQLite connections.

diesel::table! {
    action_tasks (id) {
        id -> BigInt,
        action_type -> Text,
        target_type -> Text,
        target_id -> Text,
        target_node -> Nullable<Text>,
        cluster_name -> Text,
        parameters -> Text,
        status -> Text,
        result -> Nullable<Text>,
        error_message -> Nullable<Text>,
        timeout_seconds -> BigInt,
        created_at -> Timestamp,
        started_at -> Nullable<Timestamp>,
        completed_at -> Nullable<Timestamp>,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    job_execution_history (id) {
        id -> BigInt,
        job_name -> Text,
        success -> Bool,
        error -> Nullable<Text>,
        stats -> Text,
        started_at -> Timestamp,
        finished_at -> Timestamp,
        duration_ms -> BigInt,
    }
}
