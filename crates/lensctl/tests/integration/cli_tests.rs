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

use clap::Parser;
use lens::workflow::InstallScope;
use lensctl::cli::{Cli, Commands, LogFormatArg, TaskCommands};
use lensctl::utils::{should_print, LogLevel};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_install_command_parsing() {
    let args = vec![
        "lensctl",
        "install",
        "dataplane",
        "--dry-run",
        "--timeout",
        "30m",
        "--values",
        "/etc/lens/values.yaml",
        "--scope",
        "infra",
        "-n",
        "lens-east",
    ];

    let cli = Cli::try_parse_from(args).expect("Should parse install command");

    match cli.command {
        Commands::Install {
            workflow,
            dry_run,
            timeout,
            values,
            scope,
            namespace,
            kubeconfig,
        } => {
            assert_eq!(workflow, "dataplane");
            assert!(dry_run);
            assert_eq!(timeout, Some(Duration::from_secs(30 * 60)));
            assert_eq!(values, Some(PathBuf::from("/etc/lens/values.yaml")));
            assert_eq!(scope, Some(InstallScope::Infrastructure));
            assert_eq!(namespace.as_deref(), Some("lens-east"));
            assert!(kubeconfig.is_none());
        }
        _ => panic!("Expected Install command"),
    }
}

#[test]
fn test_install_rejects_bad_timeout() {
    let result = Cli::try_parse_from(vec!["lensctl", "install", "dataplane", "--timeout", "soon"]);
    assert!(result.is_err());
}

#[test]
fn test_install_rejects_unknown_scope() {
    let result = Cli::try_parse_from(vec!["lensctl", "install", "dataplane", "--scope", "upgrade"]);
    assert!(result.is_err());
}

#[test]
fn test_uninstall_force_parsing() {
    let cli = Cli::try_parse_from(vec!["lensctl", "uninstall", "standalone", "--force"])
        .expect("Should parse uninstall command");

    match cli.command {
        Commands::Uninstall {
            workflow, force, ..
        } => {
            assert_eq!(workflow, "standalone");
            assert!(force);
        }
        _ => panic!("Expected Uninstall command"),
    }
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(vec![
        "lensctl",
        "status",
        "controlplane",
        "--json",
        "--verbose",
        "--config",
        "/tmp/lens.toml",
        "--log-format",
        "json",
    ])
    .expect("Should parse status command");

    assert!(cli.verbose);
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/lens.toml")));
    assert_eq!(cli.log_format, LogFormatArg::Json);
    assert!(matches!(cli.command, Commands::Status { json: true, .. }));
}

#[test]
fn test_verbose_and_quiet_conflict() {
    let result = Cli::try_parse_from(vec!["lensctl", "--verbose", "--quiet", "workflows"]);
    assert!(result.is_err());
}

#[test]
fn test_task_submit_defaults() {
    let cli = Cli::try_parse_from(vec![
        "lensctl",
        "task",
        "submit",
        "--cluster",
        "east",
        "--type",
        "cluster_ping",
    ])
    .expect("Should parse task submit");

    match cli.command {
        Commands::Task(TaskCommands::Submit {
            cluster,
            action_type,
            target_type,
            target_id,
            node,
            params,
            timeout_secs,
        }) => {
            assert_eq!(cluster, "east");
            assert_eq!(action_type, "cluster_ping");
            assert_eq!(target_type, "cluster");
            assert_eq!(target_id, "");
            assert!(node.is_none());
            assert_eq!(params, "{}");
            assert!(timeout_secs.is_none());
        }
        _ => panic!("Expected Task Submit command"),
    }
}

#[test]
fn test_task_list_parsing() {
    let cli = Cli::try_parse_from(vec!["lensctl", "task", "list", "--status", "failed"])
        .expect("Should parse task list");

    match cli.command {
        Commands::Task(TaskCommands::List {
            cluster,
            status,
            limit,
        }) => {
            assert!(cluster.is_none());
            assert_eq!(status.as_deref(), Some("failed"));
            assert_eq!(limit, 50);
        }
        _ => panic!("Expected Task List command"),
    }
}

#[test]
fn test_agent_overrides() {
    let cli = Cli::try_parse_from(vec!["lensctl", "agent", "--mode", "data", "--cluster", "east"])
        .expect("Should parse agent command");

    match cli.command {
        Commands::Agent { mode, cluster } => {
            assert_eq!(mode.as_deref(), Some("data"));
            assert_eq!(cluster.as_deref(), Some("east"));
        }
        _ => panic!("Expected Agent command"),
    }
}

#[test]
fn test_should_print_levels() {
    let quiet = Cli::try_parse_from(vec!["lensctl", "--quiet", "workflows"]).unwrap();
    assert!(should_print(&quiet, LogLevel::Error));
    assert!(!should_print(&quiet, LogLevel::Info));
    assert!(!should_print(&quiet, LogLevel::Debug));

    let verbose = Cli::try_parse_from(vec!["lensctl", "--verbose", "workflows"]).unwrap();
    assert!(should_print(&verbose, LogLevel::Info));
    assert!(should_print(&verbose, LogLevel::Debug));
}
