/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */
use std::io::Read;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use host_local_ipam::cni::{AddResult, ErrorCode, ErrorResult, VersionResult};
use host_local_ipam::config::DEFAULT_CNI_VERSION;
use host_local_ipam::{IpamConfig, IpamError, allocate, logging, release};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CniCommand {
    Add,
    Del,
    Version,
}

/// Everything comes from the CNI environment variables; the flags exist for
/// running the plugin by hand.
#[derive(Debug, Parser)]
#[command(
    name = "carbide-host-local-ipam",
    about = "Host-local IPAM plugin for container networks",
    version
)]
struct Args {
    #[arg(long, env = "CNI_COMMAND", value_enum, ignore_case = true)]
    command: Option<CniCommand>,

    #[arg(long, env = "CNI_CONTAINERID")]
    container_id: Option<String>,

    #[arg(long, env = "CNI_NETNS")]
    netns: Option<String>,

    #[arg(long, env = "CNI_IFNAME")]
    ifname: Option<String>,

    /// Extra `KEY=VALUE;...` arguments, `IP=<address>` requests an address.
    #[arg(long = "cni-args", env = "CNI_ARGS", default_value = "")]
    cni_args: String,

    #[arg(long, env = "CNI_PATH")]
    path: Option<String>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            return fail(ErrorResult::new(
                DEFAULT_CNI_VERSION,
                ErrorCode::InvalidEnvironment,
                "Invalid plugin environment",
                e.to_string().trim(),
            ));
        }
    };
    run(args)
}

fn run(args: Args) -> ExitCode {
    let command = match args.command {
        Some(CniCommand::Version) => return print(&VersionResult::new(DEFAULT_CNI_VERSION)),
        Some(command) => command,
        None => return invalid_environment("CNI_COMMAND is not set"),
    };
    let Some(container_id) = args.container_id.filter(|id| !id.is_empty()) else {
        return invalid_environment("CNI_CONTAINERID is not set");
    };

    let mut stdin = Vec::new();
    if let Err(e) = std::io::stdin().read_to_end(&mut stdin) {
        return fail(ErrorResult::new(
            DEFAULT_CNI_VERSION,
            ErrorCode::Internal,
            "Failed to read network configuration from stdin",
            e.to_string(),
        ));
    }

    let config = match IpamConfig::load(&stdin, &args.cni_args) {
        Ok(config) => config,
        Err(e) => {
            return fail(ErrorResult::from_ipam_error(
                DEFAULT_CNI_VERSION,
                &IpamError::from(e),
                "loading network configuration",
            ));
        }
    };

    // Dropped when run returns, which flushes the log file.
    let _guard = match logging::init(&config.log) {
        Ok(guard) => guard,
        Err(e) => {
            return fail(ErrorResult::new(
                &config.cni_version,
                ErrorCode::Internal,
                "Failed to set up logging",
                format!("{e:#}"),
            ));
        }
    };

    tracing::debug!(
        ?command,
        %container_id,
        netns = args.netns.as_deref().unwrap_or_default(),
        ifname = args.ifname.as_deref().unwrap_or_default(),
        cni_path = args.path.as_deref().unwrap_or_default(),
        network = %config.name,
        "handling request"
    );

    let inventory = config.inventory.as_ref().map(|i| i.build());
    let context = format!("{command:?} for container {container_id}");
    let outcome = match command {
        CniCommand::Add => allocate(&config, &container_id, inventory.as_deref())
            .map(|allocation| Some(AddResult::new(&config.cni_version, allocation))),
        CniCommand::Del => release(&config, &container_id, inventory.as_deref()).map(|report| {
            if !report.released.is_empty() {
                tracing::info!(released = ?report.released, "released reservations");
            }
            None
        }),
        CniCommand::Version => Ok(None),
    };

    match outcome {
        Ok(Some(result)) => print(&result),
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "{context} failed");
            fail(ErrorResult::from_ipam_error(&config.cni_version, &e, &context))
        }
    }
}

fn invalid_environment(msg: &str) -> ExitCode {
    fail(ErrorResult::new(
        DEFAULT_CNI_VERSION,
        ErrorCode::InvalidEnvironment,
        msg,
        "",
    ))
}

fn print<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to encode result: {e}");
            ExitCode::FAILURE
        }
    }
}

fn fail(error: ErrorResult) -> ExitCode {
    let _ = print(&error);
    ExitCode::FAILURE
}
