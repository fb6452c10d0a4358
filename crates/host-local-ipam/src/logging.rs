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
use std::path::Path;

use eyre::WrapErr;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::LogConfig;

fn env_filter(debug: bool) -> Result<EnvFilter, eyre::Report> {
    let level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    Ok(if debug {
        filter.add_directive("host_local_ipam=debug".parse()?)
    } else {
        filter
    })
}

/// Logs to stderr, and additionally to `config.file` when set. Stdout is
/// left alone, it carries the result for the runtime. A log file that can't
/// be opened only costs the file output.
///
/// The returned guard flushes the file writer when dropped, keep it alive
/// until the process is about to exit.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, eyre::Report> {
    let stderr_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter(config.debug)?);

    let Some(path) = &config.file else {
        tracing_subscriber::registry().with(stderr_layer).try_init()?;
        return Ok(None);
    };

    let appender = match file_appender(path) {
        Ok(appender) => appender,
        Err(e) => {
            tracing_subscriber::registry().with(stderr_layer).try_init()?;
            tracing::warn!(error = format!("{e:#}"), "logging to stderr only");
            return Ok(None);
        }
    };

    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer)
        .with_filter(env_filter(config.debug)?);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(Some(guard))
}

// Appends to exactly `path`, never rotating.
fn file_appender(path: &Path) -> Result<RollingFileAppender, eyre::Report> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| eyre::eyre!("Invalid log file path: {}", path.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .wrap_err_with(|| format!("Failed to open log file: {}", path.display()))
}
