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
use std::collections::HashSet;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use wait_timeout::ChildExt;

use crate::errors::InventoryError;

pub const DEFAULT_CRICTL_COMMAND: &str = "crictl";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of truth for which containers still exist on this host.
#[cfg_attr(test, mockall::automock)]
pub trait ContainerInventory {
    fn live_containers(&self) -> Result<HashSet<String>, InventoryError>;
}

/// Live containers together with the moment they were asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveSnapshot {
    pub containers: HashSet<String>,
    pub started: SystemTime,
}

impl LiveSnapshot {
    pub fn take(inventory: &dyn ContainerInventory) -> Result<Self, InventoryError> {
        let started = SystemTime::now();
        let containers = inventory.live_containers()?;
        Ok(LiveSnapshot {
            containers,
            started,
        })
    }
}

/// Asks the CRI runtime for its pod sandboxes through `crictl`. The IDs of
/// sandboxes are what runtimes pass as the container ID to network plugins.
/// Sandboxes are reported whatever their state, a stopped sandbox keeps its
/// address until it is removed.
#[derive(Clone, Debug)]
pub struct CrictlInventory {
    command: PathBuf,
    runtime_endpoint: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodSandbox>,
}

#[derive(Deserialize)]
struct PodSandbox {
    id: String,
}

impl Default for CrictlInventory {
    fn default() -> Self {
        CrictlInventory {
            command: DEFAULT_CRICTL_COMMAND.into(),
            runtime_endpoint: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl CrictlInventory {
    pub fn new(command: PathBuf, runtime_endpoint: Option<String>, timeout: Duration) -> Self {
        CrictlInventory {
            command,
            runtime_endpoint,
            timeout,
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(endpoint) = &self.runtime_endpoint {
            args.push("--runtime-endpoint".to_string());
            args.push(endpoint.clone());
        }
        args.extend(["pods", "-o", "json"].map(String::from));
        args
    }

    fn command_string(&self) -> String {
        format!("{} {}", self.command.display(), self.args().join(" "))
    }

    fn run(&self) -> Result<Vec<u8>, InventoryError> {
        let command = self.command_string();
        let spawn_error = |error| InventoryError::Spawn {
            command: command.clone(),
            error,
        };

        let mut child = Command::new(&self.command)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        // Drain both pipes while waiting so a large listing can't fill the
        // pipe buffer and stall the child.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match child.wait_timeout(self.timeout).map_err(spawn_error)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(InventoryError::Timeout {
                    command,
                    timeout: self.timeout,
                });
            }
        };

        let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        if !status.success() {
            let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
            return Err(InventoryError::Failed {
                command,
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(stdout)
    }
}

impl ContainerInventory for CrictlInventory {
    fn live_containers(&self) -> Result<HashSet<String>, InventoryError> {
        let output = self.run()?;
        let live = parse_pod_list(&self.command_string(), &output)?;
        tracing::debug!(count = live.len(), "fetched live pod sandboxes");
        Ok(live)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn parse_pod_list(command: &str, output: &[u8]) -> Result<HashSet<String>, InventoryError> {
    let pods: PodList = serde_json::from_slice(output).map_err(|error| InventoryError::Decode {
        command: command.to_string(),
        error,
    })?;
    Ok(pods.items.into_iter().map(|pod| pod.id).collect())
}
