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
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use ipnet::IpNet;
use thiserror::Error;

pub type IpamResult<T> = Result<T, IpamError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Top level error returned by the allocate and release operations. Every
/// variant maps onto one error kind reported back to the container runtime.
#[derive(Error, Debug)]
pub enum IpamError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Requested address {0} is already reserved")]
    AddressInUse(IpAddr),

    #[error("No free address left in {0}")]
    PoolExhausted(String),

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid network configuration: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing configuration field: {0}")]
    MissingField(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Subnet {0} has host bits set")]
    HostBitsSet(IpNet),

    #[error("Address {address} is not inside subnet {subnet}")]
    OutsideSubnet { address: IpAddr, subnet: IpNet },

    #[error("Range start {start} is greater than range end {end}")]
    InvertedRange { start: IpAddr, end: IpAddr },

    #[error("Range {first} overlaps range {second}")]
    OverlappingRanges { first: String, second: String },

    #[error("At least one address range is required")]
    NoRanges,

    #[error("Invalid network name {0:?}")]
    InvalidNetworkName(String),

    #[error("Invalid container ID {0:?}")]
    InvalidContainerId(String),

    #[error("Invalid CNI_ARGS entry: {0}")]
    InvalidArgs(String),

    #[error("Requested address {0} is not part of any configured range")]
    RequestedOutsidePool(IpAddr),

    #[error("Requested address {0} is a network, broadcast or gateway address")]
    RequestedExcluded(IpAddr),

    #[error(
        "Container {container_id} already holds {held}, cannot also take requested {requested}"
    )]
    ConflictingRequest {
        container_id: String,
        held: IpAddr,
        requested: IpAddr,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid store name: {0:?}")]
    InvalidName(String),

    #[error("IO error on {path}: {error}")]
    Io { path: PathBuf, error: io::Error },

    #[error("Could not lock {path}: {error}")]
    Lock { path: PathBuf, error: io::Error },

    #[error("Store at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, error: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            error,
        }
    }
}

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Failed to run {command}: {error}")]
    Spawn { command: String, error: io::Error },

    #[error("Timeout after {timeout:?} while running {command}")]
    Timeout { command: String, timeout: Duration },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Could not decode output of {command}: {error}")]
    Decode {
        command: String,
        error: serde_json::Error,
    },
}
