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

//! What the plugin prints on stdout for the container runtime.

use std::net::IpAddr;

use ipnet::IpNet;
use serde::Serialize;

use crate::config::Route;
use crate::errors::{ConfigError, IpamError};
use crate::operations::Allocation;

pub const SUPPORTED_VERSIONS: [&str; 2] = ["0.1.0", "0.2.0"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidEnvironment,
    DecodingFailure,
    InvalidConfig,
    TryAgainLater,
    AddressInUse,
    PoolExhausted,
    InventoryUnavailable,
    Internal,
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::InvalidEnvironment => 4,
            ErrorCode::DecodingFailure => 6,
            ErrorCode::InvalidConfig => 7,
            ErrorCode::TryAgainLater => 11,
            ErrorCode::AddressInUse => 100,
            ErrorCode::PoolExhausted => 101,
            ErrorCode::InventoryUnavailable => 102,
            ErrorCode::Internal => 999,
        }
    }
}

impl From<&IpamError> for ErrorCode {
    fn from(error: &IpamError) -> Self {
        match error {
            IpamError::Config(ConfigError::InvalidJson(_)) => ErrorCode::DecodingFailure,
            IpamError::Config(_) => ErrorCode::InvalidConfig,
            IpamError::Store(_) => ErrorCode::TryAgainLater,
            IpamError::AddressInUse(_) => ErrorCode::AddressInUse,
            IpamError::PoolExhausted(_) => ErrorCode::PoolExhausted,
            IpamError::Inventory(_) => ErrorCode::InventoryUnavailable,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddResult {
    pub cni_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip4: Option<IpConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip6: Option<IpConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IpConfig {
    pub ip: IpNet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
}

impl AddResult {
    pub fn new(cni_version: &str, allocation: Allocation) -> Self {
        let is_v4 = matches!(allocation.address, IpNet::V4(_));
        let ip = IpConfig {
            ip: allocation.address,
            gateway: allocation.gateway,
            routes: allocation.routes,
        };
        let (ip4, ip6) = if is_v4 { (Some(ip), None) } else { (None, Some(ip)) };
        AddResult {
            cni_version: cni_version.to_string(),
            ip4,
            ip6,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResult {
    pub cni_version: String,
    pub supported_versions: Vec<String>,
}

impl VersionResult {
    pub fn new(cni_version: &str) -> Self {
        VersionResult {
            cni_version: cni_version.to_string(),
            supported_versions: SUPPORTED_VERSIONS.map(String::from).to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResult {
    pub cni_version: String,
    pub code: u32,
    pub msg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl ErrorResult {
    pub fn new(
        cni_version: &str,
        code: ErrorCode,
        msg: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        ErrorResult {
            cni_version: cni_version.to_string(),
            code: code.code(),
            msg: msg.into(),
            details: details.into(),
        }
    }

    /// `context` names what was being done, e.g. the command and container.
    pub fn from_ipam_error(cni_version: &str, error: &IpamError, context: &str) -> Self {
        Self::new(cni_version, error.into(), error.to_string(), context)
    }
}
