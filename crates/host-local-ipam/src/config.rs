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
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::ConfigError;
use crate::inventory::{
    ContainerInventory, CrictlInventory, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CRICTL_COMMAND,
};
use crate::range::AddressRange;
use crate::range_set::RangeSet;
use crate::store::disk::{DEFAULT_DATA_DIR, validate_name};

pub const DEFAULT_CNI_VERSION: &str = "0.2.0";

/// Everything one invocation needs, validated. Built once from the network
/// configuration on stdin and `CNI_ARGS`, never changed afterwards.
#[derive(Clone, Debug)]
pub struct IpamConfig {
    pub cni_version: String,
    /// Network name, also the name of the reservation store.
    pub name: String,
    pub ranges: RangeSet,
    pub routes: Vec<Route>,
    pub requested_address: Option<IpAddr>,
    pub data_dir: PathBuf,
    pub log: LogConfig,
    pub gc_on_add: bool,
    pub inventory: Option<InventoryConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub file: Option<PathBuf>,
    pub debug: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub dst: IpNet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<IpAddr>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InventoryConfig {
    Crictl {
        #[serde(default = "Defaults::crictl_command")]
        command: PathBuf,
        #[serde(default, rename = "runtimeEndpoint")]
        runtime_endpoint: Option<String>,
        #[serde(default = "Defaults::inventory_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

impl InventoryConfig {
    pub fn build(&self) -> Box<dyn ContainerInventory> {
        match self {
            InventoryConfig::Crictl {
                command,
                runtime_endpoint,
                timeout,
            } => Box::new(CrictlInventory::new(
                command.clone(),
                runtime_endpoint.clone(),
                *timeout,
            )),
        }
    }
}

pub struct Defaults;

impl Defaults {
    pub fn crictl_command() -> PathBuf {
        DEFAULT_CRICTL_COMMAND.into()
    }
    pub fn inventory_timeout() -> Duration {
        DEFAULT_COMMAND_TIMEOUT
    }
    pub fn data_dir() -> PathBuf {
        DEFAULT_DATA_DIR.into()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetConf {
    cni_version: Option<String>,
    name: Option<String>,
    ipam: Option<IpamConf>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpamConf {
    subnet: Option<IpNet>,
    range_start: Option<IpAddr>,
    range_end: Option<IpAddr>,
    gateway: Option<IpAddr>,
    #[serde(default)]
    ranges: Vec<RangeConf>,
    #[serde(default)]
    routes: Vec<Route>,
    #[serde(default = "Defaults::data_dir")]
    data_dir: PathBuf,
    log_to_file: Option<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    is_debug_level: bool,
    #[serde(default)]
    gc_on_add: bool,
    inventory: Option<InventoryConfig>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeConf {
    subnet: IpNet,
    range_start: Option<IpAddr>,
    range_end: Option<IpAddr>,
    gateway: Option<IpAddr>,
}

impl IpamConfig {
    /// Parses the network configuration and `CNI_ARGS`, canonicalizing the
    /// ranges on the way.
    pub fn load(net_conf: &[u8], cni_args: &str) -> Result<Self, ConfigError> {
        let net_conf: NetConf = serde_json::from_slice(net_conf)?;

        let name = net_conf
            .name
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::MissingField("name"))?;
        validate_name(&name).map_err(|_| ConfigError::InvalidNetworkName(name.clone()))?;
        let ipam = net_conf.ipam.ok_or(ConfigError::MissingField("ipam"))?;

        let flat_form = ipam.subnet.is_some()
            || ipam.range_start.is_some()
            || ipam.range_end.is_some()
            || ipam.gateway.is_some();
        let ranges = if ipam.ranges.is_empty() {
            let subnet = ipam.subnet.ok_or(ConfigError::MissingField("ipam.subnet"))?;
            vec![AddressRange::new(
                subnet,
                ipam.range_start,
                ipam.range_end,
                ipam.gateway,
            )?]
        } else if flat_form {
            return Err(ConfigError::Invalid(
                "ipam.ranges cannot be combined with subnet, rangeStart, rangeEnd or gateway"
                    .to_string(),
            ));
        } else {
            ipam.ranges
                .into_iter()
                .map(|r| AddressRange::new(r.subnet, r.range_start, r.range_end, r.gateway))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(IpamConfig {
            cni_version: net_conf
                .cni_version
                .unwrap_or_else(|| DEFAULT_CNI_VERSION.to_string()),
            name,
            ranges: RangeSet::new(ranges)?,
            routes: ipam.routes,
            requested_address: parse_cni_args(cni_args)?,
            data_dir: ipam.data_dir,
            log: LogConfig {
                file: ipam.log_to_file,
                debug: ipam.is_debug_level,
            },
            gc_on_add: ipam.gc_on_add,
            inventory: ipam.inventory,
        })
    }
}

/// Extracts the requested address from `CNI_ARGS` (`K=V;K=V`). Unknown keys
/// are an error unless `IgnoreUnknown` is set.
pub fn parse_cni_args(args: &str) -> Result<Option<IpAddr>, ConfigError> {
    let mut requested = None;
    let mut ignore_unknown = false;
    let mut unknown = Vec::new();

    for pair in args.split(';').filter(|pair| !pair.trim().is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidArgs(pair.to_string()))?;
        match key.trim() {
            "IP" => {
                let address = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidArgs(pair.to_string()))?;
                requested = Some(address);
            }
            "IgnoreUnknown" => {
                ignore_unknown = matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
            }
            other => unknown.push(other.to_string()),
        }
    }

    if !unknown.is_empty() && !ignore_unknown {
        return Err(ConfigError::InvalidArgs(format!(
            "unknown keys: {}",
            unknown.join(", ")
        )));
    }
    Ok(requested)
}

// Older configurations carry booleans as strings.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(flag) => Ok(flag),
        Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "invalid boolean value {other:?}"
            ))),
        },
    }
}
