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
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use crate::errors::ConfigError;

/// A contiguous, inclusive block of allocatable addresses carved out of a
/// subnet. Addresses are handled as plain integers internally so the same
/// arithmetic serves both address families.
///
/// The network address, the broadcast address and the gateway are never
/// handed out, even when they fall between `range_start` and `range_end`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AddressRange {
    subnet: IpNet,
    range_start: IpAddr,
    range_end: IpAddr,
    gateway: Option<IpAddr>,
}

impl AddressRange {
    /// Builds a canonical range. Missing bounds default to the first and
    /// last host address of the subnet.
    pub fn new(
        subnet: IpNet,
        range_start: Option<IpAddr>,
        range_end: Option<IpAddr>,
        gateway: Option<IpAddr>,
    ) -> Result<Self, ConfigError> {
        if subnet.trunc() != subnet {
            return Err(ConfigError::HostBitsSet(subnet));
        }

        let range_start = range_start.unwrap_or_else(|| first_host(&subnet));
        let range_end = range_end.unwrap_or_else(|| last_host(&subnet));

        for address in [Some(range_start), Some(range_end), gateway]
            .into_iter()
            .flatten()
        {
            if !subnet.contains(&address) {
                return Err(ConfigError::OutsideSubnet { address, subnet });
            }
        }

        if to_bits(range_start) > to_bits(range_end) {
            return Err(ConfigError::InvertedRange {
                start: range_start,
                end: range_end,
            });
        }

        Ok(AddressRange {
            subnet,
            range_start,
            range_end,
            gateway,
        })
    }

    pub fn subnet(&self) -> IpNet {
        self.subnet
    }

    pub fn range_start(&self) -> IpAddr {
        self.range_start
    }

    pub fn range_end(&self) -> IpAddr {
        self.range_end
    }

    pub fn gateway(&self) -> Option<IpAddr> {
        self.gateway
    }

    /// Whether `address` lies within `[range_start, range_end]`. Excluded
    /// addresses are still "contained"; use [`AddressRange::is_excluded`] to
    /// filter them.
    pub fn contains(&self, address: IpAddr) -> bool {
        if address.is_ipv4() != self.range_start.is_ipv4() {
            return false;
        }
        let bits = to_bits(address);
        to_bits(self.range_start) <= bits && bits <= to_bits(self.range_end)
    }

    pub fn is_excluded(&self, address: IpAddr) -> bool {
        if self.gateway == Some(address) {
            return true;
        }
        has_broadcast(&self.subnet)
            && (address == self.subnet.network() || address == self.subnet.broadcast())
    }

    /// The address after `address`, wrapping from `range_end` back to
    /// `range_start`. Anything outside the range maps to `range_start`.
    pub fn next(&self, address: IpAddr) -> IpAddr {
        if !self.contains(address) || address == self.range_end {
            return self.range_start;
        }
        from_bits(to_bits(address) + 1, self.range_start)
    }

    /// The address before `address`, wrapping from `range_start` back to
    /// `range_end`. Anything outside the range maps to `range_end`.
    pub fn prev(&self, address: IpAddr) -> IpAddr {
        if !self.contains(address) || address == self.range_start {
            return self.range_end;
        }
        from_bits(to_bits(address) - 1, self.range_start)
    }

    /// Number of addresses between the bounds, excluded ones included. A
    /// full IPv6 range would need 2^128 which we saturate.
    pub fn size(&self) -> u128 {
        (to_bits(self.range_end) - to_bits(self.range_start)).saturating_add(1)
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        if self.range_start.is_ipv4() != other.range_start.is_ipv4() {
            return false;
        }
        to_bits(self.range_start) <= to_bits(other.range_end)
            && to_bits(other.range_start) <= to_bits(self.range_end)
    }
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.range_start, self.range_end)
    }
}

// Point-to-point subnets (/31, /127) and host routes have no network or
// broadcast address to keep free.
fn has_broadcast(subnet: &IpNet) -> bool {
    subnet.max_prefix_len() - subnet.prefix_len() >= 2
}

fn first_host(subnet: &IpNet) -> IpAddr {
    let network = subnet.network();
    if has_broadcast(subnet) {
        from_bits(to_bits(network) + 1, network)
    } else {
        network
    }
}

fn last_host(subnet: &IpNet) -> IpAddr {
    let broadcast = subnet.broadcast();
    if has_broadcast(subnet) {
        from_bits(to_bits(broadcast) - 1, broadcast)
    } else {
        broadcast
    }
}

pub(crate) fn to_bits(address: IpAddr) -> u128 {
    match address {
        IpAddr::V4(v4) => u128::from(v4.to_bits()),
        IpAddr::V6(v6) => v6.to_bits(),
    }
}

// `family` only selects the address family of the result.
pub(crate) fn from_bits(bits: u128, family: IpAddr) -> IpAddr {
    match family {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from_bits(bits as u32)),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from_bits(bits)),
    }
}
