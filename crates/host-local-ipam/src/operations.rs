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

//! The two things a plugin invocation does: hand a container an address, or
//! take it back and collect what other containers left behind.
//!
//! Each call is one locked store session. The inventory is queried before
//! the store is opened so a slow runtime never holds the lock; reservations
//! committed after the query started are never collected.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::allocator::{IpAllocator, validate_container_id};
use crate::config::{IpamConfig, Route};
use crate::errors::{ConfigError, IpamResult};
use crate::inventory::{ContainerInventory, LiveSnapshot};
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::store::{DiskStore, Reservation, Store};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// The reserved address with the prefix length of its subnet.
    pub address: IpNet,
    pub gateway: Option<IpAddr>,
    pub routes: Vec<Route>,
}

/// Reserves an address for `container_id` in the store named by the config.
///
/// With `gcOnAdd` set and an inventory available, orphans are collected
/// first. Collection is best effort here: failing to list or release
/// orphans is logged and does not fail the allocation.
pub fn allocate(
    config: &IpamConfig,
    container_id: &str,
    inventory: Option<&dyn ContainerInventory>,
) -> IpamResult<Allocation> {
    let live = match inventory {
        Some(inventory) if config.gc_on_add => match LiveSnapshot::take(inventory) {
            Ok(live) => Some(live),
            Err(e) => {
                tracing::warn!(error = %e, "skipping orphan collection, inventory unavailable");
                None
            }
        },
        _ => None,
    };

    let mut store = DiskStore::open(&config.data_dir, &config.name)?;
    let result = allocate_in_store(config, &mut store, container_id, live.as_ref());
    finish(store, result)
}

/// Releases `container_id` and, when an inventory is given, every other
/// reservation whose container is gone. A failing inventory fails the call
/// before anything is released.
pub fn release(
    config: &IpamConfig,
    container_id: &str,
    inventory: Option<&dyn ContainerInventory>,
) -> IpamResult<ReconcileReport> {
    let live = inventory.map(LiveSnapshot::take).transpose()?;

    let mut store = DiskStore::open(&config.data_dir, &config.name)?;
    let result = release_in_store(config, &mut store, container_id, live);
    finish(store, result)
}

/// [`allocate`] against an already opened store session.
pub fn allocate_in_store<S: Store + ?Sized>(
    config: &IpamConfig,
    store: &mut S,
    container_id: &str,
    live: Option<&LiveSnapshot>,
) -> IpamResult<Allocation> {
    validate_container_id(container_id)?;
    let mut allocator = IpAllocator::new(&config.ranges, store);

    if let Some(live) = live {
        let mut containers = live.containers.clone();
        containers.insert(container_id.to_string());
        let collected = Reconciler::new(&mut allocator)
            .snapshot_started(live.started)
            .reconcile(&containers);
        match collected {
            Ok(report) if !report.released.is_empty() => {
                tracing::info!(released = report.released.len(), "collected orphaned reservations")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "orphan collection failed, allocating anyway"),
        }
    }

    let address = allocator.get(container_id, config.requested_address)?;
    let range = config
        .ranges
        .range_for(address)
        .ok_or(ConfigError::RequestedOutsidePool(address))?;
    let address = IpNet::new(address, range.subnet().prefix_len())
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

    Ok(Allocation {
        address,
        gateway: range.gateway(),
        routes: config.routes.clone(),
    })
}

/// [`release`] against an already opened store session.
pub fn release_in_store<S: Store + ?Sized>(
    config: &IpamConfig,
    store: &mut S,
    container_id: &str,
    live: Option<LiveSnapshot>,
) -> IpamResult<ReconcileReport> {
    let mut allocator = IpAllocator::new(&config.ranges, store);

    // The requester goes whatever the runtime still reports for it.
    let mut report = ReconcileReport::default();
    if let Some(address) = allocator.release(container_id)? {
        report.released.push(Reservation {
            address,
            container_id: container_id.to_string(),
        });
    }

    if let Some(live) = live {
        let others = Reconciler::new(&mut allocator)
            .snapshot_started(live.started)
            .reconcile(&live.containers)?;
        report.released.extend(others.released);
    }
    Ok(report)
}

// Closes the session whatever the outcome. An operation error wins over a
// close error.
fn finish<S: Store, T>(mut store: S, result: IpamResult<T>) -> IpamResult<T> {
    let closed = store.close();
    let value = result?;
    closed?;
    Ok(value)
}
