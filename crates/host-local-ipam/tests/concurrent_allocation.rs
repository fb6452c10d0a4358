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
use std::net::IpAddr;
use std::thread;

use host_local_ipam::store::{DiskStore, Store};
use host_local_ipam::{IpamError, allocate, release};

mod common;

use common::config;

const NUM_THREADS: usize = 8;
const ALLOCATIONS_PER_THREAD: usize = 10;

// Every thread opens its own store session per call, so each one takes the
// flock through its own open file description, just like separate plugin
// processes would.
#[test]
fn test_concurrent_allocations_never_collide() -> Result<(), eyre::Report> {
    let dir = tempfile::tempdir()?;
    let config = config(dir.path(), "10.20.0.0/24", "");

    let addresses: Vec<IpAddr> = thread::scope(|scope| {
        let workers: Vec<_> = (0..NUM_THREADS)
            .map(|t| {
                let config = &config;
                scope.spawn(move || -> Result<Vec<IpAddr>, IpamError> {
                    let mut mine = Vec::new();
                    for i in 0..ALLOCATIONS_PER_THREAD {
                        let allocation = allocate(config, &format!("t{t}-c{i}"), None)?;
                        mine.push(allocation.address.addr());
                    }
                    Ok(mine)
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .collect::<Result<Vec<_>, _>>()
            .map(|all| all.into_iter().flatten().collect())
    })?;

    assert_eq!(addresses.len(), NUM_THREADS * ALLOCATIONS_PER_THREAD);
    let unique: HashSet<IpAddr> = addresses.iter().copied().collect();
    assert_eq!(unique.len(), addresses.len(), "an address was handed out twice");

    let mut store = DiskStore::open(dir.path(), "testnet")?;
    assert_eq!(store.reservations()?.len(), addresses.len());
    store.close()?;
    Ok(())
}

#[test]
fn test_concurrent_allocate_and_release() -> Result<(), eyre::Report> {
    let dir = tempfile::tempdir()?;
    // 14 usable addresses for 8 threads churning through containers.
    let config = config(dir.path(), "10.30.0.0/28", "");

    thread::scope(|scope| {
        let workers: Vec<_> = (0..NUM_THREADS)
            .map(|t| {
                let config = &config;
                scope.spawn(move || -> Result<(), IpamError> {
                    for i in 0..ALLOCATIONS_PER_THREAD {
                        let id = format!("t{t}-c{i}");
                        allocate(config, &id, None)?;
                        release(config, &id, None)?;
                    }
                    allocate(config, &format!("t{t}-final"), None)?;
                    Ok(())
                })
            })
            .collect();
        workers
            .into_iter()
            .try_for_each(|w| w.join().unwrap())
    })?;

    let mut store = DiskStore::open(dir.path(), "testnet")?;
    let reservations = store.reservations()?;
    store.close()?;

    let owners: HashSet<String> = reservations.iter().map(|r| r.container_id.clone()).collect();
    let expected: HashSet<String> = (0..NUM_THREADS).map(|t| format!("t{t}-final")).collect();
    assert_eq!(owners, expected);
    assert_eq!(reservations.len(), NUM_THREADS);
    Ok(())
}
