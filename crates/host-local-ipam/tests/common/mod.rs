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
#![allow(dead_code)]

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use host_local_ipam::errors::StoreResult;
use host_local_ipam::store::lock::{FileLock, FileLocker, Locker};
use host_local_ipam::{AddressRange, ContainerInventory, InventoryError, IpamConfig, RangeSet};

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn single_range(subnet: &str, gateway: Option<&str>) -> RangeSet {
    RangeSet::new(vec![
        AddressRange::new(subnet.parse().unwrap(), None, None, gateway.map(ip)).unwrap(),
    ])
    .unwrap()
}

/// Network configuration for `subnet` storing reservations under `data_dir`.
/// `extra` is spliced into the ipam object and must start with a comma.
pub fn config(data_dir: &Path, subnet: &str, extra: &str) -> IpamConfig {
    let conf = format!(
        r#"{{
            "cniVersion": "0.2.0",
            "name": "testnet",
            "ipam": {{
                "type": "carbide-host-local-ipam",
                "subnet": "{subnet}",
                "dataDir": {data_dir:?}
                {extra}
            }}
        }}"#,
        data_dir = data_dir.display().to_string(),
    );
    IpamConfig::load(conf.as_bytes(), "").unwrap()
}

/// Backdates the reservation of `address`, as if it was made long before
/// any inventory listing the test takes afterwards.
pub fn backdate_reservation(data_dir: &Path, network: &str, address: &str) {
    let file = std::fs::File::options()
        .write(true)
        .open(data_dir.join(network).join(address))
        .unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(3600))
        .unwrap();
}

/// File locker that remembers every lock it handed out.
#[derive(Clone, Default)]
pub struct RecordingLocker {
    pub locked: Arc<Mutex<Vec<PathBuf>>>,
}

impl Locker for RecordingLocker {
    type Guard = FileLock;

    fn lock(&self, path: &Path) -> StoreResult<FileLock> {
        self.locked.lock().unwrap().push(path.to_path_buf());
        FileLocker.lock(path)
    }
}

/// Inventory answering from a fixed list, counting how often it was asked.
#[derive(Default)]
pub struct FakeInventory {
    pub live: Mutex<HashSet<String>>,
    pub calls: Mutex<usize>,
    pub broken: bool,
}

impl FakeInventory {
    pub fn with(ids: &[&str]) -> Self {
        FakeInventory {
            live: Mutex::new(ids.iter().map(|id| id.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn set(&self, ids: &[&str]) {
        *self.live.lock().unwrap() = ids.iter().map(|id| id.to_string()).collect();
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ContainerInventory for FakeInventory {
    fn live_containers(&self) -> Result<HashSet<String>, InventoryError> {
        *self.calls.lock().unwrap() += 1;
        if self.broken {
            return Err(InventoryError::Timeout {
                command: "fake".to_string(),
                timeout: Duration::from_secs(1),
            });
        }
        Ok(self.live.lock().unwrap().clone())
    }
}
