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
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::SystemTime;

use super::{Reservation, Store};
use crate::errors::{StoreError, StoreResult};

/// Non-persistent ledger with the same semantics as the disk store. Handy
/// for starting the allocator from a pre-populated table.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    reservations: BTreeMap<IpAddr, Entry>,
    last_reserved: Option<IpAddr>,
    closed: bool,
}

#[derive(Clone, Debug)]
struct Entry {
    container_id: String,
    reserved_at: SystemTime,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated reservations are dated at the epoch, i.e. older than
    /// anything reserved through the store.
    pub fn with_reservations<I, S>(reservations: I) -> Self
    where
        I: IntoIterator<Item = (IpAddr, S)>,
        S: Into<String>,
    {
        MemoryStore {
            reservations: reservations
                .into_iter()
                .map(|(address, id)| {
                    let entry = Entry {
                        container_id: id.into(),
                        reserved_at: SystemTime::UNIX_EPOCH,
                    };
                    (address, entry)
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_last_reserved(self, address: IpAddr) -> Self {
        MemoryStore {
            last_reserved: Some(address),
            ..self
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn reserve(&mut self, address: IpAddr, container_id: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        if self.reservations.contains_key(&address) {
            return Ok(false);
        }
        let entry = Entry {
            container_id: container_id.to_string(),
            reserved_at: SystemTime::now(),
        };
        self.reservations.insert(address, entry);
        Ok(true)
    }

    fn release_by_container(&mut self, container_id: &str) -> StoreResult<Option<IpAddr>> {
        self.ensure_open()?;
        let owned: Vec<IpAddr> = self
            .reservations
            .iter()
            .filter(|(_, entry)| entry.container_id == container_id)
            .map(|(address, _)| *address)
            .collect();
        for address in &owned {
            self.reservations.remove(address);
        }
        Ok(owned.first().copied())
    }

    fn release_by_address(&mut self, address: IpAddr) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(self.reservations.remove(&address).is_some())
    }

    fn reservations(&self) -> StoreResult<Vec<Reservation>> {
        self.ensure_open()?;
        Ok(self
            .reservations
            .iter()
            .map(|(address, entry)| Reservation {
                address: *address,
                container_id: entry.container_id.clone(),
            })
            .collect())
    }

    fn reserved_at(&self, address: IpAddr) -> StoreResult<Option<SystemTime>> {
        self.ensure_open()?;
        Ok(self.reservations.get(&address).map(|entry| entry.reserved_at))
    }

    fn last_reserved_address(&self) -> StoreResult<Option<IpAddr>> {
        self.ensure_open()?;
        Ok(self.last_reserved)
    }

    fn set_last_reserved_address(&mut self, address: IpAddr) -> StoreResult<()> {
        self.ensure_open()?;
        self.last_reserved = Some(address);
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        self.closed = true;
        Ok(())
    }
}
