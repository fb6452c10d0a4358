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

//! Reservation ledgers. A store holds the address to container mapping of
//! one range-set plus the cursor of the last handed out address. An open
//! store represents one locked session: nobody else can read or mutate the
//! same ledger until it is closed or dropped.

use std::net::IpAddr;
use std::time::SystemTime;

use crate::errors::StoreResult;

pub mod disk;
pub mod lock;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reservation {
    pub address: IpAddr,
    pub container_id: String,
}

pub trait Store {
    /// Inserts the reservation unless `address` is already taken. Returns
    /// `false` when it was taken, which is not an error.
    fn reserve(&mut self, address: IpAddr, container_id: &str) -> StoreResult<bool>;

    /// Drops the reservation owned by `container_id` and returns the freed
    /// address.
    fn release_by_container(&mut self, container_id: &str) -> StoreResult<Option<IpAddr>>;

    fn release_by_address(&mut self, address: IpAddr) -> StoreResult<bool>;

    /// All reservations, ordered by address.
    fn reservations(&self) -> StoreResult<Vec<Reservation>>;

    /// When the reservation on `address` was committed, `None` if the
    /// address is free.
    fn reserved_at(&self, address: IpAddr) -> StoreResult<Option<SystemTime>>;

    fn last_reserved_address(&self) -> StoreResult<Option<IpAddr>>;

    fn set_last_reserved_address(&mut self, address: IpAddr) -> StoreResult<()>;

    /// Ends the session. Calling it again is a no-op.
    fn close(&mut self) -> StoreResult<()>;

    fn reservation_for(&self, container_id: &str) -> StoreResult<Option<IpAddr>> {
        Ok(self
            .reservations()?
            .into_iter()
            .find(|r| r.container_id == container_id)
            .map(|r| r.address))
    }
}
