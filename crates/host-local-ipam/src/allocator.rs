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
use std::time::SystemTime;

use crate::errors::{ConfigError, IpamError, IpamResult};
use crate::range_set::RangeSet;
use crate::store::{Reservation, Store};

/// Container IDs are stored as the first line of a reservation file, so
/// they must be non-empty and free of whitespace and control characters.
pub fn validate_container_id(container_id: &str) -> Result<(), ConfigError> {
    if container_id.is_empty()
        || container_id
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(ConfigError::InvalidContainerId(container_id.to_string()));
    }
    Ok(())
}

/// IpAllocator hands out addresses of a [`RangeSet`] to containers, using a
/// [`Store`] session as the source of truth for what is taken.
///
/// Candidates are tried with `Store::reserve` directly, so there is no
/// window between "is it free" and "take it" inside one locked session.
/// Scans resume after the last handed out address, which spreads
/// allocations round-robin over the pool instead of immediately reusing
/// addresses that were just freed.
///
/// A container holds at most one address: asking again for a container that
/// already has a reservation returns that reservation.
pub struct IpAllocator<'a, S: Store + ?Sized> {
    ranges: &'a RangeSet,
    store: &'a mut S,
}

impl<'a, S: Store + ?Sized> IpAllocator<'a, S> {
    pub fn new(ranges: &'a RangeSet, store: &'a mut S) -> Self {
        IpAllocator { ranges, store }
    }

    /// Returns the address for `container_id`, reserving one if needed.
    ///
    /// With `requested` set only that address is tried: it must be in the
    /// pool, must not be a network, broadcast or gateway address, and must
    /// be free. There is no fallback to scanning.
    pub fn get(&mut self, container_id: &str, requested: Option<IpAddr>) -> IpamResult<IpAddr> {
        validate_container_id(container_id)?;
        if let Some(held) = self.store.reservation_for(container_id)? {
            if let Some(requested) = requested
                && requested != held
            {
                return Err(ConfigError::ConflictingRequest {
                    container_id: container_id.to_string(),
                    held,
                    requested,
                }
                .into());
            }
            tracing::info!(container_id, address = %held, "container already holds an address");
            return Ok(held);
        }

        let address = match requested {
            Some(requested) => self.reserve_requested(container_id, requested)?,
            None => self.reserve_next(container_id)?,
        };
        self.store.set_last_reserved_address(address)?;

        tracing::info!(container_id, %address, "allocated address");
        Ok(address)
    }

    fn reserve_requested(&mut self, container_id: &str, requested: IpAddr) -> IpamResult<IpAddr> {
        if !self.ranges.contains(requested) {
            return Err(ConfigError::RequestedOutsidePool(requested).into());
        }
        if self.ranges.is_excluded(requested) {
            return Err(ConfigError::RequestedExcluded(requested).into());
        }
        if !self.store.reserve(requested, container_id)? {
            return Err(IpamError::AddressInUse(requested));
        }
        Ok(requested)
    }

    fn reserve_next(&mut self, container_id: &str) -> IpamResult<IpAddr> {
        let ranges = self.ranges;
        let cursor = self.store.last_reserved_address()?;

        // The scan visits each address once, so running out of candidates
        // means the whole pool is taken.
        for candidate in ranges.scan_from(cursor) {
            if ranges.is_excluded(candidate) {
                continue;
            }
            if self.store.reserve(candidate, container_id)? {
                return Ok(candidate);
            }
            tracing::trace!(%candidate, "address taken");
        }

        Err(IpamError::PoolExhausted(ranges.to_string()))
    }

    /// Frees whatever `container_id` holds. Releasing a container without a
    /// reservation succeeds, so teardown can be retried safely.
    pub fn release(&mut self, container_id: &str) -> IpamResult<Option<IpAddr>> {
        validate_container_id(container_id)?;
        let released = self.store.release_by_container(container_id)?;
        match released {
            Some(address) => tracing::info!(container_id, %address, "released address"),
            None => tracing::debug!(container_id, "no reservation to release"),
        }
        Ok(released)
    }

    pub fn list_containers(&self) -> IpamResult<Vec<String>> {
        Ok(self
            .reservations()?
            .into_iter()
            .map(|r| r.container_id)
            .collect())
    }

    pub fn reservations(&self) -> IpamResult<Vec<Reservation>> {
        Ok(self.store.reservations()?)
    }

    pub fn reserved_at(&self, address: IpAddr) -> IpamResult<Option<SystemTime>> {
        Ok(self.store.reserved_at(address)?)
    }
}
