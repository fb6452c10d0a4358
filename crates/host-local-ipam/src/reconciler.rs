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
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, SystemTime};

use crate::allocator::IpAllocator;
use crate::errors::IpamResult;
use crate::store::{Reservation, Store};

// File timestamps come from a coarse kernel clock that can trail the
// process clock slightly.
const TIMESTAMP_SLACK: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub released: Vec<Reservation>,
}

/// Releases reservations held by containers that no longer exist on the
/// host. This repairs state left behind by teardowns that never ran, e.g.
/// when a container was killed hard.
pub struct Reconciler<'r, 'a, S: Store + ?Sized> {
    allocator: &'r mut IpAllocator<'a, S>,
    snapshot_started: Option<SystemTime>,
}

impl<'r, 'a, S: Store + ?Sized> Reconciler<'r, 'a, S> {
    pub fn new(allocator: &'r mut IpAllocator<'a, S>) -> Self {
        Reconciler {
            allocator,
            snapshot_started: None,
        }
    }

    /// The live set was requested at `started`. Reservations committed
    /// after that may belong to containers the listing could not show yet,
    /// so they are kept.
    pub fn snapshot_started(mut self, started: SystemTime) -> Self {
        self.snapshot_started = Some(started);
        self
    }

    /// Releases every persisted container missing from `live`. A failed
    /// release does not stop the others; the first failure is returned once
    /// all orphans were attempted.
    pub fn reconcile(&mut self, live: &HashSet<String>) -> IpamResult<ReconcileReport> {
        let mut persisted: BTreeMap<String, Vec<Reservation>> = BTreeMap::new();
        for reservation in self.allocator.reservations()? {
            persisted
                .entry(reservation.container_id.clone())
                .or_default()
                .push(reservation);
        }
        let orphans: Vec<(&String, &Vec<Reservation>)> = persisted
            .iter()
            .filter(|(id, _)| !live.contains(*id))
            .collect();
        tracing::debug!(
            persisted = persisted.len(),
            live = live.len(),
            orphans = ?orphans.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            "reconciling reservations"
        );

        let mut report = ReconcileReport::default();
        let mut first_error = None;
        for (container_id, reservations) in orphans {
            let result = match self.is_recent(reservations) {
                Ok(true) => {
                    tracing::debug!(%container_id, "keeping reservation newer than the live set");
                    continue;
                }
                Ok(false) => self.allocator.release(container_id),
                Err(e) => Err(e),
            };
            match result {
                Ok(Some(address)) => report.released.push(Reservation {
                    address,
                    container_id: container_id.clone(),
                }),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(
                        %container_id,
                        error = %e,
                        "failed to release orphaned reservation"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn is_recent(&self, reservations: &[Reservation]) -> IpamResult<bool> {
        let Some(started) = self.snapshot_started else {
            return Ok(false);
        };
        let cutoff = started.checked_sub(TIMESTAMP_SLACK).unwrap_or(started);
        for reservation in reservations {
            if let Some(reserved_at) = self.allocator.reserved_at(reservation.address)?
                && reserved_at >= cutoff
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
