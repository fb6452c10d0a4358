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

//! Host-local address management for container networks.
//!
//! Addresses come from one or more configured ranges and are recorded in a
//! per-network directory on the host, one file per reserved address, guarded
//! by an advisory lock so concurrent plugin invocations never hand out the
//! same address twice. Reservations of containers that disappeared without
//! a teardown are collected by comparing the store with the runtime's
//! inventory.

pub mod allocator;
pub mod cni;
pub mod config;
pub mod errors;
pub mod inventory;
pub mod logging;
pub mod operations;
pub mod range;
pub mod range_set;
pub mod reconciler;
pub mod store;

pub use allocator::IpAllocator;
pub use config::IpamConfig;
pub use errors::{ConfigError, InventoryError, IpamError, IpamResult, StoreError};
pub use inventory::{ContainerInventory, CrictlInventory};
pub use operations::{Allocation, allocate, release};
pub use range::AddressRange;
pub use range_set::RangeSet;
pub use reconciler::{ReconcileReport, Reconciler};
pub use store::{DiskStore, MemoryStore, Reservation, Store};
