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
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::errors::{StoreError, StoreResult};

/// Acquires the exclusive lock guarding a store. The returned guard holds
/// the lock until it is dropped.
pub trait Locker {
    type Guard;

    fn lock(&self, path: &Path) -> StoreResult<Self::Guard>;
}

/// Blocking `flock(LOCK_EX)` on a lock file. The kernel drops the lock when
/// the descriptor is closed, so a killed process never leaves it behind.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileLocker;

pub struct FileLock {
    path: PathBuf,
    _flock: Flock<File>,
}

impl FileLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        tracing::trace!(path = %self.path.display(), "releasing store lock");
    }
}

impl Locker for FileLocker {
    type Guard = FileLock;

    fn lock(&self, path: &Path) -> StoreResult<FileLock> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|error| StoreError::io(path, error))?;

        loop {
            match Flock::lock(file, FlockArg::LockExclusive) {
                Ok(flock) => {
                    tracing::trace!(path = %path.display(), "acquired store lock");
                    return Ok(FileLock {
                        path: path.to_path_buf(),
                        _flock: flock,
                    });
                }
                // Interrupted by a signal while waiting, try again.
                Err((unlocked, Errno::EINTR)) => file = unlocked,
                Err((_, errno)) => {
                    return Err(StoreError::Lock {
                        path: path.to_path_buf(),
                        error: io::Error::from(errno),
                    });
                }
            }
        }
    }
}
