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
use std::fs::{self, File};
use std::io::{self, Write};
use std::net::IpAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use tempfile::NamedTempFile;

use super::lock::{FileLocker, Locker};
use super::{Reservation, Store};
use crate::errors::{StoreError, StoreResult};

pub const DEFAULT_DATA_DIR: &str = "/var/lib/cni/networks";

const LOCK_FILE: &str = "lock";
const LAST_RESERVED_FILE: &str = "last_reserved_ip";
const PENDING_PREFIX: &str = ".pending-";

/// File backed reservation ledger living in `<data_dir>/<name>/`.
///
/// Every reservation is a file named after the address whose first line is
/// the owning container ID. Writes go to a pending file in the same
/// directory first and are then linked into place, so an insert either
/// lands completely or not at all, and an existing reservation is never
/// overwritten. Each mutation fsyncs the directory before returning.
pub struct DiskStore<L: Locker = FileLocker> {
    dir: PathBuf,
    lock: Option<L::Guard>,
}

impl DiskStore<FileLocker> {
    /// Opens (creating it on first use) the ledger called `name`, blocking
    /// until the store lock is ours.
    pub fn open(data_dir: &Path, name: &str) -> StoreResult<Self> {
        Self::open_with_locker(data_dir, name, &FileLocker)
    }
}

impl<L: Locker> DiskStore<L> {
    pub fn open_with_locker(data_dir: &Path, name: &str, locker: &L) -> StoreResult<Self> {
        validate_name(name)?;

        let dir = data_dir.join(name);
        fs::create_dir_all(&dir).map_err(|error| StoreError::io(&dir, error))?;

        let lock = locker.lock(&dir.join(LOCK_FILE))?;
        let store = DiskStore {
            dir,
            lock: Some(lock),
        };
        store.sweep_pending()?;

        tracing::debug!(dir = %store.dir.display(), "opened reservation store");
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_open(&self) -> bool {
        self.lock.is_some()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.lock.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn address_path(&self, address: IpAddr) -> PathBuf {
        self.dir.join(address.to_string())
    }

    fn sync_dir(&self) -> StoreResult<()> {
        File::open(&self.dir)
            .and_then(|dir| dir.sync_all())
            .map_err(|error| StoreError::io(&self.dir, error))
    }

    /// Writes `contents` to a new pending file and flushes it to disk.
    fn pending_file(&self, contents: &str) -> StoreResult<NamedTempFile> {
        let mut pending = tempfile::Builder::new()
            .prefix(PENDING_PREFIX)
            .permissions(fs::Permissions::from_mode(0o644))
            .tempfile_in(&self.dir)
            .map_err(|error| StoreError::io(&self.dir, error))?;
        pending
            .write_all(contents.as_bytes())
            .and_then(|_| pending.as_file().sync_all())
            .map_err(|error| StoreError::io(pending.path(), error))?;
        Ok(pending)
    }

    // Pending files only survive a crash between writing and linking.
    fn sweep_pending(&self) -> StoreResult<()> {
        let entries = fs::read_dir(&self.dir).map_err(|error| StoreError::io(&self.dir, error))?;
        for entry in entries {
            let entry = entry.map_err(|error| StoreError::io(&self.dir, error))?;
            if entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(PENDING_PREFIX))
            {
                tracing::warn!(path = %entry.path().display(), "removing leftover pending file");
                fs::remove_file(entry.path())
                    .map_err(|error| StoreError::io(entry.path(), error))?;
            }
        }
        Ok(())
    }

    /// Every reservation file in the directory, in address order. Anything
    /// whose name is not an address (lock, cursor, pending files) is skipped.
    fn reservation_files(&self) -> StoreResult<Vec<(IpAddr, PathBuf)>> {
        let entries = fs::read_dir(&self.dir).map_err(|error| StoreError::io(&self.dir, error))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| StoreError::io(&self.dir, error))?;
            let Some(address) = entry
                .file_name()
                .to_str()
                .and_then(|name| IpAddr::from_str(name).ok())
            else {
                continue;
            };
            files.push((address, entry.path()));
        }
        files.sort();
        Ok(files)
    }

    fn read_owner(&self, path: &Path) -> StoreResult<String> {
        let contents = fs::read(path).map_err(|error| StoreError::io(path, error))?;
        let contents = String::from_utf8(contents).map_err(|_| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: "reservation is not valid UTF-8".to_string(),
        })?;
        let owner = contents.lines().next().unwrap_or_default().trim();
        if owner.is_empty() {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: "reservation has no container ID".to_string(),
            });
        }
        Ok(owner.to_string())
    }
}

impl<L: Locker> Store for DiskStore<L> {
    fn reserve(&mut self, address: IpAddr, container_id: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        let path = self.address_path(address);
        // Under the lock nobody else can create it between this check and
        // the link below, so a taken address costs no write.
        if path
            .try_exists()
            .map_err(|error| StoreError::io(&path, error))?
        {
            return Ok(false);
        }
        let pending = self.pending_file(container_id)?;

        match pending.persist_noclobber(&path) {
            Ok(_) => {
                self.sync_dir()?;
                tracing::debug!(%address, container_id, "reserved address");
                Ok(true)
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::io(path, e.error)),
        }
    }

    fn release_by_container(&mut self, container_id: &str) -> StoreResult<Option<IpAddr>> {
        self.ensure_open()?;
        let mut released = Vec::new();
        for (address, path) in self.reservation_files()? {
            if self.read_owner(&path)? == container_id {
                fs::remove_file(&path).map_err(|error| StoreError::io(&path, error))?;
                released.push(address);
            }
        }

        if released.is_empty() {
            return Ok(None);
        }
        self.sync_dir()?;

        if released.len() > 1 {
            tracing::warn!(
                container_id,
                addresses = ?released,
                "container held more than one reservation, released all of them"
            );
        }
        released.sort();
        Ok(released.first().copied())
    }

    fn release_by_address(&mut self, address: IpAddr) -> StoreResult<bool> {
        self.ensure_open()?;
        let path = self.address_path(address);
        match fs::remove_file(&path) {
            Ok(()) => {
                self.sync_dir()?;
                Ok(true)
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(StoreError::io(path, error)),
        }
    }

    fn reservations(&self) -> StoreResult<Vec<Reservation>> {
        self.ensure_open()?;
        self.reservation_files()?
            .into_iter()
            .map(|(address, path)| {
                Ok(Reservation {
                    address,
                    container_id: self.read_owner(&path)?,
                })
            })
            .collect()
    }

    fn reserved_at(&self, address: IpAddr) -> StoreResult<Option<SystemTime>> {
        self.ensure_open()?;
        let path = self.address_path(address);
        match fs::metadata(&path).and_then(|metadata| metadata.modified()) {
            Ok(modified) => Ok(Some(modified)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(StoreError::io(path, error)),
        }
    }

    fn last_reserved_address(&self) -> StoreResult<Option<IpAddr>> {
        self.ensure_open()?;
        let path = self.dir.join(LAST_RESERVED_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(StoreError::io(path, error)),
        };
        IpAddr::from_str(contents.trim())
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path,
                reason: format!("invalid last reserved address {:?}: {e}", contents.trim()),
            })
    }

    fn set_last_reserved_address(&mut self, address: IpAddr) -> StoreResult<()> {
        self.ensure_open()?;
        let path = self.dir.join(LAST_RESERVED_FILE);
        let pending = self.pending_file(&address.to_string())?;
        pending
            .persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;
        self.sync_dir()
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.lock.take().is_some() {
            tracing::debug!(dir = %self.dir.display(), "closed reservation store");
        }
        Ok(())
    }
}

/// The name becomes a directory under the data dir, so it has to be a single
/// plain path component.
pub fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\0')
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_reserve_is_insert_if_absent() {
        let dir = tempdir().unwrap();
        let mut store = DiskStore::open(dir.path(), "net").unwrap();

        assert!(store.reserve(ip("10.0.0.2"), "c1").unwrap());
        assert!(!store.reserve(ip("10.0.0.2"), "c2").unwrap());

        let reservations = store.reservations().unwrap();
        assert_eq!(
            reservations,
            vec![Reservation {
                address: ip("10.0.0.2"),
                container_id: "c1".to_string(),
            }]
        );
        assert_eq!(store.reservation_for("c1").unwrap(), Some(ip("10.0.0.2")));
        assert_eq!(store.reservation_for("c2").unwrap(), None);
    }

    #[test]
    fn test_release_by_container_and_address() {
        let dir = tempdir().unwrap();
        let mut store = DiskStore::open(dir.path(), "net").unwrap();
        store.reserve(ip("10.0.0.2"), "c1").unwrap();
        store.reserve(ip("10.0.0.3"), "c2").unwrap();

        assert_eq!(
            store.release_by_container("c1").unwrap(),
            Some(ip("10.0.0.2"))
        );
        assert_eq!(store.release_by_container("c1").unwrap(), None);

        assert!(store.release_by_address(ip("10.0.0.3")).unwrap());
        assert!(!store.release_by_address(ip("10.0.0.3")).unwrap());
        assert!(store.reservations().unwrap().is_empty());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut store = DiskStore::open(dir.path(), "net").unwrap();
            store.reserve(ip("fd00::5"), "c1").unwrap();
            store.set_last_reserved_address(ip("fd00::5")).unwrap();
            // Dropped without close() on purpose.
        }

        let store = DiskStore::open(dir.path(), "net").unwrap();
        assert_eq!(store.last_reserved_address().unwrap(), Some(ip("fd00::5")));
        assert_eq!(store.reservation_for("c1").unwrap(), Some(ip("fd00::5")));
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let dir = tempdir().unwrap();
        let mut store = DiskStore::open(dir.path(), "net").unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(!store.is_open());
        assert!(matches!(
            store.reserve(ip("10.0.0.2"), "c1"),
            Err(StoreError::Closed)
        ));
        assert!(matches!(store.reservations(), Err(StoreError::Closed)));
    }

    #[test]
    fn test_invalid_names() {
        let dir = tempdir().unwrap();
        for name in ["", ".", "..", "a/b"] {
            assert!(
                matches!(
                    DiskStore::open(dir.path(), name),
                    Err(StoreError::InvalidName(_))
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_corrupt_cursor_and_reservation() {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path(), "net").unwrap();

        fs::write(store.dir().join(LAST_RESERVED_FILE), "not-an-address").unwrap();
        assert!(matches!(
            store.last_reserved_address(),
            Err(StoreError::Corrupt { .. })
        ));

        fs::write(store.dir().join("10.0.0.9"), "").unwrap();
        assert!(matches!(
            store.reservations(),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_foreign_files_are_ignored_and_pending_files_swept() {
        let dir = tempdir().unwrap();
        let net_dir = dir.path().join("net");
        fs::create_dir_all(&net_dir).unwrap();
        fs::write(net_dir.join(".pending-abc"), "c9").unwrap();
        fs::write(net_dir.join("README"), "hello").unwrap();
        fs::write(net_dir.join("10.0.0.4"), "c4\neth0\n").unwrap();

        let store = DiskStore::open(dir.path(), "net").unwrap();
        assert!(!net_dir.join(".pending-abc").exists());
        assert_eq!(
            store.reservations().unwrap(),
            vec![Reservation {
                address: ip("10.0.0.4"),
                container_id: "c4".to_string(),
            }]
        );
    }

    #[test]
    fn test_data_dir_is_a_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain-file");
        fs::write(&file, "").unwrap();
        assert!(matches!(
            DiskStore::open(&file, "net"),
            Err(StoreError::Io { .. })
        ));
    }

    #[test]
    fn test_taken_address_is_left_untouched() {
        let dir = tempdir().unwrap();
        let mut store = DiskStore::open(dir.path(), "net").unwrap();
        store.reserve(ip("10.0.0.2"), "c1").unwrap();

        let path = store.dir().join("10.0.0.2");
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        assert!(!store.reserve(ip("10.0.0.2"), "c2").unwrap());
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "c1");

        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.starts_with(PENDING_PREFIX))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn test_reserved_at() {
        let dir = tempdir().unwrap();
        let mut store = DiskStore::open(dir.path(), "net").unwrap();
        assert_eq!(store.reserved_at(ip("10.0.0.2")).unwrap(), None);

        store.reserve(ip("10.0.0.2"), "c1").unwrap();
        let reserved_at = store.reserved_at(ip("10.0.0.2")).unwrap().unwrap();
        assert_eq!(
            reserved_at,
            fs::metadata(store.dir().join("10.0.0.2"))
                .unwrap()
                .modified()
                .unwrap()
        );

        store.release_by_address(ip("10.0.0.2")).unwrap();
        assert_eq!(store.reserved_at(ip("10.0.0.2")).unwrap(), None);
    }
}
