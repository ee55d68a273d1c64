use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use fs2::FileExt;
use let_ledger::{Ledger, LedgerSnapshot, SnapshotError};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no ledger deployed at {0} (run `let deploy` first)")]
    Missing(PathBuf),
    #[error("a ledger is already deployed at {0} (use --force to replace it)")]
    AlreadyDeployed(PathBuf),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed state file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("state file {path} failed validation: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },
}

/// JSON file holding the snapshot of one deployed ledger.
///
/// Access goes through an advisory lock on a sidecar `<state>.lock` file:
/// mutations hold it exclusively from load to save, reads hold it shared.
#[derive(Clone, Debug)]
pub struct StateStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Held advisory lock; released on drop.
struct StateLock {
    file: File,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("state"));
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the ledger under a shared lock.
    pub fn read(&self) -> Result<Ledger, StoreError> {
        let _lock = self.lock(false)?;
        self.load()
    }

    /// Loads, applies `op` and saves while holding the exclusive lock, so
    /// concurrent invocations are applied one after another. Nothing is
    /// written when `op` fails.
    pub fn update<E>(&self, op: impl FnOnce(&mut Ledger) -> Result<(), E>) -> Result<Ledger, E>
    where
        E: From<StoreError>,
    {
        let _lock = self.lock(true)?;
        let mut ledger = self.load()?;
        op(&mut ledger)?;
        self.save(&ledger)?;
        Ok(ledger)
    }

    /// Writes a freshly deployed ledger; refuses to overwrite unless `force`.
    pub fn create(&self, ledger: &Ledger, force: bool) -> Result<(), StoreError> {
        let _lock = self.lock(true)?;
        if self.exists() && !force {
            return Err(StoreError::AlreadyDeployed(self.path.clone()));
        }
        self.save(ledger)
    }

    fn lock(&self, exclusive: bool) -> Result<StateLock, StoreError> {
        self.ensure_parent()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|source| self.io_at(&self.lock_path, source))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|source| self.io_at(&self.lock_path, source))?;
        Ok(StateLock { file })
    }

    fn load(&self) -> Result<Ledger, StoreError> {
        if !self.exists() {
            return Err(StoreError::Missing(self.path.clone()));
        }
        let bytes = fs::read(&self.path).map_err(|source| self.io(source))?;
        let snapshot: LedgerSnapshot =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), digest = %snapshot.digest_hex(), "state loaded");
        Ledger::restore(snapshot).map_err(|source| StoreError::Snapshot {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes a uniquely named temp file next to the state and renames it
    /// over the old one, so readers only ever see complete snapshots.
    fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        let snapshot = ledger.snapshot();
        let json = serde_json::to_vec_pretty(&snapshot).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let dir = self.ensure_parent()?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| self.io(source))?;
        tmp.write_all(&json).map_err(|source| self.io(source))?;
        tmp.as_file().sync_all().map_err(|source| self.io(source))?;
        tmp.persist(&self.path).map_err(|err| self.io(err.error))?;
        debug!(path = %self.path.display(), digest = %snapshot.digest_hex(), "state saved");
        Ok(())
    }

    fn ensure_parent(&self) -> Result<PathBuf, StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| self.io_at(&dir, source))?;
        Ok(dir)
    }

    fn io(&self, source: std::io::Error) -> StoreError {
        self.io_at(&self.path, source)
    }

    fn io_at(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use let_ledger::Address;

    use super::*;

    fn deployed() -> (Ledger, Address) {
        let owner = Address::new([0xaa; 20]);
        (Ledger::new(owner, "LET coin", "LET").unwrap(), owner)
    }

    #[test]
    fn save_then_load_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested").join("state.json"));
        let (mut ledger, owner) = deployed();
        ledger.set_max_emission(&owner, 100).unwrap();
        ledger.mint(&owner, owner, 42).unwrap();
        store.create(&ledger, false).unwrap();
        let loaded = store.read().unwrap();
        assert_eq!(loaded, ledger);
        let leftovers: Vec<_> = fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 2, "only state and lock files remain: {leftovers:?}");
    }

    #[test]
    fn create_refuses_to_clobber_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let (ledger, _) = deployed();
        store.create(&ledger, false).unwrap();
        assert!(matches!(
            store.create(&ledger, false),
            Err(StoreError::AlreadyDeployed(_))
        ));
        store.create(&ledger, true).unwrap();
    }

    #[test]
    fn missing_and_corrupt_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(matches!(store.read(), Err(StoreError::Missing(_))));

        fs::write(store.path(), b"{not json").unwrap();
        assert!(matches!(store.read(), Err(StoreError::Json { .. })));
    }

    #[test]
    fn failed_update_leaves_the_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let (ledger, owner) = deployed();
        store.create(&ledger, false).unwrap();
        let before = fs::read(store.path()).unwrap();

        let stranger = Address::new([0xbb; 20]);
        let err = store
            .update(|l| l.mint(&stranger, owner, 1).map_err(anyhow::Error::from))
            .unwrap_err();
        assert!(err.downcast_ref::<let_ledger::LedgerError>().is_some());
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn concurrent_updates_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let (ledger, owner) = deployed();
        store.create(&ledger, false).unwrap();

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .update(|l| l.mint(&owner, owner, 1).map_err(anyhow::Error::from))
                            .unwrap();
                    }
                })
            })
            .collect();
        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let ledger = store.read().unwrap();
                    assert!(ledger.total_supply() <= 200);
                }
            })
        };
        for handle in writers {
            handle.join().unwrap();
        }
        reader.join().unwrap();

        let ledger = store.read().unwrap();
        assert_eq!(ledger.total_supply(), 200);
        assert_eq!(ledger.balance_of(&owner), 200);
    }

    #[test]
    fn edited_state_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let (mut ledger, owner) = deployed();
        ledger.mint(&owner, owner, 5).unwrap();
        store.save(&ledger).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
        value["total_supply"] = serde_json::Value::String("6".into());
        fs::write(store.path(), serde_json::to_vec(&value).unwrap()).unwrap();

        assert!(matches!(store.read(), Err(StoreError::Snapshot { .. })));
    }
}
