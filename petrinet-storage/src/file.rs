//! File-backed persistence adapter.

use crate::error::StorageError;
use parking_lot::Mutex;
use petrinet_core::{CoreError, InstanceState, PersistenceAdapter};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Default time to wait for another writer to release an instance.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// On-disk envelope for one instance.
#[derive(Debug, Serialize, Deserialize)]
struct StoredInstance {
    /// CRC32C of the compact JSON encoding of `state`.
    checksum: String,
    state: InstanceState,
}

fn checksum_of(state: &InstanceState) -> Result<String, StorageError> {
    let data = serde_json::to_vec(state)?;
    Ok(format!("{:08x}", crc32c::crc32c(&data)))
}

/// Exclusive claim on one instance, held as `<id>.json.lock`.
///
/// The file is created with `create_new`, so at most one holder exists
/// across every adapter and process sharing the directory.
struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    fn acquire(path: PathBuf, timeout: Duration) -> Result<Self, StorageError> {
        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(StorageError::LockTimeout(path.display().to_string()));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

/// Stores each instance as `<dir>/<instance_id>.json`.
///
/// Every read goes to disk, so several adapters (or processes) may share a
/// directory. Writes to one instance are serialized by a lockfile next to it.
pub struct FileAdapter {
    dir: PathBuf,
    lock_timeout: Duration,

    /// Serializes this adapter's own writers before they contend on lockfiles.
    write_lock: Mutex<()>,
}

impl FileAdapter {
    /// Opens (creating if needed) an adapter rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        tracing::info!("Opened file storage at {}", dir.display());

        Ok(Self {
            dir,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            write_lock: Mutex::new(()),
        })
    }

    /// Sets how long a writer waits for a held instance lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn instance_path(&self, instance_id: &str) -> Result<PathBuf, StorageError> {
        let valid = !instance_id.is_empty()
            && !instance_id.starts_with('.')
            && !instance_id.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StorageError::InvalidInstanceId(instance_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", instance_id)))
    }

    /// Runs `f` while holding the write lock for `instance_id`.
    fn locked<T, E>(
        &self,
        instance_id: &str,
        f: impl FnOnce(&Path) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let path = self.instance_path(instance_id)?;
        let _local = self.write_lock.lock();
        let _lock = InstanceLock::acquire(path.with_extension("json.lock"), self.lock_timeout)?;
        f(&path)
    }

    /// Reads an instance from disk, verifying its checksum.
    pub fn load_state(&self, instance_id: &str) -> Result<InstanceState, StorageError> {
        let path = self.instance_path(instance_id)?;
        read_state(instance_id, &path)
    }

    /// Writes an instance to disk, replacing any previous version.
    pub fn save_state(&self, instance_id: &str, state: &InstanceState) -> Result<(), StorageError> {
        self.locked(instance_id, |path| write_state(instance_id, path, state))
    }

    /// Deletes an instance. Returns false if it did not exist.
    pub fn remove(&self, instance_id: &str) -> Result<bool, StorageError> {
        self.locked(instance_id, |path| -> Result<bool, StorageError> {
            if !path.exists() {
                return Ok(false);
            }
            fs::remove_file(path)?;
            Ok(true)
        })
    }

    /// Lists stored instance ids, sorted.
    pub fn instance_ids(&self) -> Result<Vec<String>, StorageError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn read_state(instance_id: &str, path: &Path) -> Result<InstanceState, StorageError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StorageError::InstanceNotFound(instance_id.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let stored: StoredInstance = serde_json::from_reader(BufReader::new(file))?;

    let actual = checksum_of(&stored.state)?;
    if actual != stored.checksum {
        return Err(StorageError::Corruption(format!(
            "instance {} checksum mismatch (stored {}, computed {})",
            instance_id, stored.checksum, actual
        )));
    }

    Ok(stored.state)
}

// Callers hold the instance lock; the temp path is shared per instance.
fn write_state(instance_id: &str, path: &Path, state: &InstanceState) -> Result<(), StorageError> {
    let stored = StoredInstance {
        checksum: checksum_of(state)?,
        state: state.clone(),
    };

    // Write-then-rename so readers never see a partial file
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&serde_json::to_vec_pretty(&stored)?)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    tracing::trace!("Saved instance {} to {:?}", instance_id, path);
    Ok(())
}

impl PersistenceAdapter for FileAdapter {
    fn load(&self, instance_id: &str) -> Result<InstanceState, CoreError> {
        Ok(self.load_state(instance_id)?)
    }

    fn save(&self, instance_id: &str, state: &InstanceState) -> Result<(), CoreError> {
        Ok(self.save_state(instance_id, state)?)
    }

    fn update(
        &self,
        instance_id: &str,
        apply: &mut dyn FnMut(&mut InstanceState) -> Result<(), CoreError>,
    ) -> Result<InstanceState, CoreError> {
        self.locked(instance_id, |path| -> Result<InstanceState, CoreError> {
            let mut state = read_state(instance_id, path)?;
            apply(&mut state)?;
            write_state(instance_id, path, &state)?;
            Ok(state)
        })
    }
}
