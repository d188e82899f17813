//! Safe Store: the concurrent, crash-tolerant JSON storage substrate every
//! service persists through.
//!
//! Each collection file is guarded by two layers: an in-process, per-path
//! named mutex (cheap, orders concurrent tasks within this process) and an
//! OS-level advisory file lock on a `.lock` sibling, acquired also across
//! processes (`fs2::FileExt::try_lock_exclusive`, polled up to
//! `LOCK_TIMEOUT`) — a second process pointed at the same collection file
//! contends on the same lock rather than racing it. Acquisition that cannot
//! complete within the timeout surfaces as `StorageBusy`. Reads recover
//! from corruption by falling back to a `.bak` copy, then by quarantining
//! the corrupted file and returning a caller-supplied default. Writes are
//! atomic: back up, write to a `.tmp` sibling, then rename over the
//! destination.

use crate::error::{KernelError, Result};
use fs2::FileExt;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Acquire an exclusive OS-level lock on `lock_path`, creating it if
/// absent, polling at `LOCK_POLL_INTERVAL` until `deadline`. Dropping the
/// returned `File` releases the lock. Blocking; callers run this on a
/// blocking thread pool.
fn acquire_os_lock(lock_path: &Path, deadline: Instant) -> std::io::Result<File> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(lock_path)?;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(e);
                }
                std::thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(e) => return Err(e),
        }
    }
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_for(path: &Path) -> Arc<AsyncMutex<()>> {
    let mut reg = registry().lock().expect("safe store lock registry poisoned");
    reg.entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// Per-file-backed JSON collection store.
///
/// `T` is the in-memory shape of the collection (e.g. `{"agents": [...]}`);
/// callers load a mutable copy, mutate it, then save it back under the same
/// lock acquisition.
pub struct SafeStore {
    path: PathBuf,
}

impl SafeStore {
    /// Open a collection backed by `path`. Does not touch the filesystem
    /// until `load`/`save` is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn bak_path(&self) -> PathBuf {
        self.path.with_extension("json.bak")
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Acquire the cross-process OS lock for this collection's path,
    /// running the blocking poll loop off the async executor.
    async fn acquire_cross_process_lock(&self) -> Result<File> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let path_for_error = self.path.display().to_string();
        let deadline = Instant::now() + LOCK_TIMEOUT;
        tokio::task::spawn_blocking(move || acquire_os_lock(&lock_path, deadline))
            .await
            .map_err(|e| KernelError::Internal(format!("lock task join error: {e}")))?
            .map_err(|_| KernelError::StorageBusy(path_for_error))
    }

    fn corrupted_path(&self, epoch: u64) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupted.{epoch}"));
        self.path.with_file_name(name)
    }

    /// Load the collection, recovering from corruption.
    ///
    /// On parse failure, tries the `.bak` sibling. If that also fails (or
    /// is absent), moves the corrupted primary file aside and returns
    /// `default`, logging a warning — storage faults never halt the caller,
    /// per the liveness-over-availability tradeoff in `SPEC_FULL.md` §7.
    pub async fn load<T>(&self, default: T) -> Result<T>
    where
        T: DeserializeOwned + Serialize + Clone,
    {
        let lock = lock_for(&self.path);
        let _guard = timeout(LOCK_TIMEOUT, lock.lock())
            .await
            .map_err(|_| KernelError::StorageBusy(self.path.display().to_string()))?;
        let _os_lock = self.acquire_cross_process_lock().await?;

        if !self.path.exists() {
            return Ok(default);
        }

        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => Ok(value),
                Err(parse_err) => self.recover(parse_err, default),
            },
            Err(io_err) => {
                tracing::warn!(path = %self.path.display(), error = %io_err, "failed to read collection file");
                Ok(default)
            }
        }
    }

    fn recover<T>(&self, parse_err: serde_json::Error, default: T) -> Result<T>
    where
        T: DeserializeOwned,
    {
        tracing::warn!(path = %self.path.display(), error = %parse_err, "collection file failed to parse, attempting .bak recovery");

        let bak = self.bak_path();
        if bak.exists() {
            if let Ok(raw) = std::fs::read_to_string(&bak) {
                if let Ok(value) = serde_json::from_str::<T>(&raw) {
                    tracing::warn!(path = %self.path.display(), "recovered collection from .bak");
                    return Ok(value);
                }
            }
        }

        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let quarantine = self.corrupted_path(epoch);
        if let Err(e) = std::fs::rename(&self.path, &quarantine) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to quarantine corrupted file");
        } else {
            tracing::warn!(path = %self.path.display(), quarantine = %quarantine.display(), "corrupted collection quarantined, starting fresh");
        }

        Ok(default)
    }

    /// Persist `value`, backing up the previous contents and writing
    /// through a temp file plus atomic rename.
    pub async fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        let lock = lock_for(&self.path);
        let _guard = timeout(LOCK_TIMEOUT, lock.lock())
            .await
            .map_err(|_| KernelError::StorageBusy(self.path.display().to_string()))?;
        let _os_lock = self.acquire_cross_process_lock().await?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if self.path.exists() {
            std::fs::copy(&self.path, self.bak_path())?;
        }

        let json = serde_json::to_string_pretty(value)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile_like::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
    struct Collection {
        items: Vec<String>,
    }

    mod tempfile_like {
        use std::path::PathBuf;

        /// Minimal scratch-directory helper so this module doesn't need an
        /// extra dev-dependency just for two tests.
        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new(label: &str) -> Self {
                let mut dir = std::env::temp_dir();
                let nonce = format!(
                    "attestix-test-{label}-{:?}",
                    std::thread::current().id()
                );
                dir.push(nonce);
                std::fs::create_dir_all(&dir).unwrap();
                Self(dir)
            }

            pub fn path(&self) -> &std::path::Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    #[tokio::test]
    async fn load_missing_file_returns_default() {
        let dir = TempDir::new("load-missing");
        let store = SafeStore::new(dir.path().join("things.json"));
        let loaded = store.load(Collection::default()).await.unwrap();
        assert_eq!(loaded, Collection::default());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = TempDir::new("roundtrip");
        let store = SafeStore::new(dir.path().join("things.json"));
        let value = Collection {
            items: vec!["a".into(), "b".into()],
        };
        store.save(&value).await.unwrap();
        let loaded = store.load(Collection::default()).await.unwrap();
        assert_eq!(loaded, value);
    }

    #[tokio::test]
    async fn corrupted_file_falls_back_to_default_and_quarantines() {
        let dir = TempDir::new("corrupt");
        let path = dir.path().join("things.json");
        std::fs::write(&path, "{not valid json").unwrap();

        let store = SafeStore::new(&path);
        let loaded = store.load(Collection::default()).await.unwrap();
        assert_eq!(loaded, Collection::default());
        assert!(!path.exists());

        let has_quarantine = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains("corrupted"));
        assert!(has_quarantine);
    }

    #[tokio::test]
    async fn backup_recovers_when_primary_is_corrupted() {
        let dir = TempDir::new("backup-recovery");
        let path = dir.path().join("things.json");
        let store = SafeStore::new(&path);

        let value = Collection {
            items: vec!["kept".into()],
        };
        store.save(&value).await.unwrap();
        // Corrupt the primary but leave the .bak written by `save` intact.
        std::fs::write(&path, "not json at all").unwrap();

        let loaded = store.load(Collection::default()).await.unwrap();
        assert_eq!(loaded, value);
    }

    /// Two independent `File` handles locking the same lock path stand in
    /// for two OS processes contending on the same collection — this is
    /// the scenario the in-process `AsyncMutex` registry cannot cover.
    #[test]
    fn os_level_lock_blocks_a_second_holder_until_released() {
        let dir = TempDir::new("os-lock-contend");
        let lock_path = dir.path().join("things.json.lock");

        let held = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .unwrap();
        held.lock_exclusive().unwrap();

        let deadline = Instant::now() + Duration::from_millis(200);
        assert!(acquire_os_lock(&lock_path, deadline).is_err());

        held.unlock().unwrap();
        let deadline = Instant::now() + Duration::from_millis(200);
        assert!(acquire_os_lock(&lock_path, deadline).is_ok());
    }

    #[tokio::test]
    async fn cross_process_lock_contention_surfaces_as_storage_busy() {
        let dir = TempDir::new("cross-process-busy");
        let path = dir.path().join("things.json");
        let store = SafeStore::new(&path);

        let lock_path = store.lock_path();
        std::fs::create_dir_all(dir.path()).unwrap();
        let external_holder = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .unwrap();
        external_holder.lock_exclusive().unwrap();

        let err = store.load(Collection::default()).await.unwrap_err();
        assert!(matches!(err, KernelError::StorageBusy(_)));

        external_holder.unlock().unwrap();
    }
}
