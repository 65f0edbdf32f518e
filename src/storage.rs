use crate::error::StorageError;
use crate::model::{SyncQueueItem, UserSnapshot, UserState};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Key of the single blob holding the full `UserState`.
pub const STATE_KEY: &str = "ramadan_user_state";
/// Key of the persisted offline sync queue.
pub const QUEUE_KEY: &str = "ramadan_sync_queue";

/// Durable client-side key/value storage.
pub trait LocalStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn save(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Serializes with sorted object keys so the blobs diff cleanly.
pub fn to_stable_json<T: serde::Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    serde_json::to_string_pretty(&v)
}

pub fn resolve_state_dir(cli_dir: Option<&str>) -> Result<PathBuf, StorageError> {
    if let Some(p) = cli_dir.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        return Ok(PathBuf::from(p));
    }

    if let Ok(p) = std::env::var("RAMADAN_STATE_DIR") {
        let p = p.trim().to_string();
        if !p.is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let base = std::env::var("XDG_DATA_HOME")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let home = std::env::var("HOME")
        .ok()
        .or_else(|| std::env::var("USERPROFILE").ok());

    let base = match (base, home) {
        (Some(b), _) => PathBuf::from(b),
        (None, Some(h)) => Path::new(&h).join(".local").join("share"),
        (None, None) => return Err(StorageError::Io("cannot resolve state directory".into())),
    };

    Ok(base.join("ramadan-tracker"))
}

/// One JSON file per key inside a private directory. Writes go through a
/// temp file and rename, under a lock file.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

struct WriteLock {
    path: PathBuf,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::Io(e.to_string()))?;

        #[cfg(unix)]
        {
            let _ = fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700));
        }

        Ok(())
    }

    fn with_write_lock<R>(
        &self,
        key: &str,
        f: impl FnOnce() -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let lock_path = self.dir.join(format!("{}.lock", key));

        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(_) => {
                let _guard = WriteLock { path: lock_path };
                f()
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(StorageError::Locked),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    fn write_atomic(&self, key: &str, data: &str) -> Result<(), StorageError> {
        let final_path = self.path_for(key);
        let tmp_path = self
            .dir
            .join(format!(".{}.json.tmp.{}", key, std::process::id()));

        {
            let mut f = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .map_err(|e| StorageError::Io(e.to_string()))?;

            #[cfg(unix)]
            {
                let _ = f.set_permissions(fs::Permissions::from_mode(0o600));
            }

            f.write_all(data.as_bytes())
                .map_err(|e| StorageError::Io(e.to_string()))?;
            let _ = f.flush();
        }

        fs::rename(&tmp_path, &final_path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StorageError::Io(e.to_string())
        })
    }
}

impl LocalStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(txt) => Ok(Some(txt)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.ensure_dir()?;
        self.with_write_lock(key, || self.write_atomic(key, value))
    }
}

pub fn load_state<S: LocalStore + ?Sized>(store: &S) -> Result<Option<UserSnapshot>, StorageError> {
    match store.load(STATE_KEY)? {
        None => Ok(None),
        Some(txt) => serde_json::from_str(&txt)
            .map(Some)
            .map_err(|e| StorageError::Corrupted(format!("{}: {}", STATE_KEY, e))),
    }
}

pub fn save_state<S: LocalStore + ?Sized>(store: &mut S, state: &UserState) -> Result<(), StorageError> {
    let data = to_stable_json(state).map_err(|e| StorageError::Io(e.to_string()))? + "\n";
    store.save(STATE_KEY, &data)
}

/// A corrupted queue blob is logged and treated as empty: losing pending
/// replays is preferable to refusing to start.
pub fn load_queue<S: LocalStore + ?Sized>(store: &S) -> Result<Vec<SyncQueueItem>, StorageError> {
    match store.load(QUEUE_KEY)? {
        None => Ok(Vec::new()),
        Some(txt) => match serde_json::from_str(&txt) {
            Ok(items) => Ok(items),
            Err(e) => {
                log::warn!("discarding unreadable sync queue: {}", e);
                Ok(Vec::new())
            }
        },
    }
}

pub fn save_queue<S: LocalStore + ?Sized>(store: &mut S, items: &[SyncQueueItem]) -> Result<(), StorageError> {
    let data = to_stable_json(&items).map_err(|e| StorageError::Io(e.to_string()))? + "\n";
    store.save(QUEUE_KEY, &data)
}
