//! Atomic TOML file operations.
//!
//! Writes go through a temporary file in the same directory, are fsynced and
//! then renamed over the target, all under an exclusive advisory lock so
//! several processes sharing a data directory never interleave writes.

use serde::{Serialize, de::DeserializeOwned};
use std::fs::{self, File, OpenOptions};
use std::io::Write as IoWrite;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Errors that can occur while reading or writing a store file.
#[derive(Debug)]
pub enum StoreFileError {
    /// File I/O error.
    Io(std::io::Error),
    /// The file exists but is not a valid document (truncated, malformed).
    Parse(toml::de::Error),
    /// TOML serialization error.
    Serialize(toml::ser::Error),
    /// File locking error.
    Lock(String),
    /// The file exists but holds nothing, e.g. cut off before the first write
    /// reached the disk.
    Empty(PathBuf),
}

impl std::fmt::Display for StoreFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreFileError::Io(e) => write!(f, "I/O error: {}", e),
            StoreFileError::Parse(e) => write!(f, "TOML parse error: {}", e),
            StoreFileError::Serialize(e) => write!(f, "TOML serialization error: {}", e),
            StoreFileError::Lock(e) => write!(f, "Lock error: {}", e),
            StoreFileError::Empty(path) => write!(f, "{} exists but is empty", path.display()),
        }
    }
}

impl std::error::Error for StoreFileError {}

impl From<std::io::Error> for StoreFileError {
    fn from(e: std::io::Error) -> Self {
        StoreFileError::Io(e)
    }
}

impl From<toml::de::Error> for StoreFileError {
    fn from(e: toml::de::Error) -> Self {
        StoreFileError::Parse(e)
    }
}

impl From<toml::ser::Error> for StoreFileError {
    fn from(e: toml::ser::Error) -> Self {
        StoreFileError::Serialize(e)
    }
}

/// A handle to one TOML document on disk.
///
/// - **Atomicity**: updates are all-or-nothing via tmp file + rename
/// - **Isolation**: an fs2 exclusive lock on a sibling `.lock` file
/// - **Durability**: explicit fsync before rename
#[derive(Debug)]
pub struct AtomicTomlFile<T> {
    path: PathBuf,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> AtomicTomlFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _phantom: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and deserializes the file.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(T))`: Successfully loaded and deserialized
    /// - `Ok(None)`: File doesn't exist
    /// - `Err(StoreFileError::Empty)`: File exists with no content
    /// - `Err`: Failed to read or parse the file
    pub fn load(&self) -> Result<Option<T>, StoreFileError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Err(StoreFileError::Empty(self.path.clone()));
        }

        let data: T = toml::from_str(&content)?;
        Ok(Some(data))
    }

    /// Serializes `data` and replaces the file atomically.
    pub fn save(&self, data: &T) -> Result<(), StoreFileError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(data)?;

        let _lock = FileLock::acquire(&self.path)?;

        let tmp_path = self.temp_path()?;
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(toml_string.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn temp_path(&self) -> Result<PathBuf, StoreFileError> {
        let parent = self.path.parent().ok_or_else(|| {
            StoreFileError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        })?;

        let file_name = self.path.file_name().ok_or_else(|| {
            StoreFileError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no file name",
            ))
        })?;

        let tmp_name = format!(".{}.tmp", file_name.to_string_lossy());
        Ok(parent.join(tmp_name))
    }
}

/// Exclusive advisory lock, released when dropped.
///
/// The `.lock` file itself is left in place: removing it would let a waiter
/// and a newcomer lock two different inodes.
struct FileLock {
    #[allow(dead_code)]
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, StoreFileError> {
        let lock_path = path.with_extension("lock");

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive()
                .map_err(|e| StoreFileError::Lock(format!("Failed to acquire lock: {}", e)))?;
        }

        Ok(FileLock { file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counters {
        name: String,
        count: u32,
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<Counters>::new(temp_dir.path().join("store.toml"));

        let data = Counters {
            name: "warn".to_string(),
            count: 3,
        };
        file.save(&data).unwrap();

        assert_eq!(file.load().unwrap(), Some(data));
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicTomlFile::<Counters>::new(temp_dir.path().join("store.toml"));
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn test_empty_file_is_not_missing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.toml");
        let file = AtomicTomlFile::<Counters>::new(path.clone());

        fs::write(&path, "").unwrap();
        assert!(matches!(file.load(), Err(StoreFileError::Empty(_))));

        fs::write(&path, "  \n").unwrap();
        assert!(matches!(file.load(), Err(StoreFileError::Empty(_))));
    }

    #[test]
    fn test_truncated_file_is_a_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store.toml");
        fs::write(&path, "name = \"warn\"\ncount = ").unwrap();

        let file = AtomicTomlFile::<Counters>::new(path);
        assert!(matches!(file.load(), Err(StoreFileError::Parse(_))));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("store.toml");
        let file = AtomicTomlFile::<Counters>::new(path.clone());

        file.save(&Counters {
            name: "warn".to_string(),
            count: 1,
        })
        .unwrap();

        assert!(path.exists());
        assert!(!temp_dir.path().join("nested").join(".store.toml.tmp").exists());
    }
}
