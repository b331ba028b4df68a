//! Store implementations.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use netnexus_types::{DeviceAddress, SavedDevice};

use crate::error::{Error, Result};

/// Durable mapping of hardware address to saved device record.
///
/// Implementations must keep at most one record per address and must treat
/// a store that was never written as empty rather than as an error.
pub trait DeviceStore: Send + Sync {
    /// Load all saved devices in the order they were appended.
    fn load(&self) -> Result<Vec<SavedDevice>>;

    /// Append a device unless its address is already present.
    ///
    /// Returns `true` if the record was added, `false` if it was a duplicate.
    fn append(&self, device: SavedDevice) -> Result<bool>;

    /// Check whether a record exists for the address.
    fn exists(&self, address: &DeviceAddress) -> Result<bool> {
        Ok(self.load()?.iter().any(|d| &d.address == address))
    }
}

/// JSON file store, compatible with the portal's `previous_devices.json`.
///
/// The file holds a pretty-printed array of `{"name", "address"}` objects.
/// Writes go to a sibling temp file first and are renamed into place.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within the process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store at the given path. The file does not need to exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open the store at the default location.
    pub fn open_default() -> Self {
        Self::open(crate::default_store_path())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the backing file with an empty list if it does not exist.
    ///
    /// Returns `true` if the file was created.
    pub fn ensure_exists(&self) -> Result<bool> {
        let _guard = self.lock();
        if self.path.exists() {
            return Ok(false);
        }

        info!("{} not found. Creating it...", self.path.display());
        self.write_all(&[])?;
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_all(&self) -> Result<Vec<SavedDevice>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No device store at {}, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::Read {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| Error::Corrupt {
            path: self.path.clone(),
            source: e,
        })
    }

    fn write_all(&self, devices: &[SavedDevice]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let content = serde_json::to_string_pretty(devices)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| Error::Write {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Error::Write {
            path: self.path.clone(),
            source: e,
        })
    }
}

impl DeviceStore for JsonFileStore {
    fn load(&self) -> Result<Vec<SavedDevice>> {
        let _guard = self.lock();
        self.read_all()
    }

    fn append(&self, device: SavedDevice) -> Result<bool> {
        let _guard = self.lock();
        let mut devices = self.read_all()?;

        if devices.iter().any(|d| d.address == device.address) {
            debug!("Device {} already saved", device.address);
            return Ok(false);
        }

        info!("Saving device {} [{}]", device.name, device.address);
        devices.push(device);
        self.write_all(&devices)?;
        Ok(true)
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: Mutex<Vec<SavedDevice>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with devices (duplicates are dropped).
    pub fn with_devices(devices: impl IntoIterator<Item = SavedDevice>) -> Self {
        let store = Self::new();
        for device in devices {
            let _ = store.append(device);
        }
        store
    }

    fn devices(&self) -> MutexGuard<'_, Vec<SavedDevice>> {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DeviceStore for MemoryStore {
    fn load(&self) -> Result<Vec<SavedDevice>> {
        Ok(self.devices().clone())
    }

    fn append(&self, device: SavedDevice) -> Result<bool> {
        let mut devices = self.devices();
        if devices.iter().any(|d| d.address == device.address) {
            return Ok(false);
        }
        devices.push(device);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn device(address: &str, name: &str) -> SavedDevice {
        SavedDevice::new(DeviceAddress::parse(address).unwrap(), Some(name))
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("previous_devices.json"));

        let devices = store.load().unwrap();
        assert!(devices.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_load_empty_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("previous_devices.json");
        std::fs::write(&path, "").unwrap();

        let store = JsonFileStore::open(&path);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("previous_devices.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::open(&path);
        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_append_and_load() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("nested").join("devices.json"));

        assert!(store.append(device("aa:bb:cc:dd:ee:01", "Speaker")).unwrap());
        assert!(store.append(device("aa:bb:cc:dd:ee:02", "Keyboard")).unwrap());

        let devices = store.load().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "Speaker");
        assert_eq!(devices[1].address.display(), "AA:BB:CC:DD:EE:02");
    }

    #[test]
    fn test_append_duplicate_case_insensitive() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("devices.json"));

        assert!(store.append(device("aa:bb:cc:dd:ee:ff", "First")).unwrap());
        assert!(!store.append(device("AA:BB:CC:DD:EE:FF", "Second")).unwrap());

        let devices = store.load().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "First");
    }

    #[test]
    fn test_file_format_matches_portal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("previous_devices.json");
        let store = JsonFileStore::open(&path);
        store.append(device("aa:bb:cc:dd:ee:ff", "Speaker")).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json[0]["name"], "Speaker");
        assert_eq!(json[0]["address"], "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_reads_portal_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("previous_devices.json");
        std::fs::write(
            &path,
            r#"[{"name": "Old Headset", "address": "11:22:33:44:55:66"}]"#,
        )
        .unwrap();

        let store = JsonFileStore::open(&path);
        let addr = DeviceAddress::parse("11:22:33:44:55:66").unwrap();
        assert!(store.exists(&addr).unwrap());
        assert_eq!(store.load().unwrap()[0].name, "Old Headset");
    }

    #[test]
    fn test_ensure_exists_creates_once() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("devices.json"));

        assert!(store.ensure_exists().unwrap());
        assert!(!store.ensure_exists().unwrap());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap().trim(), "[]");
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::with_devices([
            device("aa:bb:cc:dd:ee:01", "One"),
            device("AA:BB:CC:DD:EE:01", "One again"),
        ]);
        assert_eq!(store.load().unwrap().len(), 1);

        let addr = DeviceAddress::parse("aa:bb:cc:dd:ee:01").unwrap();
        assert!(store.exists(&addr).unwrap());
        assert!(!store.append(device("aa:bb:cc:dd:ee:01", "Dup")).unwrap());
        assert!(store.append(device("aa:bb:cc:dd:ee:02", "Two")).unwrap());
        assert_eq!(store.load().unwrap().len(), 2);
    }
}
