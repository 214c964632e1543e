use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use common::{Error, Result};

/// Where trained predictor state is kept between runs. A missing key is
/// `Ok(None)`; the caller retrains.
pub trait ModelStore: Send + Sync {
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `BTC/USDT` is stored as `BTC--USDT.json`. Any other byte outside
    /// `[A-Za-z0-9_.]` (a literal `-` included) is written as `-xx` hex, so
    /// distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut file = String::with_capacity(key.len());
        for b in key.bytes() {
            match b {
                b'/' => file.push_str("--"),
                b'_' | b'.' => file.push(b as char),
                _ if b.is_ascii_alphanumeric() => file.push(b as char),
                _ => file.push_str(&format!("-{b:02x}")),
            }
        }
        self.dir.join(format!("{file}.json"))
    }
}

impl ModelStore for FileModelStore {
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), bytes)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, used by backtests and tests.
#[derive(Debug, Default)]
pub struct MemoryModelStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelStore for MemoryModelStore {
    fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|e| Error::Other(e.to_string()))?;
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().map_err(|e| Error::Other(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_and_reports_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::new(dir.path().join("models"));
        assert_eq!(store.load("BTC/USDT").unwrap(), None);

        store.save("BTC/USDT", b"{}").unwrap();
        assert_eq!(store.load("BTC/USDT").unwrap(), Some(b"{}".to_vec()));
        assert!(dir.path().join("models/BTC--USDT.json").exists());
    }

    #[test]
    fn similar_keys_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileModelStore::new(dir.path());
        let keys = ["BTC/USDT", "BTC_USDT", "BTC-USDT", "BTC--USDT", "BTC-2fUSDT"];
        for (i, key) in keys.iter().enumerate() {
            store.save(key, &[i as u8]).unwrap();
        }
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(store.load(key).unwrap(), Some(vec![i as u8]), "{key}");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), keys.len());
    }

    #[test]
    fn memory_store_keys_are_independent() {
        let store = MemoryModelStore::new();
        store.save("a", &[1]).unwrap();
        assert_eq!(store.load("a").unwrap(), Some(vec![1]));
        assert_eq!(store.load("b").unwrap(), None);
        assert_eq!(store.len(), 1);
    }
}
