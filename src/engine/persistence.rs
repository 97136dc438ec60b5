use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::warn;

use crate::{Document, Result};

#[allow(unused_imports)]
use crate::engine::MemStore;

/// Handles disk I/O for the [`MemStore`].
///
/// Persistence uses an atomic "write-then-rename" strategy to ensure data integrity.
/// Each store is saved as a JSON array of documents in `<name>.json`.
pub struct Persistence {
    data_dir: PathBuf,
    /// Version of the newest snapshot written so far, per store.
    written: Mutex<HashMap<String, u64>>,
}

impl Persistence {
    /// Initializes a new `Persistence` handler in the specified directory.
    ///
    /// If the directory does not exist, it will be created.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { data_dir: dir, written: Mutex::new(HashMap::new()) })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", name))
    }

    /// Writes a snapshot of a store atomically.
    ///
    /// Snapshots can be handed in out of order from concurrent blocking tasks;
    /// one older than the last written `version` is dropped.
    pub fn save_snapshot(&self, name: &str, version: u64, docs: &[Document]) -> Result<()> {
        let mut written = self.written.lock().unwrap();
        if written.get(name).is_some_and(|last| version < *last) {
            return Ok(());
        }

        let file_path = self.path(name);
        let temp_path = file_path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(docs)?;

        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &file_path)?;

        written.insert(name.to_string(), version);
        Ok(())
    }

    /// Loads the documents of a store.
    ///
    /// A missing file is an empty store. An unreadable file is logged and also
    /// treated as empty, so one bad snapshot does not keep the daemon down.
    pub fn load(&self, name: &str) -> Result<Vec<Document>> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = match fs::read(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not read store file {:?}: {}", path, e);
                return Ok(Vec::new());
            }
        };

        match serde_json::from_slice(&content) {
            Ok(docs) => Ok(docs),
            Err(e) => {
                warn!("Could not unmarshal store data from {:?}: {}", path, e);
                Ok(Vec::new())
            }
        }
    }
}
