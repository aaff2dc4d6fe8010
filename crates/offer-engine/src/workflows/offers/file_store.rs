//! JSON-file record store.
//!
//! Each record kind lives in `<data_dir>/<collection>.json` as an object keyed
//! by record identifier. Collections are loaded once on open and written back
//! whole on every upsert through a temp file + rename, so a crash mid-write
//! leaves the previous file intact.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use super::store::{RecordKind, RecordStore, StoreError};

type Collection = BTreeMap<String, Value>;

#[derive(Debug)]
pub struct JsonFileRecordStore {
    data_dir: PathBuf,
    collections: Mutex<HashMap<RecordKind, Collection>>,
}

impl JsonFileRecordStore {
    /// Open (or create) a store rooted at `data_dir`.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let mut collections = HashMap::new();
        for kind in RecordKind::ALL {
            let path = collection_path(&data_dir, kind);
            let records = load_collection(&path, kind)?;
            debug!(
                collection = kind.collection(),
                records = records.len(),
                "loaded record collection"
            );
            collections.insert(kind, records);
        }

        Ok(Self {
            data_dir,
            collections: Mutex::new(collections),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<RecordKind, Collection>>, StoreError> {
        self.collections
            .lock()
            .map_err(|_| StoreError::Unavailable("file store mutex poisoned".to_string()))
    }
}

impl RecordStore for JsonFileRecordStore {
    fn get_raw(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError> {
        let collections = self.lock()?;
        Ok(collections
            .get(&kind)
            .and_then(|records| records.get(id))
            .cloned())
    }

    fn list_raw(&self, kind: RecordKind) -> Result<Vec<Value>, StoreError> {
        let collections = self.lock()?;
        Ok(collections
            .get(&kind)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn upsert_raw(&self, kind: RecordKind, id: &str, record: Value) -> Result<(), StoreError> {
        let mut collections = self.lock()?;
        let records = collections.entry(kind).or_default();
        let previous = records.insert(id.to_string(), record);

        if let Err(err) = persist_collection(&collection_path(&self.data_dir, kind), records) {
            // Keep the cache in step with what is on disk.
            match previous {
                Some(value) => {
                    records.insert(id.to_string(), value);
                }
                None => {
                    records.remove(id);
                }
            }
            return Err(err);
        }
        Ok(())
    }
}

fn collection_path(data_dir: &Path, kind: RecordKind) -> PathBuf {
    data_dir.join(format!("{}.json", kind.collection()))
}

fn load_collection(path: &Path, kind: RecordKind) -> Result<Collection, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Collection::new()),
        Err(err) => return Err(err.into()),
    };
    if content.trim().is_empty() {
        return Ok(Collection::new());
    }
    serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
        kind,
        id: None,
        message: format!("{}: {source}", path.display()),
    })
}

fn persist_collection(path: &Path, records: &Collection) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(records).map_err(|source| {
        StoreError::Unavailable(format!("failed to encode {}: {source}", path.display()))
    })?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
