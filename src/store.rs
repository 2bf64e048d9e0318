//! Fit result store module.
//! Sole owner of the board id -> FitRecord map. Reads hand out copies, writes replace whole records.
//! Durable persistence goes through a `StorageProvider` (memory or JSON files on disk) and only
//! happens on an explicit `save()`. Loading merges into what is already held; stale ids are kept.
//! Malformed persisted data is logged and treated as empty: fit results can always be redone.
//! Records keep insertion order: persisted documents load in document order, new ids go last.

use crate::fit::FitRecord;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Board id -> record map in insertion order. Serializes as a plain JSON object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FitResults {
    entries: Vec<(String, FitRecord)>,
}

impl FitResults {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == id)
    }

    pub fn get(&self, id: &str) -> Option<&FitRecord> {
        self.position(id).map(|i| &self.entries[i].1)
    }

    /// Replaces in place when `id` is known, appends otherwise.
    pub fn insert(&mut self, id: String, record: FitRecord) {
        match self.position(&id) {
            Some(i) => self.entries[i].1 = record,
            None => self.entries.push((id, record)),
        }
    }

    /// Record for `id`, appending the default one first if absent.
    pub fn get_or_default(&mut self, id: &str) -> &FitRecord {
        let i = match self.position(id) {
            Some(i) => i,
            None => {
                self.entries.push((id.to_string(), FitRecord::default()));
                self.entries.len() - 1
            }
        };
        &self.entries[i].1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FitRecord)> {
        self.entries.iter().map(|(id, record)| (id.as_str(), record))
    }

    #[cfg(test)]
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }
}

impl Extend<(String, FitRecord)> for FitResults {
    fn extend<I: IntoIterator<Item = (String, FitRecord)>>(&mut self, iter: I) {
        for (id, record) in iter {
            self.insert(id, record);
        }
    }
}

impl IntoIterator for FitResults {
    type Item = (String, FitRecord);
    type IntoIter = std::vec::IntoIter<(String, FitRecord)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, FitRecord)> for FitResults {
    fn from_iter<I: IntoIterator<Item = (String, FitRecord)>>(iter: I) -> Self {
        let mut results = Self::new();
        results.extend(iter);
        results
    }
}

impl Serialize for FitResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

struct FitResultsVisitor;

impl<'de> Visitor<'de> for FitResultsVisitor {
    type Value = FitResults;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of board id to fit record")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut results = FitResults::new();
        while let Some((id, record)) = access.next_entry::<String, FitRecord>()? {
            results.insert(id, record);
        }
        Ok(results)
    }
}

impl<'de> Deserialize<'de> for FitResults {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FitResultsVisitor)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed for key '{key}': {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },
    #[error("Failed to encode fit results: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Key/value text storage, the `localStorage` of this tool.
pub trait StorageProvider {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn save(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_entry(key: &str, value: &str) -> Self {
        let mut storage = Self::new();
        storage.entries.insert(key.to_string(), value.to_string());
        storage
    }
}

impl StorageProvider for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Stores each key as `<dir>/<key>.json`. Writes go to a temp file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageProvider for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(value.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, &target).map_err(io_err)
    }
}

pub struct FitResultStore {
    records: FitResults,
    storage: Box<dyn StorageProvider>,
    key: String,
}

impl FitResultStore {
    pub fn new(storage: Box<dyn StorageProvider>, key: impl Into<String>) -> Self {
        Self {
            records: FitResults::new(),
            storage,
            key: key.into(),
        }
    }

    /// Creates a store and merges whatever is persisted under `key`.
    pub fn load(storage: Box<dyn StorageProvider>, key: impl Into<String>) -> Self {
        let mut store = Self::new(storage, key);
        store.merge_persisted();
        store
    }

    /// Merges persisted records over the in-memory ones. Never fails; unreadable data counts as empty.
    pub fn merge_persisted(&mut self) -> usize {
        let raw = match self.storage.load(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!(key = %self.key, "No persisted fit results, starting empty");
                return 0;
            }
            Err(e) => {
                warn!("Ignoring unreadable fit results: {}", e);
                return 0;
            }
        };

        match serde_json::from_str::<FitResults>(&raw) {
            Ok(persisted) => {
                let count = persisted.len();
                self.records.extend(persisted);
                info!(count, total = self.records.len(), "Merged persisted fit results");
                count
            }
            Err(e) => {
                warn!("Ignoring malformed fit results under '{}': {}", self.key, e);
                0
            }
        }
    }

    /// Returns a copy of the record, inserting the default one on first access.
    pub fn get(&mut self, id: &str) -> FitRecord {
        self.records.get_or_default(id).clone()
    }

    /// Looks up without creating.
    pub fn peek(&self, id: &str) -> Option<&FitRecord> {
        self.records.get(id)
    }

    pub fn set(&mut self, id: &str, record: FitRecord) {
        self.records.insert(id.to_string(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Overwrites the persisted document with the full store.
    pub fn save(&mut self) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(&self.records)?;
        self.storage.save(&self.key, &encoded)?;
        info!(count = self.records.len(), key = %self.key, "Saved fit results");
        Ok(())
    }

    /// Pretty JSON of `{id: record}` for one board, or `None` if it has no record.
    pub fn export_one(&self, id: &str) -> Result<Option<Vec<u8>>, serde_json::Error> {
        let Some(record) = self.records.get(id) else {
            return Ok(None);
        };
        let single = FitResults::from_iter([(id.to_string(), record.clone())]);
        serde_json::to_vec_pretty(&single).map(Some)
    }

    pub fn export_all(&self) -> FitResults {
        self.records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::Layer;

    const KEY: &str = "fitResults";

    fn moved(x: i32, y: i32) -> FitRecord {
        FitRecord {
            offset_x: x,
            offset_y: y,
            ..FitRecord::default()
        }
    }

    #[test]
    fn test_load_absent_is_empty() {
        let store = FitResultStore::load(Box::new(MemoryStorage::new()), KEY);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_load_malformed_is_empty() {
        let storage = MemoryStorage::with_entry(KEY, "{not json");
        let store = FitResultStore::load(Box::new(storage), KEY);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_get_creates_default_lazily() {
        let mut store = FitResultStore::new(Box::new(MemoryStorage::new()), KEY);
        assert!(store.peek("oak").is_none());
        assert_eq!(store.get("oak"), FitRecord::default());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_returns_copy() {
        let mut store = FitResultStore::new(Box::new(MemoryStorage::new()), KEY);
        let mut copy = store.get("oak");
        copy.offset_x = 99;
        assert_eq!(store.get("oak").offset_x, 0);
        store.set("oak", copy);
        assert_eq!(store.get("oak").offset_x, 99);
    }

    #[test]
    fn test_load_merges_and_keeps_stale_ids() {
        let persisted = r#"{"retired": {"offsetX": 1, "offsetY": 2, "middleEffect": false, "layer": "below", "selectedFrame": 0}}"#;
        let mut store = FitResultStore::new(Box::new(MemoryStorage::with_entry(KEY, persisted)), KEY);
        store.set("oak", moved(4, 4));
        assert_eq!(store.merge_persisted(), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.peek("retired").unwrap().layer, Layer::Below);
        assert_eq!(store.peek("oak").unwrap().offset_x, 4);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FitResultStore::new(Box::new(FileStorage::new(dir.path())), KEY);
        store.set("oak", moved(-7, 3));
        store.set(
            "pine",
            FitRecord {
                middle_effect: true,
                layer: Layer::Below,
                selected_frame: 2,
                ..moved(10, 0)
            },
        );
        store.save().unwrap();

        let reloaded = FitResultStore::load(Box::new(FileStorage::new(dir.path())), KEY);
        assert_eq!(reloaded.export_all(), store.export_all());
    }

    #[test]
    fn test_save_overwrites_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path());
        storage.save(KEY, r#"{"gone": {"offsetX": 0, "offsetY": 0, "middleEffect": false, "layer": "above"}}"#).unwrap();

        let mut store = FitResultStore::new(Box::new(FileStorage::new(dir.path())), KEY);
        store.set("oak", moved(1, 1));
        store.save().unwrap();

        let raw = FileStorage::new(dir.path()).load(KEY).unwrap().unwrap();
        assert!(!raw.contains("gone"));
        assert!(raw.contains("oak"));
    }

    #[test]
    fn test_export_one_is_pretty_and_keyed() {
        let mut store = FitResultStore::new(Box::new(MemoryStorage::new()), KEY);
        store.set("oak", moved(2, 3));
        let bytes = store.export_one("oak").unwrap().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\n  \"oak\": {"));
        assert!(store.export_one("missing").unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_persisted_document_order_survives_save() {
        let persisted = r#"{"zeta": {"offsetX": 1, "offsetY": 0, "middleEffect": false, "layer": "above"},
            "alpha": {"offsetX": 2, "offsetY": 0, "middleEffect": false, "layer": "above"}}"#;
        let mut store = FitResultStore::load(Box::new(MemoryStorage::with_entry(KEY, persisted)), KEY);
        store.get("mid");
        store.set("zeta", moved(5, 5));
        assert_eq!(store.export_all().ids().collect::<Vec<_>>(), ["zeta", "alpha", "mid"]);

        store.save().unwrap();
        let reloaded = FitResultStore::load(Box::new(MemoryStorage::with_entry(KEY, &serde_json::to_string(&store.export_all()).unwrap())), KEY);
        assert_eq!(reloaded.export_all().ids().collect::<Vec<_>>(), ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_saved_text_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FitResultStore::new(Box::new(FileStorage::new(dir.path())), KEY);
        store.set("zeta", moved(1, 1));
        store.set("alpha", moved(2, 2));
        store.save().unwrap();

        let raw = FileStorage::new(dir.path()).load(KEY).unwrap().unwrap();
        assert!(raw.find("zeta").unwrap() < raw.find("alpha").unwrap());
    }

    #[test]
    fn test_results_reject_non_map() {
        assert!(serde_json::from_str::<FitResults>("[1, 2]").is_err());
    }
}
