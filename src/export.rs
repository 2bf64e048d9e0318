//! Export module.
//! Hands fit results to the outside world as pretty-printed JSON in the persisted schema:
//! a single board (`{id: record}`), the whole store, or a batch report of catalog boards.
//! The sink either takes the whole document or fails; the store is only ever read.

use crate::catalog::BoardCatalog;
use crate::fit::FitRecord;
use crate::store::{FitResultStore, FitResults};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export sink unavailable for '{name}': {source}")]
    SinkUnavailable {
        name: String,
        source: std::io::Error,
    },
    #[error("Failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Board '{0}' has no fit record to export")]
    NothingToExport(String),
}

/// Destination for export documents (download folder, clipboard, ...).
pub trait ExportSink {
    /// Writes the whole document under `name`, returning where it went.
    fn write(&mut self, name: &str, contents: &[u8]) -> Result<String, ExportError>;
}

/// Writes export documents into a directory; never leaves a half-written file behind.
#[derive(Debug, Clone)]
pub struct DirSink {
    dir: PathBuf,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write_atomic(&self, target: &Path, contents: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = target.with_extension("partial");
        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(contents)?;
            file.sync_all()?;
            fs::rename(&tmp, target)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

impl ExportSink for DirSink {
    fn write(&mut self, name: &str, contents: &[u8]) -> Result<String, ExportError> {
        let target = self.dir.join(name);
        self.write_atomic(&target, contents)
            .map_err(|source| ExportError::SinkUnavailable {
                name: name.to_string(),
                source,
            })?;
        Ok(target.display().to_string())
    }
}

/// Pretty (indented) JSON of the given results, in the persisted schema.
pub fn render(results: &FitResults) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(results)?)
}

/// Catalog boards that have a stored record, in catalog order. Unvisited boards are left out.
pub fn batch_report(catalog: &BoardCatalog, store: &FitResultStore) -> Vec<(String, FitRecord)> {
    catalog
        .boards()
        .iter()
        .filter_map(|board| {
            store
                .peek(&board.id)
                .map(|record| (board.id.clone(), record.clone()))
        })
        .collect()
}

/// Board ids come from metadata keys; anything outside `[A-Za-z0-9._-]` becomes `_` so the
/// name stays a single file inside the sink's directory.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

pub struct ExportService {
    sink: Box<dyn ExportSink>,
    file_name: String,
}

impl ExportService {
    pub fn new(sink: Box<dyn ExportSink>, file_name: impl Into<String>) -> Self {
        Self {
            sink,
            file_name: file_name.into(),
        }
    }

    /// Exports one board's record as `<id>_<file_name>`, with the id made file-safe.
    pub fn export_one(&mut self, store: &FitResultStore, id: &str) -> Result<String, ExportError> {
        let bytes = store
            .export_one(id)?
            .ok_or_else(|| ExportError::NothingToExport(id.to_string()))?;
        let location = self.sink.write(&format!("{}_{}", file_safe(id), self.file_name), &bytes)?;
        info!(board = id, %location, "Exported fit result");
        Ok(location)
    }

    /// Exports the full store as `<file_name>`.
    pub fn export_all(&mut self, store: &FitResultStore) -> Result<String, ExportError> {
        let text = render(&store.export_all())?;
        let location = self.sink.write(&self.file_name, text.as_bytes())?;
        info!(count = store.len(), %location, "Exported all fit results");
        Ok(location)
    }

    /// Logs and returns the batch report.
    pub fn export_batch(
        &mut self,
        catalog: &BoardCatalog,
        store: &FitResultStore,
    ) -> Vec<(String, FitRecord)> {
        let report = batch_report(catalog, store);
        for (id, record) in &report {
            info!("Board {} => {:?}", id, record);
        }
        info!(reported = report.len(), "Batch results logged");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BoardDescriptor;
    use crate::store::MemoryStorage;

    struct RejectingSink;

    impl ExportSink for RejectingSink {
        fn write(&mut self, name: &str, _contents: &[u8]) -> Result<String, ExportError> {
            Err(ExportError::SinkUnavailable {
                name: name.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "write rejected"),
            })
        }
    }

    fn catalog(ids: &[&str]) -> BoardCatalog {
        BoardCatalog::build(ids.iter().enumerate().map(|(i, id)| BoardDescriptor {
            id: id.to_string(),
            path: format!("{id}.png"),
            split_x: 10 + i as u32,
            split_y: 10,
        }))
    }

    fn store_with(ids: &[&str]) -> FitResultStore {
        let mut store = FitResultStore::new(Box::new(MemoryStorage::new()), "fitResults");
        for id in ids {
            store.set(id, FitRecord { offset_x: 1, ..FitRecord::default() });
        }
        store
    }

    #[test]
    fn test_batch_report_skips_unvisited_boards() {
        let catalog = catalog(&["x", "y", "z"]);
        let store = store_with(&["x", "z", "stale"]);
        let ids: Vec<_> = batch_report(&catalog, &store).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["x", "z"]);
    }

    #[test]
    fn test_export_all_writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&["oak", "pine"]);
        let mut service = ExportService::new(Box::new(DirSink::new(dir.path())), "board_fit_results.json");

        service.export_all(&store).unwrap();

        let written = fs::read_to_string(dir.path().join("board_fit_results.json")).unwrap();
        let parsed: FitResults = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, store.export_all());
        assert!(written.contains("\n  \"oak\""));
    }

    #[test]
    fn test_export_one_writes_single_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&["oak", "pine"]);
        let mut service = ExportService::new(Box::new(DirSink::new(dir.path())), "board_fit_results.json");

        service.export_one(&store, "oak").unwrap();

        let written = fs::read_to_string(dir.path().join("oak_board_fit_results.json")).unwrap();
        let parsed: FitResults = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed.get("oak").is_some());
    }

    #[test]
    fn test_export_failure_leaves_store_untouched() {
        let store = store_with(&["oak"]);
        let before = store.export_all();
        let mut service = ExportService::new(Box::new(RejectingSink), "out.json");

        assert!(matches!(service.export_all(&store), Err(ExportError::SinkUnavailable { .. })));
        assert!(matches!(service.export_one(&store, "oak"), Err(ExportError::SinkUnavailable { .. })));
        assert_eq!(store.export_all(), before);
    }

    #[test]
    fn test_export_one_without_record() {
        let store = store_with(&[]);
        let mut service = ExportService::new(Box::new(RejectingSink), "out.json");
        assert!(matches!(
            service.export_one(&store, "ghost"),
            Err(ExportError::NothingToExport(_))
        ));
    }

    #[test]
    fn test_export_one_keeps_path_like_ids_inside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let store = store_with(&["../evil/oak"]);
        let mut service = ExportService::new(Box::new(DirSink::new(&out)), "board_fit_results.json");

        let location = service.export_one(&store, "../evil/oak").unwrap();

        let expected = out.join(".._evil_oak_board_fit_results.json");
        assert_eq!(location, expected.display().to_string());
        let parsed: FitResults = serde_json::from_str(&fs::read_to_string(&expected).unwrap()).unwrap();
        assert!(parsed.get("../evil/oak").is_some());
        assert!(!dir.path().join("evil").exists());
    }

    #[test]
    fn test_file_safe_ids() {
        assert_eq!(file_safe("oak-2_v1.0"), "oak-2_v1.0");
        assert_eq!(file_safe("a/b\\c d"), "a_b_c_d");
    }
}
