//! Board catalog module.
//! Loads boards_metadata.json (board id -> path + frame geometry) and keeps one
//! representative board per distinct (splitX, splitY), first one in document order wins.
//! Also regenerates the metadata document from an asset tree of `WxH/` folders.
//! Missing or malformed metadata is fatal: there is nothing to fit without geometry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read board metadata {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Board metadata is not a JSON object of boards: {0}")]
    Parse(String),
    #[error("Board '{id}' has invalid metadata: {reason}")]
    InvalidEntry { id: String, reason: String },
    #[error("Board '{id}' has zero {field}; frame geometry must be positive")]
    ZeroGeometry { id: String, field: &'static str },
    #[error("Board metadata contains no boards")]
    Empty,
}

/// Raw per-board metadata as written by `scan_boards_dir`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardMetadata {
    pub path: String,
    pub split_x: u32,
    pub split_y: u32,
}

/// A fittable board. `path` is opaque here; only the adapter resolves it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoardDescriptor {
    pub id: String,
    pub path: String,
    pub split_x: u32,
    pub split_y: u32,
}

impl BoardDescriptor {
    pub fn geometry(&self) -> (u32, u32) {
        (self.split_x, self.split_y)
    }

    /// Label used by the board picker, e.g. `wood_01 (100x36)`.
    pub fn label(&self) -> String {
        format!("{} ({}x{})", self.id, self.split_x, self.split_y)
    }
}

/// Deduplicated, ordered boards. Built once, never mutated afterwards.
#[derive(Clone, Debug, Default)]
pub struct BoardCatalog {
    boards: Vec<BoardDescriptor>,
}

impl BoardCatalog {
    /// Keeps the first descriptor for every (splitX, splitY) pair, preserving input order.
    pub fn build(entries: impl IntoIterator<Item = BoardDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let mut boards = Vec::new();
        let mut skipped = 0usize;

        for entry in entries {
            if seen.insert(entry.geometry()) {
                boards.push(entry);
            } else {
                debug!(id = %entry.id, "Skipping board with already seen geometry");
                skipped += 1;
            }
        }

        info!(kept = boards.len(), skipped, "Board catalog built");
        Self { boards }
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        Ok(Self::build(parse_metadata(raw)?))
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BoardDescriptor> {
        self.boards.get(index)
    }

    pub fn boards(&self) -> &[BoardDescriptor] {
        &self.boards
    }
}

/// Parses the metadata document in document order.
pub fn parse_metadata(raw: &str) -> Result<Vec<BoardDescriptor>, CatalogError> {
    let document: Map<String, Value> =
        serde_json::from_str(raw).map_err(|e| CatalogError::Parse(e.to_string()))?;

    if document.is_empty() {
        return Err(CatalogError::Empty);
    }

    document
        .into_iter()
        .map(|(id, value)| {
            let meta: BoardMetadata =
                serde_json::from_value(value).map_err(|e| CatalogError::InvalidEntry {
                    id: id.clone(),
                    reason: e.to_string(),
                })?;
            if meta.split_x == 0 {
                return Err(CatalogError::ZeroGeometry { id, field: "splitX" });
            }
            if meta.split_y == 0 {
                return Err(CatalogError::ZeroGeometry { id, field: "splitY" });
            }
            Ok(BoardDescriptor {
                id,
                path: meta.path,
                split_x: meta.split_x,
                split_y: meta.split_y,
            })
        })
        .collect()
}

// *************** Metadata scan ***************

/// Parses a folder name like `100x36` (or `100X36`) into frame geometry.
fn parse_dimension_dir(name: &str) -> Option<(u32, u32)> {
    let lower = name.to_lowercase();
    let (w, h) = lower.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// Walks `boards_dir/<W>x<H>/*.png` and builds the metadata document.
/// Ids are file stems; a later file with the same stem replaces the earlier one.
pub fn scan_boards_dir(boards_dir: &Path) -> anyhow::Result<Map<String, Value>> {
    use anyhow::Context;

    let mut dirs: Vec<_> = fs::read_dir(boards_dir)
        .with_context(|| format!("Failed to read boards directory {}", boards_dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    dirs.sort_by_key(|e| e.file_name());

    let mut metadata = Map::new();
    for dir in dirs {
        let dir_name = dir.file_name().to_string_lossy().into_owned();
        if !dir_name.to_lowercase().contains('x') {
            continue;
        }
        let Some((split_x, split_y)) = parse_dimension_dir(&dir_name) else {
            warn!("Skipping folder with invalid dimension format: {}", dir_name);
            continue;
        };

        let mut files: Vec<_> = fs::read_dir(dir.path())
            .with_context(|| format!("Failed to read {}", dir.path().display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        files.sort();

        for file in files {
            let (Some(stem), Some(file_name)) = (file.file_stem(), file.file_name()) else {
                continue;
            };
            let entry = BoardMetadata {
                path: format!(
                    "{}/{}/{}",
                    boards_dir.display(),
                    dir_name,
                    file_name.to_string_lossy()
                ),
                split_x,
                split_y,
            };
            metadata.insert(
                stem.to_string_lossy().into_owned(),
                serde_json::to_value(entry).context("Failed to encode board metadata")?,
            );
        }
    }

    info!("Found {} board entries.", metadata.len());
    Ok(metadata)
}
