//! Gallery storage for finished compositions.

use crate::error::{Error, Result};
use notestream_core::NoteEvent;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// A finished composition as handed to the gallery.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Composition {
    /// Id of the request that completed it.
    pub id: String,
    pub prompt: String,
    /// Bank in effect when the stream completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<String>,
    /// Every admitted note, including those kept from earlier requests when refined.
    pub notes: Vec<NoteEvent>,
    pub refined: bool,
}

impl Composition {
    pub fn duration_ms(&self) -> u64 {
        notestream_core::total_duration_ms(&self.notes)
    }
}

/// Where completed compositions go.
pub trait CompositionStore: Send {
    fn save(&mut self, composition: &Composition) -> Result<()>;
}

/// Keeps compositions in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Vec<Composition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compositions(&self) -> &[Composition] {
        &self.saved
    }
}

impl CompositionStore for MemoryStore {
    fn save(&mut self, composition: &Composition) -> Result<()> {
        self.saved.push(composition.clone());
        Ok(())
    }
}

/// Writes each composition to `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a composition with this id is written to.
    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Storage(format!("invalid composition id {:?}", id)));
        }
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

impl CompositionStore for JsonDirStore {
    fn save(&mut self, composition: &Composition) -> Result<()> {
        let path = self.path_for(&composition.id)?;
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(composition)?;
        fs::write(&path, content)?;
        log::info!(
            "saved composition {} ({} notes) to {}",
            composition.id,
            composition.notes.len(),
            path.display()
        );
        Ok(())
    }
}
