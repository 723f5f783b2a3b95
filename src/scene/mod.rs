//! Scene data sources.
//!
//! Kernel objects request scene resources by opaque identifier (`geometry`,
//! `camera.json`, ...). A missing resource is a hard fault: partial scenes
//! are not rendered.

mod records;

pub use records::{example_box, read_geometry, write_geometry, ENTITY_PRIMITIVE};

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::util::{Error, Result};

/// Scene resource identifiers used by the built-in kernel objects.
pub mod ids {
    pub const GEOMETRY: &str = "geometry";
    pub const CAMERA: &str = "camera.json";
    pub const MATERIALS: &str = "materials.json";
}

/// Provider of readable scene resources.
pub trait SceneSource {
    /// Open the resource named `id`.
    fn open(&self, id: &str) -> Result<Box<dyn Read + '_>>;

    /// Read a whole resource into memory.
    fn read_all(&self, id: &str) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open(id)?
            .read_to_end(&mut data)
            .map_err(|source| Error::SceneResource {
                id: id.to_string(),
                source,
            })?;
        Ok(data)
    }
}

/// Resources stored as files under a scene root directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SceneSource for DirectorySource {
    fn open(&self, id: &str) -> Result<Box<dyn Read + '_>> {
        let path = self.root.join(id);
        tracing::debug!(path = %path.display(), "opening scene resource");
        let file = File::open(&path).map_err(|source| Error::SceneResource {
            id: id.to_string(),
            source,
        })?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Resources held in memory, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    resources: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert(id, data);
        self
    }

    pub fn insert(&mut self, id: &str, data: impl Into<Vec<u8>>) {
        self.resources.insert(id.to_string(), data.into());
    }
}

impl SceneSource for MemorySource {
    fn open(&self, id: &str) -> Result<Box<dyn Read + '_>> {
        let data = self.resources.get(id).ok_or_else(|| Error::SceneResource {
            id: id.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such resource"),
        })?;
        Ok(Box::new(Cursor::new(data.as_slice())))
    }
}
