use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Where a logical path is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileLocation {
    /// Bundled game assets, read-only
    Assets,
    /// Writable per-application data folder
    AppFolder,
}

/// Resolves logical paths to raw bytes
pub trait FileResolver {
    fn read_file(&self, path: &str, location: FileLocation) -> Option<Vec<u8>>;
    fn write_file(&self, path: &str, location: FileLocation, data: &[u8]) -> Result<()>;
}

/// Lowercase extension without the dot, empty when there is none
pub fn file_extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Files on disk under two root folders
pub struct DiskFiles {
    assets_root: PathBuf,
    app_root: PathBuf,
}

impl DiskFiles {
    pub fn new(assets_root: impl Into<PathBuf>, app_root: impl Into<PathBuf>) -> Self {
        Self {
            assets_root: assets_root.into(),
            app_root: app_root.into(),
        }
    }

    fn resolve(&self, path: &str, location: FileLocation) -> PathBuf {
        match location {
            FileLocation::Assets => self.assets_root.join(path),
            FileLocation::AppFolder => self.app_root.join(path),
        }
    }
}

impl FileResolver for DiskFiles {
    fn read_file(&self, path: &str, location: FileLocation) -> Option<Vec<u8>> {
        let full = self.resolve(path, location);
        match std::fs::read(&full) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!("Cannot read {}: {}", full.display(), e);
                None
            }
        }
    }

    fn write_file(&self, path: &str, location: FileLocation, data: &[u8]) -> Result<()> {
        if location == FileLocation::Assets {
            anyhow::bail!("Assets are read-only: {}", path);
        }
        let full = self.resolve(path, location);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, data)
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", full.display(), e))
    }
}

/// In-memory file tree, for embedding and tests
#[derive(Default)]
pub struct MemoryFiles {
    files: RefCell<HashMap<(FileLocation, String), Vec<u8>>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, location: FileLocation, data: Vec<u8>) {
        self.files
            .borrow_mut()
            .insert((location, path.to_string()), data);
    }

    pub fn remove(&self, path: &str, location: FileLocation) -> Option<Vec<u8>> {
        self.files
            .borrow_mut()
            .remove(&(location, path.to_string()))
    }

    pub fn contains(&self, path: &str, location: FileLocation) -> bool {
        self.files
            .borrow()
            .contains_key(&(location, path.to_string()))
    }
}

impl FileResolver for MemoryFiles {
    fn read_file(&self, path: &str, location: FileLocation) -> Option<Vec<u8>> {
        self.files
            .borrow()
            .get(&(location, path.to_string()))
            .cloned()
    }

    fn write_file(&self, path: &str, location: FileLocation, data: &[u8]) -> Result<()> {
        if location == FileLocation::Assets {
            anyhow::bail!("Assets are read-only: {}", path);
        }
        self.insert(path, location, data.to_vec());
        Ok(())
    }
}
