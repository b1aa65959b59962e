use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::files::{FileLocation, FileResolver};
use crate::gpu::{GpuHandle, NO_HANDLE};
use crate::image::ImageDecoders;

/// Key of a generated texture's pixels in a [`TextureCache`]. 0 means "not cached".
pub type CacheId = u32;

pub const NO_CACHE_ID: CacheId = 0;

const GENERATED_TEXTURE_PREFIX: &str = ".gentexture_";

/// Reload path of a generated texture
pub fn generated_texture_path(id: CacheId) -> String {
    format!("{}{}", GENERATED_TEXTURE_PREFIX, id)
}

/// Inverse of [`generated_texture_path`]
pub fn parse_generated_texture_path(path: &str) -> Option<CacheId> {
    path.strip_prefix(GENERATED_TEXTURE_PREFIX)?
        .parse()
        .ok()
        .filter(|id| *id != NO_CACHE_ID)
}

/// Raw pixel store for textures that have no source file
pub trait TextureCache {
    /// Store `bytes`, overwriting `existing` when it is a known id.
    /// Returns the id the bytes are stored under.
    fn register(&self, bytes: &[u8], existing: CacheId) -> CacheId;
    fn readback(&self, id: CacheId) -> Option<Vec<u8>>;
}

#[derive(Default)]
pub struct MemoryTextureCache {
    entries: RefCell<HashMap<CacheId, Vec<u8>>>,
    next_id: RefCell<CacheId>,
}

impl MemoryTextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Forget an entry, e.g. to simulate a purged cache
    pub fn evict(&self, id: CacheId) -> bool {
        self.entries.borrow_mut().remove(&id).is_some()
    }
}

impl TextureCache for MemoryTextureCache {
    fn register(&self, bytes: &[u8], existing: CacheId) -> CacheId {
        let mut entries = self.entries.borrow_mut();
        let id = if existing != NO_CACHE_ID && entries.contains_key(&existing) {
            existing
        } else {
            let mut next = self.next_id.borrow_mut();
            *next += 1;
            *next
        };
        entries.insert(id, bytes.to_vec());
        id
    }

    fn readback(&self, id: CacheId) -> Option<Vec<u8>> {
        self.entries.borrow().get(&id).cloned()
    }
}

/// Cache entries stored as files in the app folder, named by [`generated_texture_path`]
pub struct FileTextureCache {
    files: Rc<dyn FileResolver>,
    next_id: RefCell<CacheId>,
}

impl FileTextureCache {
    pub fn new(files: Rc<dyn FileResolver>) -> Self {
        Self {
            files,
            next_id: RefCell::new(NO_CACHE_ID),
        }
    }

    fn exists(&self, id: CacheId) -> bool {
        self.files
            .read_file(&generated_texture_path(id), FileLocation::AppFolder)
            .is_some()
    }
}

impl TextureCache for FileTextureCache {
    fn register(&self, bytes: &[u8], existing: CacheId) -> CacheId {
        let id = if existing != NO_CACHE_ID {
            existing
        } else {
            let mut next = self.next_id.borrow_mut();
            // skip ids left behind by an earlier run
            loop {
                *next += 1;
                if !self.exists(*next) {
                    break *next;
                }
            }
        };
        let path = generated_texture_path(id);
        if let Err(e) = self.files.write_file(&path, FileLocation::AppFolder, bytes) {
            tracing::error!("Cannot cache texture {}: {}", id, e);
        }
        id
    }

    fn readback(&self, id: CacheId) -> Option<Vec<u8>> {
        if id == NO_CACHE_ID {
            return None;
        }
        self.files
            .read_file(&generated_texture_path(id), FileLocation::AppFolder)
    }
}

/// Collaborators a resource needs to rebuild itself
#[derive(Clone)]
pub struct AssetServices {
    pub files: Rc<dyn FileResolver>,
    pub cache: Rc<dyn TextureCache>,
    pub decoders: Rc<ImageDecoders>,
}

impl AssetServices {
    pub fn new(files: Rc<dyn FileResolver>, cache: Rc<dyn TextureCache>) -> Self {
        Self {
            files,
            cache,
            decoders: Rc::new(ImageDecoders::default()),
        }
    }

    pub fn with_decoders(mut self, decoders: ImageDecoders) -> Self {
        self.decoders = Rc::new(decoders);
        self
    }
}

/// Anything that owns a GPU handle
pub trait GpuResource {
    fn handle(&self) -> GpuHandle;

    fn is_valid(&self) -> bool {
        self.handle() != NO_HANDLE
    }
}

/// Capability used by the resource registry to bring GPU objects back after
/// the context was lost. Every method must be safe to call repeatedly and
/// must not depend on other resources having been reloaded first.
pub trait Reloadable: GpuResource {
    fn is_reloadable(&self) -> bool;
    fn set_reloadable(&mut self, reloadable: bool);

    /// Forget handles that died with the old context, without releasing them
    fn discard(&mut self);

    /// Recreate GPU state. Failures are logged and leave the resource invalid.
    fn reload(&mut self, services: &AssetServices);

    /// Save whatever `reload` will need, while the context is still alive
    fn cache(&mut self, services: &AssetServices);
}
