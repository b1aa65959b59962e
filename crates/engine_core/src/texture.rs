use std::rc::Rc;

use crate::files::FileLocation;
use crate::gpu::{GpuBackend, GpuHandle, TextureFilter, NO_HANDLE};
use crate::image::{ColorType, Image};
use crate::resource::{
    generated_texture_path, parse_generated_texture_path, AssetServices, CacheId, GpuResource,
    Reloadable, NO_CACHE_ID,
};

/// GPU image. Owns its handle: dropping the texture releases it.
pub struct Texture {
    gpu: Rc<dyn GpuBackend>,
    handle: GpuHandle,
    width: u32,
    height: u32,
    color_type: ColorType,
    filter: TextureFilter,
    reload_path: Option<String>,
    cache_id: CacheId,
    reloadable: bool,
}

impl Texture {
    /// Upload decoded pixels. The texture is invalid if the GPU refuses the allocation.
    pub fn from_image(gpu: Rc<dyn GpuBackend>, image: Image) -> Self {
        let mut texture = Self::unallocated(gpu, image.width, image.height, image.color_type);
        texture.upload(Some(&image.data));
        texture
    }

    /// Render-target capable texture with undefined contents
    pub fn new_empty(
        gpu: Rc<dyn GpuBackend>,
        width: u32,
        height: u32,
        color_type: ColorType,
    ) -> Self {
        let mut texture = Self::unallocated(gpu, width, height, color_type);
        texture.upload(None);
        texture
    }

    fn unallocated(
        gpu: Rc<dyn GpuBackend>,
        width: u32,
        height: u32,
        color_type: ColorType,
    ) -> Self {
        Self {
            gpu,
            handle: NO_HANDLE,
            width,
            height,
            color_type,
            filter: TextureFilter::default(),
            reload_path: None,
            cache_id: NO_CACHE_ID,
            reloadable: false,
        }
    }

    /// Replace the GPU object with a fresh one holding `pixels`
    fn upload(&mut self, pixels: Option<&[u8]>) -> bool {
        self.release();
        self.handle = self
            .gpu
            .create_texture(self.width, self.height, self.color_type, pixels);
        if self.handle == NO_HANDLE {
            tracing::warn!(
                "Cannot allocate {}x{} {} texture",
                self.width,
                self.height,
                self.color_type.name()
            );
            return false;
        }
        if self.filter != TextureFilter::default() {
            self.gpu.set_texture_filter(self.handle, self.filter);
        }
        true
    }

    fn release(&mut self) {
        if self.handle != NO_HANDLE {
            self.gpu.delete_texture(self.handle);
            self.handle = NO_HANDLE;
        }
    }

    /// Allocate an empty GPU object again at the current size
    pub(crate) fn recreate_empty(&mut self) -> bool {
        self.upload(None)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_type(&self) -> ColorType {
        self.color_type
    }

    pub fn filter(&self) -> TextureFilter {
        self.filter
    }

    pub fn reload_path(&self) -> Option<&str> {
        self.reload_path.as_deref()
    }

    pub fn cache_id(&self) -> CacheId {
        self.cache_id
    }

    pub fn set_nearest_filter(&mut self) {
        self.set_filter(TextureFilter::Nearest);
    }

    pub fn set_linear_filter(&mut self) {
        self.set_filter(TextureFilter::Linear);
    }

    pub fn set_filter(&mut self, filter: TextureFilter) {
        self.filter = filter;
        if self.handle != NO_HANDLE {
            self.gpu.set_texture_filter(self.handle, filter);
        }
    }

    pub fn bind(&self) {
        self.gpu.bind_texture(self.handle);
    }

    pub fn unbind(&self) {
        self.gpu.bind_texture(NO_HANDLE);
    }

    /// Record the asset this texture was decoded from and track it for reload.
    /// A generated texture path points the reload at that texture cache entry.
    pub fn set_reload_path(&mut self, path: &str) {
        self.reload_path = Some(path.to_string());
        self.cache_id = parse_generated_texture_path(path).unwrap_or(NO_CACHE_ID);
        self.reloadable = true;
    }

    /// Register generated pixels with the texture cache so a reload can
    /// restore them without the code that produced them
    pub fn cache_pixels(&mut self, services: &AssetServices, data: &[u8], make_reloadable: bool) {
        self.cache_id = services.cache.register(data, self.cache_id);
        self.reload_path = Some(generated_texture_path(self.cache_id));
        if make_reloadable {
            self.reloadable = true;
        }
        tracing::debug!("Cached {} bytes as texture {}", data.len(), self.cache_id);
    }

    fn reload_from_asset(&mut self, path: &str, services: &AssetServices) -> bool {
        let Some(format) = services.decoders.for_path(path) else {
            tracing::error!("No image decoder for \"{}\"", path);
            return false;
        };
        let Some(image) = Image::load(path, FileLocation::Assets, services.files.as_ref(), format)
        else {
            return false;
        };
        self.width = image.width;
        self.height = image.height;
        self.color_type = image.color_type;
        self.upload(Some(&image.data))
    }

    fn reload_from_cache(&mut self, services: &AssetServices) -> bool {
        let Some(data) = services.cache.readback(self.cache_id) else {
            tracing::error!("Texture cache has no entry {}", self.cache_id);
            return false;
        };
        if data.len() < self.color_type.buffer_len(self.width, self.height) {
            tracing::error!("Texture cache entry {} is truncated", self.cache_id);
            return false;
        }
        self.upload(Some(&data))
    }
}

impl GpuResource for Texture {
    fn handle(&self) -> GpuHandle {
        self.handle
    }
}

impl Reloadable for Texture {
    fn is_reloadable(&self) -> bool {
        self.reloadable
    }

    fn set_reloadable(&mut self, reloadable: bool) {
        self.reloadable = reloadable;
    }

    fn discard(&mut self) {
        self.handle = NO_HANDLE;
    }

    fn reload(&mut self, services: &AssetServices) {
        let Some(path) = self.reload_path.clone() else {
            return;
        };
        let ok = if self.cache_id != NO_CACHE_ID {
            self.reload_from_cache(services)
        } else {
            self.reload_from_asset(&path, services)
        };
        if !ok {
            self.release();
            tracing::error!("Cannot reload texture from path \"{}\"", path);
        }
    }

    // Generated pixels are registered by `cache_pixels` when they are produced
    fn cache(&mut self, _services: &AssetServices) {}
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("handle", &self.handle)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("color_type", &self.color_type)
            .field("reload_path", &self.reload_path)
            .finish()
    }
}
