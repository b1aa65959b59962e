use std::rc::Rc;

use crate::color::Color;
use crate::gpu::{GpuBackend, GpuHandle, NO_HANDLE};
use crate::image::{ColorType, Image};
use crate::resource::{AssetServices, GpuResource, Reloadable};
use crate::texture::Texture;

/// Render target with an exclusively owned color texture.
///
/// `bind` remembers the previously bound target in a single slot and
/// `unbind` restores it. Binding the same framebuffer twice overwrites that
/// slot with itself, so bind → bind → unbind leaves this framebuffer bound
/// and the outer target is lost. Nesting different framebuffers one level
/// deep each is fine.
pub struct Framebuffer {
    gpu: Rc<dyn GpuBackend>,
    handle: GpuHandle,
    prev_handle: GpuHandle,
    viewport_width: u32,
    viewport_height: u32,
    texture: Texture,
    reloadable: bool,
}

impl Framebuffer {
    pub fn new(
        gpu: Rc<dyn GpuBackend>,
        viewport_width: u32,
        viewport_height: u32,
        color_type: ColorType,
    ) -> Self {
        let texture = Texture::new_empty(gpu.clone(), viewport_width, viewport_height, color_type);
        let mut framebuffer = Self {
            gpu,
            handle: NO_HANDLE,
            prev_handle: NO_HANDLE,
            viewport_width,
            viewport_height,
            texture,
            reloadable: false,
        };
        framebuffer.allocate();
        framebuffer
    }

    /// Create the GPU object and attach the texture. Leaves the handle at 0 on failure.
    fn allocate(&mut self) -> bool {
        self.release();
        if !self.texture.is_valid() {
            tracing::warn!("Framebuffer texture is invalid, not creating framebuffer");
            return false;
        }
        let handle = self.gpu.create_framebuffer();
        if handle == NO_HANDLE {
            tracing::warn!("Cannot allocate framebuffer");
            return false;
        }
        if !self.gpu.attach_texture(handle, self.texture.handle()) {
            tracing::warn!("Cannot attach texture {} to framebuffer", self.texture.handle());
            self.gpu.delete_framebuffer(handle);
            return false;
        }
        self.handle = handle;
        true
    }

    fn release(&mut self) {
        if self.handle != NO_HANDLE {
            self.gpu.delete_framebuffer(self.handle);
            self.handle = NO_HANDLE;
        }
    }

    pub fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    pub fn viewport_height(&self) -> u32 {
        self.viewport_height
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn texture_mut(&mut self) -> &mut Texture {
        &mut self.texture
    }

    pub fn bind(&mut self) {
        self.prev_handle = self.gpu.bound_framebuffer();
        self.gpu.bind_framebuffer(self.handle);
        self.gpu.set_viewport(self.viewport_width, self.viewport_height);
    }

    pub fn unbind(&mut self) {
        self.gpu.bind_framebuffer(self.prev_handle);
    }

    /// Run `draw` with this framebuffer as the target, then rebind whatever was
    /// bound before along with its viewport. Leaves the `bind`/`unbind` slot untouched.
    fn with_target<R>(&self, draw: impl FnOnce() -> R) -> R {
        let previous = self.gpu.bound_framebuffer();
        if previous == self.handle {
            return draw();
        }
        let (prev_width, prev_height) = self.gpu.viewport();
        self.gpu.bind_framebuffer(self.handle);
        self.gpu.set_viewport(self.viewport_width, self.viewport_height);
        let out = draw();
        self.gpu.bind_framebuffer(previous);
        self.gpu.set_viewport(prev_width, prev_height);
        out
    }

    pub fn clear(&mut self, color: Color) {
        if !self.is_valid() {
            return;
        }
        self.with_target(|| self.gpu.clear(color));
    }

    /// Blocking readback of the whole viewport in the texture's layout
    pub fn read_pixels(&self) -> Image {
        let color_type = self.texture.color_type();
        if !self.is_valid() {
            let data = vec![0; color_type.buffer_len(self.viewport_width, self.viewport_height)];
            return Image::new(self.viewport_width, self.viewport_height, color_type, data);
        }
        let data = self.with_target(|| {
            self.gpu.read_pixels(self.viewport_width, self.viewport_height, color_type)
        });
        Image::new(self.viewport_width, self.viewport_height, color_type, data)
    }
}

impl GpuResource for Framebuffer {
    fn handle(&self) -> GpuHandle {
        self.handle
    }

    fn is_valid(&self) -> bool {
        self.handle != NO_HANDLE && self.texture.is_valid()
    }
}

impl Reloadable for Framebuffer {
    fn is_reloadable(&self) -> bool {
        self.reloadable
    }

    fn set_reloadable(&mut self, reloadable: bool) {
        self.reloadable = reloadable;
    }

    fn discard(&mut self) {
        self.handle = NO_HANDLE;
        self.prev_handle = NO_HANDLE;
        self.texture.discard();
    }

    fn reload(&mut self, services: &AssetServices) {
        // cached contents first, otherwise an empty target of the same size
        if self.texture.reload_path().is_some() {
            self.texture.reload(services);
        } else {
            self.texture.recreate_empty();
        }
        if !self.allocate() {
            tracing::error!(
                "Cannot reload {}x{} framebuffer",
                self.viewport_width,
                self.viewport_height
            );
        }
    }

    fn cache(&mut self, services: &AssetServices) {
        self.reloadable = true;
        if !self.is_valid() {
            return;
        }
        let pixels = self.read_pixels();
        self.texture.cache_pixels(services, &pixels.data, false);
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("handle", &self.handle)
            .field("viewport_width", &self.viewport_width)
            .field("viewport_height", &self.viewport_height)
            .field("texture", &self.texture)
            .finish()
    }
}
