mod headless;
mod wgpu_backend;

pub use headless::{GpuCall, HeadlessBackend, MAX_RECORDED_CALLS};
pub use wgpu_backend::WgpuBackend;

use crate::color::Color;
use crate::image::ColorType;

/// Native GPU object name. 0 means "not allocated".
pub type GpuHandle = u32;

pub const NO_HANDLE: GpuHandle = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

impl TextureFilter {
    pub fn name(self) -> &'static str {
        match self {
            TextureFilter::Nearest => "nearest",
            TextureFilter::Linear => "linear",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "nearest" => Some(TextureFilter::Nearest),
            "linear" => Some(TextureFilter::Linear),
            _ => None,
        }
    }
}

/// Handle-based graphics device.
///
/// Every call happens on the render/script thread. Allocation failures are
/// reported as [`NO_HANDLE`], never as panics, so resources can stay
/// constructible but invalid. Handles passed in that the backend does not
/// know (stale after a context loss, or already deleted) are ignored.
pub trait GpuBackend {
    /// Allocate a texture, optionally uploading tightly packed `pixels`
    fn create_texture(
        &self,
        width: u32,
        height: u32,
        color_type: ColorType,
        pixels: Option<&[u8]>,
    ) -> GpuHandle;
    fn delete_texture(&self, texture: GpuHandle);
    fn set_texture_filter(&self, texture: GpuHandle, filter: TextureFilter);
    /// Bind to the active texture unit; [`NO_HANDLE`] unbinds
    fn bind_texture(&self, texture: GpuHandle);
    fn bound_texture(&self) -> GpuHandle;

    fn create_framebuffer(&self) -> GpuHandle;
    /// Attach `texture` as the color output. False if either handle is unknown.
    fn attach_texture(&self, framebuffer: GpuHandle, texture: GpuHandle) -> bool;
    fn delete_framebuffer(&self, framebuffer: GpuHandle);
    /// Currently bound render target; [`NO_HANDLE`] is the default target
    fn bound_framebuffer(&self) -> GpuHandle;
    fn bind_framebuffer(&self, framebuffer: GpuHandle);
    fn set_viewport(&self, width: u32, height: u32);
    fn viewport(&self) -> (u32, u32);

    /// Fill the bound render target with `color`
    fn clear(&self, color: Color);
    /// Synchronous readback of the bound render target
    fn read_pixels(&self, width: u32, height: u32, color_type: ColorType) -> Vec<u8>;

    /// Drop every object, as the OS does when it takes the context away
    fn lose_context(&self);
}
