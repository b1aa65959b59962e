use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use super::{GpuBackend, GpuHandle, TextureFilter, NO_HANDLE};
use crate::color::Color;
use crate::image::ColorType;

/// One backend call, as recorded by [`HeadlessBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateTexture {
        handle: GpuHandle,
        width: u32,
        height: u32,
        color_type: ColorType,
        with_pixels: bool,
    },
    DeleteTexture(GpuHandle),
    SetFilter(GpuHandle, TextureFilter),
    BindTexture(GpuHandle),
    CreateFramebuffer(GpuHandle),
    AttachTexture {
        framebuffer: GpuHandle,
        texture: GpuHandle,
    },
    DeleteFramebuffer(GpuHandle),
    BindFramebuffer(GpuHandle),
    Viewport(u32, u32),
    Clear(GpuHandle),
    ReadPixels(GpuHandle),
    ContextLost,
}

struct CpuTexture {
    width: u32,
    height: u32,
    color_type: ColorType,
    filter: TextureFilter,
    pixels: Vec<u8>,
}

struct HeadlessState {
    // handles are never reused, even across a context loss
    next_handle: GpuHandle,
    textures: HashMap<GpuHandle, CpuTexture>,
    framebuffers: HashMap<GpuHandle, GpuHandle>,
    bound_texture: GpuHandle,
    bound_framebuffer: GpuHandle,
    viewport: (u32, u32),
    fail_allocations: bool,
    calls: VecDeque<GpuCall>,
    call_limit: usize,
}

impl HeadlessState {
    fn record(&mut self, call: GpuCall) {
        if self.call_limit == 0 {
            return;
        }
        if self.calls.len() == self.call_limit {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }
}

/// Calls kept by [`HeadlessBackend::new`]; older ones are dropped first
pub const MAX_RECORDED_CALLS: usize = 4096;

/// GPU backend that keeps every object in CPU memory and records the most
/// recent calls. Runs anywhere; the host falls back to it when no adapter is
/// available.
pub struct HeadlessBackend {
    state: RefCell<HeadlessState>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_call_limit(MAX_RECORDED_CALLS)
    }

    /// Keep at most `limit` recorded calls (0 records nothing)
    pub fn with_call_limit(limit: usize) -> Self {
        Self {
            state: RefCell::new(HeadlessState {
                next_handle: 1,
                textures: HashMap::new(),
                framebuffers: HashMap::new(),
                bound_texture: NO_HANDLE,
                bound_framebuffer: NO_HANDLE,
                viewport: (0, 0),
                fail_allocations: false,
                calls: VecDeque::with_capacity(limit.min(MAX_RECORDED_CALLS)),
                call_limit: limit,
            }),
        }
    }

    /// Make every following allocation return [`NO_HANDLE`]
    pub fn set_fail_allocations(&self, fail: bool) {
        self.state.borrow_mut().fail_allocations = fail;
    }

    pub fn calls(&self) -> Vec<GpuCall> {
        self.state.borrow().calls.iter().cloned().collect()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }

    pub fn is_texture(&self, handle: GpuHandle) -> bool {
        self.state.borrow().textures.contains_key(&handle)
    }

    pub fn is_framebuffer(&self, handle: GpuHandle) -> bool {
        self.state.borrow().framebuffers.contains_key(&handle)
    }

    pub fn texture_filter(&self, handle: GpuHandle) -> Option<TextureFilter> {
        self.state.borrow().textures.get(&handle).map(|t| t.filter)
    }

    /// Current contents of a texture
    pub fn texture_pixels(&self, handle: GpuHandle) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .textures
            .get(&handle)
            .map(|t| t.pixels.clone())
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessState {
    fn allocate(&mut self) -> Option<GpuHandle> {
        if self.fail_allocations {
            return None;
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        Some(handle)
    }

    fn bound_target_texture(&mut self) -> Option<&mut CpuTexture> {
        let attached = *self.framebuffers.get(&self.bound_framebuffer)?;
        self.textures.get_mut(&attached)
    }
}

impl GpuBackend for HeadlessBackend {
    fn create_texture(
        &self,
        width: u32,
        height: u32,
        color_type: ColorType,
        pixels: Option<&[u8]>,
    ) -> GpuHandle {
        let mut st = self.state.borrow_mut();
        let len = color_type.buffer_len(width, height);
        if width == 0 || height == 0 || pixels.is_some_and(|p| p.len() < len) {
            return NO_HANDLE;
        }
        let Some(handle) = st.allocate() else {
            return NO_HANDLE;
        };
        let data = match pixels {
            Some(p) => p[..len].to_vec(),
            None => vec![0; len],
        };
        st.textures.insert(
            handle,
            CpuTexture {
                width,
                height,
                color_type,
                filter: TextureFilter::default(),
                pixels: data,
            },
        );
        st.record(GpuCall::CreateTexture {
            handle,
            width,
            height,
            color_type,
            with_pixels: pixels.is_some(),
        });
        handle
    }

    fn delete_texture(&self, texture: GpuHandle) {
        let mut st = self.state.borrow_mut();
        if st.textures.remove(&texture).is_some() {
            if st.bound_texture == texture {
                st.bound_texture = NO_HANDLE;
            }
            st.record(GpuCall::DeleteTexture(texture));
        }
    }

    fn set_texture_filter(&self, texture: GpuHandle, filter: TextureFilter) {
        let mut st = self.state.borrow_mut();
        if let Some(t) = st.textures.get_mut(&texture) {
            t.filter = filter;
            st.record(GpuCall::SetFilter(texture, filter));
        }
    }

    fn bind_texture(&self, texture: GpuHandle) {
        let mut st = self.state.borrow_mut();
        st.bound_texture = texture;
        st.record(GpuCall::BindTexture(texture));
    }

    fn bound_texture(&self) -> GpuHandle {
        self.state.borrow().bound_texture
    }

    fn create_framebuffer(&self) -> GpuHandle {
        let mut st = self.state.borrow_mut();
        let Some(handle) = st.allocate() else {
            return NO_HANDLE;
        };
        st.framebuffers.insert(handle, NO_HANDLE);
        st.record(GpuCall::CreateFramebuffer(handle));
        handle
    }

    fn attach_texture(&self, framebuffer: GpuHandle, texture: GpuHandle) -> bool {
        let mut st = self.state.borrow_mut();
        if !st.textures.contains_key(&texture) {
            return false;
        }
        match st.framebuffers.get_mut(&framebuffer) {
            Some(slot) => {
                *slot = texture;
                st.record(GpuCall::AttachTexture {
                    framebuffer,
                    texture,
                });
                true
            }
            None => false,
        }
    }

    fn delete_framebuffer(&self, framebuffer: GpuHandle) {
        let mut st = self.state.borrow_mut();
        if st.framebuffers.remove(&framebuffer).is_some() {
            if st.bound_framebuffer == framebuffer {
                st.bound_framebuffer = NO_HANDLE;
            }
            st.record(GpuCall::DeleteFramebuffer(framebuffer));
        }
    }

    fn bound_framebuffer(&self) -> GpuHandle {
        self.state.borrow().bound_framebuffer
    }

    fn bind_framebuffer(&self, framebuffer: GpuHandle) {
        let mut st = self.state.borrow_mut();
        st.bound_framebuffer = framebuffer;
        st.record(GpuCall::BindFramebuffer(framebuffer));
    }

    fn set_viewport(&self, width: u32, height: u32) {
        let mut st = self.state.borrow_mut();
        st.viewport = (width, height);
        st.record(GpuCall::Viewport(width, height));
    }

    fn viewport(&self) -> (u32, u32) {
        self.state.borrow().viewport
    }

    fn clear(&self, color: Color) {
        let mut st = self.state.borrow_mut();
        let bound = st.bound_framebuffer;
        if let Some(target) = st.bound_target_texture() {
            let rgba = color.to_rgba8();
            match target.color_type {
                ColorType::Rgba8 => {
                    for px in target.pixels.chunks_exact_mut(4) {
                        px.copy_from_slice(&rgba);
                    }
                }
                ColorType::Alpha => target.pixels.fill(rgba[3]),
            }
        }
        st.record(GpuCall::Clear(bound));
    }

    fn read_pixels(&self, width: u32, height: u32, color_type: ColorType) -> Vec<u8> {
        let mut st = self.state.borrow_mut();
        let bound = st.bound_framebuffer;
        st.record(GpuCall::ReadPixels(bound));

        let mut out = vec![0; color_type.buffer_len(width, height)];
        let Some(src) = st.bound_target_texture() else {
            return out;
        };
        let src_stride = src.width as usize * src.color_type.bytes_per_pixel();
        let dst_stride = width as usize * color_type.bytes_per_pixel();
        let cols = width.min(src.width) as usize;
        for y in 0..height.min(src.height) as usize {
            let row = &src.pixels[y * src_stride..][..cols * src.color_type.bytes_per_pixel()];
            src.color_type
                .convert_row(row, color_type, &mut out[y * dst_stride..][..dst_stride]);
        }
        out
    }

    fn lose_context(&self) {
        let mut st = self.state.borrow_mut();
        st.textures.clear();
        st.framebuffers.clear();
        st.bound_texture = NO_HANDLE;
        st.bound_framebuffer = NO_HANDLE;
        st.record(GpuCall::ContextLost);
    }
}
