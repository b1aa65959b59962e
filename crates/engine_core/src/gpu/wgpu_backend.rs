use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;

use super::{GpuBackend, GpuHandle, TextureFilter, NO_HANDLE};
use crate::color::Color;
use crate::image::ColorType;

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    width: u32,
    height: u32,
    color_type: ColorType,
}

struct WgpuState {
    next_handle: GpuHandle,
    textures: HashMap<GpuHandle, GpuTexture>,
    framebuffers: HashMap<GpuHandle, GpuHandle>,
    bound_texture: GpuHandle,
    bound_framebuffer: GpuHandle,
    viewport: (u32, u32),
}

/// [`GpuBackend`] on a wgpu device. Handles map to wgpu objects; "binding"
/// is tracked state that callers consult when they record their own passes.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    state: RefCell<WgpuState>,
}

fn texture_format(color_type: ColorType) -> wgpu::TextureFormat {
    match color_type {
        ColorType::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        ColorType::Alpha => wgpu::TextureFormat::R8Unorm,
    }
}

fn wgpu_filter(filter: TextureFilter) -> wgpu::FilterMode {
    match filter {
        TextureFilter::Nearest => wgpu::FilterMode::Nearest,
        TextureFilter::Linear => wgpu::FilterMode::Linear,
    }
}

impl WgpuBackend {
    /// Headless device without a surface
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("No adapter"))?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("engine_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;
        tracing::info!("GPU adapter: {}", adapter.get_info().name);
        Ok(Self::from_device(device, queue))
    }

    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            state: RefCell::new(WgpuState {
                next_handle: 1,
                textures: HashMap::new(),
                framebuffers: HashMap::new(),
                bound_texture: NO_HANDLE,
                bound_framebuffer: NO_HANDLE,
                viewport: (0, 0),
            }),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// View and sampler of the bound texture, for passes recorded outside the backend
    pub fn with_bound_texture<R>(
        &self,
        f: impl FnOnce(&wgpu::TextureView, &wgpu::Sampler) -> R,
    ) -> Option<R> {
        let st = self.state.borrow();
        st.textures
            .get(&st.bound_texture)
            .map(|t| f(&t.view, &t.sampler))
    }

    fn create_sampler(&self, filter: TextureFilter) -> wgpu::Sampler {
        let mode = wgpu_filter(filter);
        self.device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: mode,
            min_filter: mode,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        })
    }

    /// Run `f` inside validation + out-of-memory error scopes
    fn scoped<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        (value, validation.or(oom))
    }

    fn allocate_handle(&self) -> GpuHandle {
        let mut st = self.state.borrow_mut();
        let handle = st.next_handle;
        st.next_handle += 1;
        handle
    }
}

impl GpuBackend for WgpuBackend {
    fn create_texture(
        &self,
        width: u32,
        height: u32,
        color_type: ColorType,
        pixels: Option<&[u8]>,
    ) -> GpuHandle {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            tracing::warn!("Texture size {}x{} outside 1..={}", width, height, max);
            return NO_HANDLE;
        }
        let len = color_type.buffer_len(width, height);
        if pixels.is_some_and(|p| p.len() < len) {
            tracing::warn!("Texture data shorter than {}x{} {}", width, height, color_type.name());
            return NO_HANDLE;
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let (texture, error) = self.scoped(|| {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("engine_texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(color_type),
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            if let Some(data) = pixels {
                self.queue.write_texture(
                    wgpu::ImageCopyTexture {
                        aspect: wgpu::TextureAspect::All,
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                    },
                    &data[..len],
                    wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(width * color_type.bytes_per_pixel() as u32),
                        rows_per_image: Some(height),
                    },
                    size,
                );
            }
            texture
        });
        if let Some(e) = error {
            tracing::warn!("Texture allocation failed: {}", e);
            return NO_HANDLE;
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = self.create_sampler(TextureFilter::default());
        let handle = self.allocate_handle();
        self.state.borrow_mut().textures.insert(
            handle,
            GpuTexture {
                texture,
                view,
                sampler,
                width,
                height,
                color_type,
            },
        );
        handle
    }

    fn delete_texture(&self, texture: GpuHandle) {
        let mut st = self.state.borrow_mut();
        if let Some(t) = st.textures.remove(&texture) {
            t.texture.destroy();
            if st.bound_texture == texture {
                st.bound_texture = NO_HANDLE;
            }
        }
    }

    fn set_texture_filter(&self, texture: GpuHandle, filter: TextureFilter) {
        let sampler = self.create_sampler(filter);
        if let Some(t) = self.state.borrow_mut().textures.get_mut(&texture) {
            t.sampler = sampler;
        }
    }

    fn bind_texture(&self, texture: GpuHandle) {
        self.state.borrow_mut().bound_texture = texture;
    }

    fn bound_texture(&self) -> GpuHandle {
        self.state.borrow().bound_texture
    }

    fn create_framebuffer(&self) -> GpuHandle {
        let handle = self.allocate_handle();
        self.state.borrow_mut().framebuffers.insert(handle, NO_HANDLE);
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
                true
            }
            None => false,
        }
    }

    fn delete_framebuffer(&self, framebuffer: GpuHandle) {
        let mut st = self.state.borrow_mut();
        if st.framebuffers.remove(&framebuffer).is_some() && st.bound_framebuffer == framebuffer {
            st.bound_framebuffer = NO_HANDLE;
        }
    }

    fn bound_framebuffer(&self) -> GpuHandle {
        self.state.borrow().bound_framebuffer
    }

    fn bind_framebuffer(&self, framebuffer: GpuHandle) {
        self.state.borrow_mut().bound_framebuffer = framebuffer;
    }

    fn set_viewport(&self, width: u32, height: u32) {
        self.state.borrow_mut().viewport = (width, height);
    }

    fn viewport(&self) -> (u32, u32) {
        self.state.borrow().viewport
    }

    fn clear(&self, color: Color) {
        let st = self.state.borrow();
        let Some(target) = st
            .framebuffers
            .get(&st.bound_framebuffer)
            .and_then(|t| st.textures.get(t))
        else {
            return;
        };
        let c = color.to_vec4();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear_encoder"),
            });
        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: c.x as f64,
                            g: c.y as f64,
                            b: c.z as f64,
                            a: c.w as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn read_pixels(&self, width: u32, height: u32, color_type: ColorType) -> Vec<u8> {
        let mut out = vec![0; color_type.buffer_len(width, height)];
        let st = self.state.borrow();
        let Some(src) = st
            .framebuffers
            .get(&st.bound_framebuffer)
            .and_then(|t| st.textures.get(t))
        else {
            return out;
        };
        let (w, h) = (width.min(src.width), height.min(src.height));
        if w == 0 || h == 0 {
            return out;
        }

        // copy rows must be aligned; padding is stripped below
        let src_bpp = src.color_type.bytes_per_pixel() as u32;
        let unpadded = w * src_bpp;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: (padded * h) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &src.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(h),
                },
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        let _ = self.device.poll(wgpu::Maintain::Wait);
        {
            let mapped = slice.get_mapped_range();
            let dst_stride = width as usize * color_type.bytes_per_pixel();
            for y in 0..h as usize {
                let row = &mapped[y * padded as usize..][..unpadded as usize];
                src.color_type
                    .convert_row(row, color_type, &mut out[y * dst_stride..][..dst_stride]);
            }
        }
        staging.unmap();
        out
    }

    fn lose_context(&self) {
        let mut st = self.state.borrow_mut();
        for (_, t) in st.textures.drain() {
            t.texture.destroy();
        }
        st.framebuffers.clear();
        st.bound_texture = NO_HANDLE;
        st.bound_framebuffer = NO_HANDLE;
        tracing::warn!("GPU objects dropped (context lost)");
    }
}
