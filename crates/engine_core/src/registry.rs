use std::collections::HashMap;
use std::rc::Rc;

use crate::files::FileLocation;
use crate::framebuffer::Framebuffer;
use crate::gpu::GpuBackend;
use crate::image::{ColorType, Image};
use crate::resource::{AssetServices, GpuResource, Reloadable};
use crate::texture::Texture;

/// Engine-side id of a texture or framebuffer owned by the registry
pub type ResourceId = u32;

/// Outcome of [`ResourceRegistry::reload_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub reloaded: u32,
    pub failed: u32,
}

/// Owns every script-visible GPU resource and drives context-loss recovery
pub struct ResourceRegistry {
    gpu: Rc<dyn GpuBackend>,
    services: AssetServices,
    next_id: ResourceId,
    textures: HashMap<ResourceId, Texture>,
    framebuffers: HashMap<ResourceId, Framebuffer>,
}

impl ResourceRegistry {
    pub fn new(gpu: Rc<dyn GpuBackend>, services: AssetServices) -> Self {
        Self {
            gpu,
            services,
            next_id: 1,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
        }
    }

    pub fn gpu(&self) -> &Rc<dyn GpuBackend> {
        &self.gpu
    }

    pub fn services(&self) -> &AssetServices {
        &self.services
    }

    fn next_id(&mut self) -> ResourceId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_texture(&mut self, texture: Texture) -> ResourceId {
        let id = self.next_id();
        self.textures.insert(id, texture);
        id
    }

    pub fn add_framebuffer(&mut self, framebuffer: Framebuffer) -> ResourceId {
        let id = self.next_id();
        self.framebuffers.insert(id, framebuffer);
        id
    }

    /// Decode an asset and upload it; the texture reloads from the same path
    pub fn load_texture(&mut self, path: &str) -> Option<ResourceId> {
        let Some(format) = self.services.decoders.for_path(path) else {
            tracing::warn!("No image decoder for \"{}\"", path);
            return None;
        };
        let image = Image::load(
            path,
            FileLocation::Assets,
            self.services.files.as_ref(),
            format,
        )?;
        let mut texture = Texture::from_image(self.gpu.clone(), image);
        texture.set_reload_path(path);
        tracing::info!("Loaded texture \"{}\" ({}x{})", path, texture.width(), texture.height());
        Some(self.add_texture(texture))
    }

    pub fn create_texture(&mut self, width: u32, height: u32, color_type: ColorType) -> ResourceId {
        let texture = Texture::new_empty(self.gpu.clone(), width, height, color_type);
        self.add_texture(texture)
    }

    /// Texture from pixels produced at runtime, cached so it survives context loss
    pub fn create_generated_texture(&mut self, image: Image) -> ResourceId {
        let data = image.data.clone();
        let mut texture = Texture::from_image(self.gpu.clone(), image);
        texture.cache_pixels(&self.services, &data, true);
        self.add_texture(texture)
    }

    pub fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        color_type: ColorType,
    ) -> ResourceId {
        let framebuffer = Framebuffer::new(self.gpu.clone(), width, height, color_type);
        self.add_framebuffer(framebuffer)
    }

    pub fn texture(&self, id: ResourceId) -> Option<&Texture> {
        self.textures.get(&id)
    }

    pub fn texture_mut(&mut self, id: ResourceId) -> Option<&mut Texture> {
        self.textures.get_mut(&id)
    }

    pub fn framebuffer(&self, id: ResourceId) -> Option<&Framebuffer> {
        self.framebuffers.get(&id)
    }

    pub fn framebuffer_mut(&mut self, id: ResourceId) -> Option<&mut Framebuffer> {
        self.framebuffers.get_mut(&id)
    }

    /// Drop a resource, releasing its GPU handles
    pub fn remove(&mut self, id: ResourceId) -> bool {
        self.textures.remove(&id).is_some() || self.framebuffers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.textures.len() + self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Include or exclude a resource from context-loss recovery
    pub fn set_reloadable(&mut self, id: ResourceId, reloadable: bool) -> bool {
        match self.resource_mut(id) {
            Some(resource) => {
                resource.set_reloadable(reloadable);
                true
            }
            None => false,
        }
    }

    pub fn is_reloadable(&self, id: ResourceId) -> bool {
        self.textures
            .get(&id)
            .map(|t| t.is_reloadable())
            .or_else(|| self.framebuffers.get(&id).map(|f| f.is_reloadable()))
            .unwrap_or(false)
    }

    pub fn is_valid(&self, id: ResourceId) -> bool {
        self.textures
            .get(&id)
            .map(|t| t.is_valid())
            .or_else(|| self.framebuffers.get(&id).map(|f| f.is_valid()))
            .unwrap_or(false)
    }

    /// Let a framebuffer save its contents and join recovery
    pub fn cache(&mut self, id: ResourceId) -> bool {
        let services = self.services.clone();
        match self.resource_mut(id) {
            Some(resource) => {
                resource.cache(&services);
                true
            }
            None => false,
        }
    }

    fn resource_mut(&mut self, id: ResourceId) -> Option<&mut dyn Reloadable> {
        if let Some(t) = self.textures.get_mut(&id) {
            return Some(t);
        }
        self.framebuffers
            .get_mut(&id)
            .map(|f| f as &mut dyn Reloadable)
    }

    fn resources_mut(&mut self) -> impl Iterator<Item = &mut dyn Reloadable> {
        self.textures
            .values_mut()
            .map(|t| t as &mut dyn Reloadable)
            .chain(
                self.framebuffers
                    .values_mut()
                    .map(|f| f as &mut dyn Reloadable),
            )
    }

    /// Call before the platform takes the context away
    pub fn cache_all(&mut self) {
        let services = self.services.clone();
        let mut cached = 0;
        for resource in self.resources_mut().filter(|r| r.is_reloadable()) {
            resource.cache(&services);
            cached += 1;
        }
        tracing::debug!("Cached {} reloadable resources", cached);
    }

    /// Every handle died with the old context
    pub fn context_lost(&mut self) {
        for resource in self.resources_mut() {
            resource.discard();
        }
        tracing::warn!("GPU context lost, {} resources invalidated", self.len());
    }

    /// Rebuild every reloadable resource on the new context
    pub fn reload_all(&mut self) -> ReloadReport {
        let services = self.services.clone();
        let mut report = ReloadReport::default();
        for resource in self.resources_mut().filter(|r| r.is_reloadable()) {
            resource.reload(&services);
            if resource.is_valid() {
                report.reloaded += 1;
            } else {
                report.failed += 1;
            }
        }
        if report.failed > 0 {
            tracing::error!(
                "Reloaded {} resources, {} failed",
                report.reloaded,
                report.failed
            );
        } else {
            tracing::info!("Reloaded {} resources", report.reloaded);
        }
        report
    }
}
