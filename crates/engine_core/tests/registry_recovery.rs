use engine_core::color::Color;
use engine_core::files::{FileLocation, FileResolver, MemoryFiles};
use engine_core::gpu::{GpuBackend, HeadlessBackend};
use engine_core::image::{ColorType, Image};
use engine_core::registry::{ReloadReport, ResourceRegistry};
use engine_core::resource::{AssetServices, FileTextureCache, MemoryTextureCache};
use std::io::Cursor;
use std::rc::Rc;

fn png_bytes(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(pixel));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn registry_with(
    files: Rc<MemoryFiles>,
    cache: Rc<MemoryTextureCache>,
) -> (Rc<HeadlessBackend>, ResourceRegistry) {
    let backend = Rc::new(HeadlessBackend::new());
    let gpu: Rc<dyn GpuBackend> = backend.clone();
    let registry = ResourceRegistry::new(gpu, AssetServices::new(files, cache));
    (backend, registry)
}

fn lose_and_recover(backend: &HeadlessBackend, registry: &mut ResourceRegistry) -> ReloadReport {
    registry.cache_all();
    backend.lose_context();
    registry.context_lost();
    registry.reload_all()
}

#[test]
fn loaded_textures_come_back_after_context_loss() {
    let files = Rc::new(MemoryFiles::new());
    files.insert("ship.png", FileLocation::Assets, png_bytes(4, 4, [1, 2, 3, 255]));
    let (backend, mut registry) = registry_with(files, Rc::new(MemoryTextureCache::new()));

    let id = registry.load_texture("ship.png").unwrap();
    assert!(registry.is_reloadable(id));
    assert_eq!(registry.texture(id).unwrap().reload_path(), Some("ship.png"));

    let report = lose_and_recover(&backend, &mut registry);
    assert_eq!(report, ReloadReport { reloaded: 1, failed: 0 });
    assert!(registry.is_valid(id));
    assert_eq!(backend.live_textures(), 1);
}

#[test]
fn load_failures_return_none() {
    let files = Rc::new(MemoryFiles::new());
    files.insert("notes.txt", FileLocation::Assets, b"hello".to_vec());
    let (_backend, mut registry) = registry_with(files, Rc::new(MemoryTextureCache::new()));
    assert!(registry.load_texture("missing.png").is_none());
    assert!(registry.load_texture("notes.txt").is_none());
    assert!(registry.is_empty());
}

#[test]
fn non_reloadable_resources_stay_invalid() {
    let (backend, mut registry) =
        registry_with(Rc::new(MemoryFiles::new()), Rc::new(MemoryTextureCache::new()));
    let tex = registry.create_texture(8, 8, ColorType::Rgba8);
    let fb = registry.create_framebuffer(8, 8, ColorType::Rgba8);

    let report = lose_and_recover(&backend, &mut registry);
    assert_eq!(report, ReloadReport::default());
    assert!(!registry.is_valid(tex));
    assert!(!registry.is_valid(fb));
}

#[test]
fn generated_texture_survives_via_cache() {
    let cache = Rc::new(MemoryTextureCache::new());
    let (backend, mut registry) = registry_with(Rc::new(MemoryFiles::new()), cache.clone());
    let pixels: Vec<u8> = (0..16).collect();
    let id = registry.create_generated_texture(Image::new(2, 2, ColorType::Rgba8, pixels.clone()));
    assert_eq!(cache.len(), 1);

    let report = lose_and_recover(&backend, &mut registry);
    assert_eq!(report.reloaded, 1);
    let handle = engine_core::resource::GpuResource::handle(registry.texture(id).unwrap());
    assert_eq!(backend.texture_pixels(handle), Some(pixels));
}

#[test]
fn evicted_cache_entry_is_reported_as_failure() {
    let cache = Rc::new(MemoryTextureCache::new());
    let (backend, mut registry) = registry_with(Rc::new(MemoryFiles::new()), cache.clone());
    let id = registry.create_generated_texture(Image::new(1, 1, ColorType::Alpha, vec![5]));
    cache.evict(registry.texture(id).unwrap().cache_id());

    let report = lose_and_recover(&backend, &mut registry);
    assert_eq!(report, ReloadReport { reloaded: 0, failed: 1 });
    assert!(!registry.is_valid(id));
}

#[test]
fn marked_framebuffer_keeps_its_contents() {
    let (backend, mut registry) =
        registry_with(Rc::new(MemoryFiles::new()), Rc::new(MemoryTextureCache::new()));
    let fb = registry.create_framebuffer(2, 2, ColorType::Rgba8);
    registry.framebuffer_mut(fb).unwrap().clear(Color::GREEN);
    assert!(registry.set_reloadable(fb, true));

    let report = lose_and_recover(&backend, &mut registry);
    assert_eq!(report.reloaded, 1);
    let data = registry.framebuffer_mut(fb).unwrap().read_pixels().data;
    assert_eq!(data, [0u8, 255, 0, 255].repeat(4));
}

#[test]
fn unmarking_removes_from_recovery() {
    let files = Rc::new(MemoryFiles::new());
    files.insert("a.png", FileLocation::Assets, png_bytes(1, 1, [0, 0, 0, 255]));
    let (backend, mut registry) = registry_with(files, Rc::new(MemoryTextureCache::new()));
    let id = registry.load_texture("a.png").unwrap();
    assert!(registry.set_reloadable(id, false));
    assert!(!registry.set_reloadable(999, true));

    lose_and_recover(&backend, &mut registry);
    assert!(!registry.is_valid(id));
}

#[test]
fn reload_order_does_not_matter() {
    let files = Rc::new(MemoryFiles::new());
    for i in 0..5 {
        files.insert(&format!("t{}.png", i), FileLocation::Assets, png_bytes(2, 2, [i, 0, 0, 255]));
    }
    let (backend, mut registry) = registry_with(files, Rc::new(MemoryTextureCache::new()));
    let mut ids: Vec<_> = (0..5)
        .map(|i| registry.load_texture(&format!("t{}.png", i)).unwrap())
        .collect();
    for _ in 0..5 {
        let fb = registry.create_framebuffer(4, 4, ColorType::Rgba8);
        registry.set_reloadable(fb, true);
        ids.push(fb);
    }

    let report = lose_and_recover(&backend, &mut registry);
    assert_eq!(report, ReloadReport { reloaded: 10, failed: 0 });
    assert!(ids.iter().all(|id| registry.is_valid(*id)));
    // a second recovery round lands in the same place
    let report = lose_and_recover(&backend, &mut registry);
    assert_eq!(report.reloaded, 10);
    assert_eq!(backend.live_textures(), 10);
    assert_eq!(backend.live_framebuffers(), 5);
}

#[test]
fn remove_releases_handles() {
    let (backend, mut registry) =
        registry_with(Rc::new(MemoryFiles::new()), Rc::new(MemoryTextureCache::new()));
    let tex = registry.create_texture(4, 4, ColorType::Rgba8);
    let fb = registry.create_framebuffer(4, 4, ColorType::Rgba8);
    assert_eq!(registry.len(), 2);
    assert!(registry.remove(tex));
    assert!(registry.remove(fb));
    assert!(!registry.remove(fb));
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(backend.live_framebuffers(), 0);
}

#[test]
fn file_cache_writes_generated_entries() {
    let files = Rc::new(MemoryFiles::new());
    // an entry left by an earlier run is not overwritten
    files.insert(".gentexture_1", FileLocation::AppFolder, vec![0xAA]);
    let backend = Rc::new(HeadlessBackend::new());
    let services = AssetServices::new(files.clone(), Rc::new(FileTextureCache::new(files.clone())));
    let mut registry = ResourceRegistry::new(backend.clone(), services);

    let id = registry.create_generated_texture(Image::new(1, 1, ColorType::Alpha, vec![7]));
    assert_eq!(registry.texture(id).unwrap().reload_path(), Some(".gentexture_2"));
    assert_eq!(
        files.read_file(".gentexture_2", FileLocation::AppFolder),
        Some(vec![7])
    );
    assert_eq!(
        files.read_file(".gentexture_1", FileLocation::AppFolder),
        Some(vec![0xAA])
    );

    let report = lose_and_recover(&backend, &mut registry);
    assert_eq!(report.reloaded, 1);
}
