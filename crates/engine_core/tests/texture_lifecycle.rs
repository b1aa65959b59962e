use engine_core::files::{FileLocation, MemoryFiles};
use engine_core::gpu::{GpuBackend, GpuCall, HeadlessBackend, TextureFilter, NO_HANDLE};
use engine_core::image::{ColorType, Image, PngFormat};
use engine_core::resource::{
    generated_texture_path, AssetServices, GpuResource, MemoryTextureCache, Reloadable,
};
use engine_core::texture::Texture;
use std::io::{self, Cursor};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

struct Fixture {
    backend: Rc<HeadlessBackend>,
    files: Rc<MemoryFiles>,
    cache: Rc<MemoryTextureCache>,
    services: AssetServices,
}

impl Fixture {
    fn new() -> Self {
        let backend = Rc::new(HeadlessBackend::new());
        let files = Rc::new(MemoryFiles::new());
        let cache = Rc::new(MemoryTextureCache::new());
        let services = AssetServices::new(files.clone(), cache.clone());
        Self {
            backend,
            files,
            cache,
            services,
        }
    }

    fn gpu(&self) -> Rc<dyn GpuBackend> {
        self.backend.clone()
    }

    fn lose_context(&self, textures: &mut [&mut Texture]) {
        self.backend.lose_context();
        for t in textures.iter_mut() {
            t.discard();
        }
    }
}

fn png_bytes(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(pixel));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Collects formatted log output for assertions
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn load_png(fx: &Fixture, path: &str) -> Texture {
    let image = Image::load(path, FileLocation::Assets, fx.files.as_ref(), &PngFormat).unwrap();
    let mut texture = Texture::from_image(fx.gpu(), image);
    texture.set_reload_path(path);
    texture
}

#[test]
fn empty_texture_is_valid_with_dimensions() {
    let fx = Fixture::new();
    let t = Texture::new_empty(fx.gpu(), 64, 32, ColorType::Alpha);
    assert!(t.is_valid());
    assert_eq!((t.width(), t.height()), (64, 32));
    assert_eq!(t.color_type(), ColorType::Alpha);
    assert_eq!(
        fx.backend.calls(),
        vec![GpuCall::CreateTexture {
            handle: t.handle(),
            width: 64,
            height: 32,
            color_type: ColorType::Alpha,
            with_pixels: false,
        }]
    );
    // not reloadable until something says how to rebuild it
    assert!(!t.is_reloadable());
}

#[test]
fn failed_allocation_leaves_texture_invalid() {
    let fx = Fixture::new();
    fx.backend.set_fail_allocations(true);
    let t = Texture::new_empty(fx.gpu(), 8, 8, ColorType::Rgba8);
    assert!(!t.is_valid());
    assert_eq!(t.handle(), NO_HANDLE);

    fx.backend.set_fail_allocations(false);
    let zero = Texture::new_empty(fx.gpu(), 0, 8, ColorType::Rgba8);
    assert!(!zero.is_valid());
    assert_eq!(fx.backend.live_textures(), 0);
}

#[test]
fn from_image_uploads_pixels() {
    let fx = Fixture::new();
    let image = Image::new(2, 1, ColorType::Rgba8, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    let t = Texture::from_image(fx.gpu(), image);
    assert_eq!(
        fx.backend.texture_pixels(t.handle()),
        Some(vec![1, 2, 3, 4, 5, 6, 7, 8])
    );
}

#[test]
fn filter_switches_are_idempotent_and_immediate() {
    let fx = Fixture::new();
    let mut t = Texture::new_empty(fx.gpu(), 4, 4, ColorType::Rgba8);
    assert_eq!(t.filter(), TextureFilter::Linear);

    t.set_nearest_filter();
    t.set_nearest_filter();
    assert_eq!(t.filter(), TextureFilter::Nearest);
    assert_eq!(fx.backend.texture_filter(t.handle()), Some(TextureFilter::Nearest));

    t.set_linear_filter();
    assert_eq!(fx.backend.texture_filter(t.handle()), Some(TextureFilter::Linear));
}

#[test]
fn bind_and_unbind_do_not_stack() {
    let fx = Fixture::new();
    let a = Texture::new_empty(fx.gpu(), 4, 4, ColorType::Rgba8);
    let b = Texture::new_empty(fx.gpu(), 4, 4, ColorType::Rgba8);
    a.bind();
    b.bind();
    assert_eq!(fx.backend.bound_texture(), b.handle());
    b.unbind();
    // unbind always goes to "nothing", never back to `a`
    assert_eq!(fx.backend.bound_texture(), NO_HANDLE);
}

#[test]
fn drop_releases_handle() {
    let fx = Fixture::new();
    let t = Texture::new_empty(fx.gpu(), 4, 4, ColorType::Rgba8);
    let handle = t.handle();
    assert_eq!(fx.backend.live_textures(), 1);
    drop(t);
    assert_eq!(fx.backend.live_textures(), 0);
    assert!(fx.backend.calls().contains(&GpuCall::DeleteTexture(handle)));
}

#[test]
fn path_backed_texture_survives_context_loss() {
    let fx = Fixture::new();
    fx.files
        .insert("hero.png", FileLocation::Assets, png_bytes(3, 2, [10, 20, 30, 255]));
    let mut t = load_png(&fx, "hero.png");
    t.set_nearest_filter();
    assert!(t.is_reloadable());
    let before = t.handle();

    fx.lose_context(&mut [&mut t]);
    assert!(!t.is_valid());

    t.reload(&fx.services);
    assert!(t.is_valid());
    assert_ne!(t.handle(), before);
    assert_eq!((t.width(), t.height()), (3, 2));
    assert_eq!(
        fx.backend.texture_pixels(t.handle()).unwrap()[..4],
        [10u8, 20, 30, 255]
    );
    // filter comes back with the new handle
    assert_eq!(fx.backend.texture_filter(t.handle()), Some(TextureFilter::Nearest));
}

#[test]
fn reload_is_idempotent() {
    let fx = Fixture::new();
    fx.files
        .insert("a.png", FileLocation::Assets, png_bytes(1, 1, [0, 0, 0, 255]));
    let mut t = load_png(&fx, "a.png");
    t.reload(&fx.services);
    t.reload(&fx.services);
    assert!(t.is_valid());
    assert_eq!(fx.backend.live_textures(), 1);
}

#[test]
fn unsupported_extension_fails_reload() {
    let fx = Fixture::new();
    fx.files
        .insert("sprite.bmp", FileLocation::Assets, vec![0x42, 0x4D, 0, 0]);
    let mut t = Texture::new_empty(fx.gpu(), 4, 4, ColorType::Rgba8);
    t.set_reload_path("sprite.bmp");

    fx.lose_context(&mut [&mut t]);
    let capture = LogCapture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || t.reload(&fx.services));
    assert!(!t.is_valid());

    let logs = capture.text();
    assert!(logs.contains("ERROR"));
    assert!(logs.contains("No image decoder for \"sprite.bmp\""));
}

#[test]
fn missing_or_corrupt_asset_fails_reload() {
    let fx = Fixture::new();
    fx.files
        .insert("a.png", FileLocation::Assets, png_bytes(1, 1, [0, 0, 0, 255]));
    let mut t = load_png(&fx, "a.png");
    fx.files.remove("a.png", FileLocation::Assets);
    fx.lose_context(&mut [&mut t]);
    t.reload(&fx.services);
    assert!(!t.is_valid());

    fx.files
        .insert("a.png", FileLocation::Assets, b"not a png".to_vec());
    t.reload(&fx.services);
    assert!(!t.is_valid());
}

#[test]
fn reload_without_path_is_a_noop() {
    let fx = Fixture::new();
    let mut t = Texture::new_empty(fx.gpu(), 4, 4, ColorType::Rgba8);
    let handle = t.handle();
    fx.backend.clear_calls();
    t.reload(&fx.services);
    assert_eq!(t.handle(), handle);
    assert!(fx.backend.calls().is_empty());
}

#[test]
fn generated_pixels_come_back_from_cache() {
    let fx = Fixture::new();
    let pixels = vec![9u8; 16];
    let mut t = Texture::from_image(fx.gpu(), Image::new(2, 2, ColorType::Rgba8, pixels.clone()));
    t.cache_pixels(&fx.services, &pixels, true);

    assert!(t.is_reloadable());
    assert_ne!(t.cache_id(), 0);
    assert_eq!(t.reload_path(), Some(generated_texture_path(t.cache_id()).as_str()));
    assert_eq!(t.reload_path(), Some(".gentexture_1"));

    fx.lose_context(&mut [&mut t]);
    t.reload(&fx.services);
    assert!(t.is_valid());
    assert_eq!(fx.backend.texture_pixels(t.handle()), Some(pixels));
}

#[test]
fn generated_path_shares_a_cache_entry() {
    let fx = Fixture::new();
    let pixels = vec![3u8; 4];
    let mut source = Texture::new_empty(fx.gpu(), 1, 1, ColorType::Rgba8);
    source.cache_pixels(&fx.services, &pixels, true);

    let mut copy = Texture::new_empty(fx.gpu(), 1, 1, ColorType::Rgba8);
    copy.set_reload_path(&generated_texture_path(source.cache_id()));
    assert_eq!(copy.cache_id(), source.cache_id());
    fx.lose_context(&mut [&mut copy]);
    copy.reload(&fx.services);
    assert_eq!(fx.backend.texture_pixels(copy.handle()), Some(pixels));

    // asset paths that merely look generated stay asset paths
    let mut odd = Texture::new_empty(fx.gpu(), 1, 1, ColorType::Rgba8);
    odd.set_reload_path(".gentexture_x");
    assert_eq!(odd.cache_id(), 0);
}

#[test]
fn caching_again_reuses_the_entry() {
    let fx = Fixture::new();
    let mut t = Texture::new_empty(fx.gpu(), 1, 1, ColorType::Alpha);
    t.cache_pixels(&fx.services, &[1], false);
    let id = t.cache_id();
    t.cache_pixels(&fx.services, &[2], false);
    assert_eq!(t.cache_id(), id);
    assert_eq!(fx.cache.len(), 1);
    // make_reloadable = false leaves the flag alone
    assert!(!t.is_reloadable());
}

#[test]
fn cache_miss_leaves_texture_invalid() {
    let fx = Fixture::new();
    let pixels = vec![7u8; 4];
    let mut t = Texture::from_image(fx.gpu(), Image::new(1, 1, ColorType::Rgba8, pixels.clone()));
    t.cache_pixels(&fx.services, &pixels, true);
    assert!(fx.cache.evict(t.cache_id()));

    fx.lose_context(&mut [&mut t]);
    t.reload(&fx.services);
    assert!(!t.is_valid());
}
