use crate::files::{file_extension, FileLocation, FileResolver};

/// Pixel layout of textures, framebuffers and decoded images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorType {
    #[default]
    Rgba8,
    Alpha,
}

impl ColorType {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorType::Rgba8 => 4,
            ColorType::Alpha => 1,
        }
    }

    /// Byte length of a tightly packed `width` x `height` buffer
    pub fn buffer_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    /// Convert a row of pixels in this layout into `target`. Stops at whichever
    /// row runs out first. Alpha expands to black with that alpha.
    pub fn convert_row(self, src: &[u8], target: ColorType, dst: &mut [u8]) {
        let src_pixels = src.chunks_exact(self.bytes_per_pixel());
        let dst_pixels = dst.chunks_exact_mut(target.bytes_per_pixel());
        for (s, d) in src_pixels.zip(dst_pixels) {
            match (self, target) {
                (ColorType::Rgba8, ColorType::Alpha) => d[0] = s[3],
                (ColorType::Alpha, ColorType::Rgba8) => d[3] = s[0],
                _ => d.copy_from_slice(s),
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorType::Rgba8 => "rgba",
            ColorType::Alpha => "alpha",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rgba" => Some(ColorType::Rgba8),
            "alpha" => Some(ColorType::Alpha),
            _ => None,
        }
    }
}

/// Decoded pixel data, rows top to bottom, tightly packed
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub color_type: ColorType,
    pub data: Vec<u8>,
}

impl Image {
    pub fn new(width: u32, height: u32, color_type: ColorType, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            color_type,
            data,
        }
    }

    /// Read and decode a file. `None` when the file is missing or the decoder rejects it.
    pub fn load(
        path: &str,
        location: FileLocation,
        files: &dyn FileResolver,
        format: &dyn ImageFormat,
    ) -> Option<Self> {
        let bytes = files.read_file(path, location)?;
        let image = format.decode(&bytes);
        if image.is_none() {
            tracing::warn!("Failed to decode {} image \"{}\"", format.extension(), path);
        }
        image
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when `data` holds exactly `width * height` pixels of `color_type`
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.color_type.buffer_len(self.width, self.height)
    }
}

/// Decoder for one image file format
pub trait ImageFormat {
    /// Lowercase file extension this format handles
    fn extension(&self) -> &'static str;
    fn decode(&self, bytes: &[u8]) -> Option<Image>;
}

pub struct PngFormat;

impl ImageFormat for PngFormat {
    fn extension(&self) -> &'static str {
        "png"
    }

    fn decode(&self, bytes: &[u8]) -> Option<Image> {
        let img = ::image::load_from_memory_with_format(bytes, ::image::ImageFormat::Png).ok()?;
        let (width, height) = (img.width(), img.height());
        // Single channel PNGs are alpha masks
        let decoded = match img {
            ::image::DynamicImage::ImageLuma8(luma) => {
                Image::new(width, height, ColorType::Alpha, luma.into_raw())
            }
            other => Image::new(width, height, ColorType::Rgba8, other.to_rgba8().into_raw()),
        };
        Some(decoded)
    }
}

/// Extension-keyed decoder set; PNG is registered by default
pub struct ImageDecoders {
    formats: Vec<Box<dyn ImageFormat>>,
}

impl ImageDecoders {
    pub fn empty() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Later registrations win over earlier ones for the same extension
    pub fn register(&mut self, format: Box<dyn ImageFormat>) {
        self.formats.push(format);
    }

    pub fn for_extension(&self, ext: &str) -> Option<&dyn ImageFormat> {
        self.formats
            .iter()
            .rev()
            .find(|f| f.extension() == ext)
            .map(|f| f.as_ref())
    }

    pub fn for_path(&self, path: &str) -> Option<&dyn ImageFormat> {
        self.for_extension(&file_extension(path))
    }
}

impl Default for ImageDecoders {
    fn default() -> Self {
        let mut decoders = Self::empty();
        decoders.register(Box::new(PngFormat));
        decoders
    }
}
