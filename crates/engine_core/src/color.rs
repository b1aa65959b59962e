use glam::Vec4;

/// RGBA color with float channels in [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb_float(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb_float(0.0, 0.0, 0.0, 1.0);
    pub const GRAY: Color = Color::rgb_float(0.5, 0.5, 0.5, 1.0);
    pub const RED: Color = Color::rgb_float(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Color = Color::rgb_float(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Color = Color::rgb_float(0.0, 0.0, 1.0, 1.0);
    pub const YELLOW: Color = Color::rgb_float(1.0, 1.0, 0.0, 1.0);
    pub const CYAN: Color = Color::rgb_float(0.0, 1.0, 1.0, 1.0);
    pub const PURPLE: Color = Color::rgb_float(1.0, 0.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgb_float(1.0, 1.0, 1.0, 0.0);

    /// Name/value pairs for every named constant, in declaration order
    pub const NAMED: [(&'static str, Color); 10] = [
        ("WHITE", Color::WHITE),
        ("BLACK", Color::BLACK),
        ("GRAY", Color::GRAY),
        ("RED", Color::RED),
        ("GREEN", Color::GREEN),
        ("BLUE", Color::BLUE),
        ("YELLOW", Color::YELLOW),
        ("CYAN", Color::CYAN),
        ("PURPLE", Color::PURPLE),
        ("TRANSPARENT", Color::TRANSPARENT),
    ];

    /// Channels from 0.0 to 1.0
    pub const fn rgb_float(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Channels from 0 to 255
    pub fn rgb(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::rgb_float(
            byte_to_float(r),
            byte_to_float(g),
            byte_to_float(b),
            byte_to_float(a),
        )
    }

    /// From `0xRRGGBB`; bits above the low 24 are ignored
    pub fn hex(hex: u32, a: f32) -> Self {
        Self::rgb_float(
            byte_to_float(((hex >> 16) & 0xFF) as u8),
            byte_to_float(((hex >> 8) & 0xFF) as u8),
            byte_to_float((hex & 0xFF) as u8),
            a,
        )
    }

    /// From `"#RRGGBB"` or `"RRGGBB"`. Anything else yields the default (all zero) color.
    pub fn hex_string(hex: &str, a: f32) -> Self {
        let digits = match hex.len() {
            6 => hex,
            7 => match hex.strip_prefix('#') {
                Some(rest) => rest,
                None => return Self::default(),
            },
            _ => return Self::default(),
        };
        match u32::from_str_radix(digits, 16) {
            Ok(value) if digits.bytes().all(|b| b.is_ascii_hexdigit()) => Self::hex(value, a),
            _ => Self::default(),
        }
    }

    /// From packed `0xRRGGBBAA`
    pub fn from_uint32(color: u32) -> Self {
        Self::rgb(
            (color >> 24) as u8,
            (color >> 16) as u8,
            (color >> 8) as u8,
            color as u8,
        )
    }

    pub fn r_byte(&self) -> u8 {
        float_to_byte(self.r)
    }

    pub fn g_byte(&self) -> u8 {
        float_to_byte(self.g)
    }

    pub fn b_byte(&self) -> u8 {
        float_to_byte(self.b)
    }

    pub fn a_byte(&self) -> u8 {
        float_to_byte(self.a)
    }

    /// Packed `0xRRGGBBAA`
    pub fn to_uint32(&self) -> u32 {
        (self.r_byte() as u32) << 24
            | (self.g_byte() as u32) << 16
            | (self.b_byte() as u32) << 8
            | self.a_byte() as u32
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        [self.r_byte(), self.g_byte(), self.b_byte(), self.a_byte()]
    }

    pub fn to_vec4(&self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }
}

impl From<Color> for Vec4 {
    fn from(color: Color) -> Self {
        color.to_vec4()
    }
}

impl From<Vec4> for Color {
    fn from(v: Vec4) -> Self {
        Color::rgb_float(v.x, v.y, v.z, v.w)
    }
}

/// Byte format (0-255) to float format (0.0-1.0)
pub fn byte_to_float(value: u8) -> f32 {
    value as f32 / 255.0
}

/// Float format to byte format, rounded and clamped to 0-255
pub fn float_to_byte(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}
