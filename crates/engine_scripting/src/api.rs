use anyhow::Result;
use engine_core::color::Color;
use engine_core::gpu::TextureFilter;
use engine_core::image::{ColorType, Image};
use engine_core::registry::{ResourceId, ResourceRegistry};
use engine_core::resource::GpuResource;
use mlua::{Lua, Table, UserData, UserDataMethods, Value};
use std::cell::RefCell;
use std::rc::Rc;

use crate::native::{register_function, register_value};
use crate::stack::{Pop, Push, ScriptStack};

/// Current engine API version
pub const API_VERSION: u32 = 1;

/// Messages per second `engine.log` lets through
const LOG_RATE_LIMIT: u32 = 30;

/// Engine handle types (opaque to Lua scripts). Id 0 never names a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureHandle(pub ResourceId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferHandle(pub ResourceId);

/// Either handle kind, for functions that accept any resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHandle(pub ResourceId);

impl UserData for TextureHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method("__tostring", |_, this, ()| {
            Ok(format!("Texture({})", this.0))
        });
        methods.add_meta_method("__eq", |_, this, other: mlua::AnyUserData| {
            Ok(other.borrow::<TextureHandle>().map(|o| *o == *this).unwrap_or(false))
        });
    }
}

impl UserData for FramebufferHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method("__tostring", |_, this, ()| {
            Ok(format!("Framebuffer({})", this.0))
        });
        methods.add_meta_method("__eq", |_, this, other: mlua::AnyUserData| {
            Ok(other.borrow::<FramebufferHandle>().map(|o| *o == *this).unwrap_or(false))
        });
    }
}

fn userdata_at<H: UserData + Copy + 'static>(stack: &ScriptStack<'_>, index: i32) -> Option<H> {
    match stack.value(index) {
        Value::UserData(ud) => ud.borrow::<H>().ok().map(|h| *h),
        _ => None,
    }
}

impl Push for TextureHandle {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        let ud = stack.lua().create_userdata(*self)?;
        stack.push_value(Value::UserData(ud));
        Ok(())
    }
}

impl Pop for TextureHandle {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        userdata_at(stack, index).unwrap_or(TextureHandle(0))
    }
}

impl Push for FramebufferHandle {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        let ud = stack.lua().create_userdata(*self)?;
        stack.push_value(Value::UserData(ud));
        Ok(())
    }
}

impl Pop for FramebufferHandle {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        userdata_at(stack, index).unwrap_or(FramebufferHandle(0))
    }
}

impl Pop for ResourceHandle {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        let id = userdata_at::<TextureHandle>(stack, index)
            .map(|t| t.0)
            .or_else(|| userdata_at::<FramebufferHandle>(stack, index).map(|f| f.0))
            .unwrap_or(0);
        ResourceHandle(id)
    }
}

/// Colors travel as `{ r = , g = , b = , a = }` with float channels
impl Push for Color {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        let table = stack.lua().create_table_with_capacity(0, 4)?;
        table.raw_set("r", self.r)?;
        table.raw_set("g", self.g)?;
        table.raw_set("b", self.b)?;
        table.raw_set("a", self.a)?;
        stack.push_value(Value::Table(table));
        Ok(())
    }
}

impl Pop for Color {
    // named fields or an array {r, g, b[, a]}; a missing alpha is opaque
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        let Value::Table(table) = stack.value(index) else {
            return Color::default();
        };
        let channel = |name: &str, i: usize, default: f32| -> f32 {
            let value = match table.raw_get::<Value>(name).unwrap_or(Value::Nil) {
                Value::Nil => table.raw_get::<Option<f32>>(i).ok().flatten(),
                Value::Integer(v) => Some(v as f32),
                Value::Number(v) => Some(v as f32),
                _ => None,
            };
            value.unwrap_or(default)
        };
        Color::rgb_float(
            channel("r", 1, 0.0),
            channel("g", 2, 0.0),
            channel("b", 3, 0.0),
            channel("a", 4, 1.0),
        )
    }
}

/// Color type from an optional name; nil or unknown names mean rgba
fn color_type_at(stack: &mut ScriptStack<'_>, index: i32) -> ColorType {
    match stack.pop::<Option<String>>(index) {
        Some(name) => ColorType::from_name(&name).unwrap_or_else(|| {
            tracing::warn!("Unknown color type \"{}\", using rgba", name);
            ColorType::default()
        }),
        None => ColorType::default(),
    }
}

/// Main engine API struct
pub struct EngineApi {
    registry: Rc<RefCell<ResourceRegistry>>,
    fixed_time: Rc<RefCell<f64>>, // shared with the log rate limiter
    log_rl: Rc<RefCell<(f64, u32)>>,
}

impl EngineApi {
    pub fn new(registry: Rc<RefCell<ResourceRegistry>>) -> Self {
        Self {
            registry,
            fixed_time: Rc::new(RefCell::new(0.0)),
            log_rl: Rc::new(RefCell::new((0.0, 0))),
        }
    }

    pub fn registry(&self) -> &Rc<RefCell<ResourceRegistry>> {
        &self.registry
    }

    pub fn update_time(&mut self, dt: f64) {
        *self.fixed_time.borrow_mut() += dt;
    }

    pub fn setup_engine_namespace(&self, lua: &Lua) -> Result<()> {
        let engine_table = lua
            .create_table()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        register_value(lua, &engine_table, "api_version", &API_VERSION)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        // Logging system (rate-limited per second of engine time)
        let fixed_time = self.fixed_time.clone();
        let log_rl = self.log_rl.clone();
        register_function(lua, &engine_table, "log", move |stack| {
            let level: String = stack.pop(1);
            let message: String = stack.pop(2);
            let now = *fixed_time.borrow();
            let mut rl = log_rl.borrow_mut();
            if now - rl.0 >= 1.0 {
                rl.0 = now;
                rl.1 = 0;
            }
            if rl.1 < LOG_RATE_LIMIT {
                rl.1 += 1;
                match level.as_str() {
                    "warn" => tracing::warn!("[Lua] {}", message),
                    "error" => tracing::error!("[Lua] {}", message),
                    "debug" => tracing::debug!("[Lua] {}", message),
                    _ => tracing::info!("[Lua] {}", message),
                }
            }
            Ok(0)
        })
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        let graphics = self
            .create_graphics_table(lua)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        engine_table
            .set("graphics", graphics)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        let color = create_color_table(lua).map_err(|e| anyhow::anyhow!(e.to_string()))?;
        engine_table
            .set("color", color)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        // Lock the engine table metatable
        let metatable = lua
            .create_table()
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        metatable
            .set("__metatable", "locked")
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        engine_table.set_metatable(Some(metatable));

        lua.globals()
            .set("engine", engine_table)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;

        tracing::info!("Engine API namespace initialized (version {})", API_VERSION);
        Ok(())
    }

    fn create_graphics_table(&self, lua: &Lua) -> mlua::Result<Table> {
        let graphics = lua.create_table()?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "load_texture", move |stack| {
            let path: String = stack.pop(1);
            let id = registry.borrow_mut().load_texture(&path);
            stack.push(&id.map(TextureHandle))?;
            Ok(1)
        })?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "create_texture", move |stack| {
            let width: u32 = stack.pop(1);
            let height: u32 = stack.pop(2);
            let color_type = color_type_at(stack, 3);
            let id = registry
                .borrow_mut()
                .create_texture(width, height, color_type);
            stack.push(&TextureHandle(id))?;
            Ok(1)
        })?;

        // Runtime pixels; cached so the texture survives a context loss
        let registry = self.registry.clone();
        register_function(lua, &graphics, "create_texture_from_pixels", move |stack| {
            let width: u32 = stack.pop(1);
            let height: u32 = stack.pop(2);
            let pixels: Vec<u8> = stack.pop(3);
            let color_type = color_type_at(stack, 4);
            let image = Image::new(width, height, color_type, pixels);
            if !image.is_consistent() {
                tracing::warn!(
                    "Pixel data does not match a {}x{} {} texture",
                    width,
                    height,
                    color_type.name()
                );
                stack.push_nil();
                return Ok(1);
            }
            let id = registry.borrow_mut().create_generated_texture(image);
            stack.push(&TextureHandle(id))?;
            Ok(1)
        })?;

        // Texture size, or viewport size for a framebuffer
        let registry = self.registry.clone();
        register_function(lua, &graphics, "texture_size", move |stack| {
            let ResourceHandle(id) = stack.pop(1);
            let registry = registry.borrow();
            let size = registry
                .texture(id)
                .map(|t| (t.width(), t.height()))
                .or_else(|| {
                    registry
                        .framebuffer(id)
                        .map(|f| (f.viewport_width(), f.viewport_height()))
                });
            let (width, height) = size.unwrap_or((0, 0));
            stack.push(&width)?;
            stack.push(&height)?;
            Ok(2)
        })?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "set_filter", move |stack| {
            let ResourceHandle(id) = stack.pop(1);
            let name: String = stack.pop(2);
            let Some(filter) = TextureFilter::from_name(&name) else {
                return Err(mlua::Error::RuntimeError(format!(
                    "set_filter: unknown filter \"{}\"",
                    name
                )));
            };
            let mut registry = registry.borrow_mut();
            let texture = if registry.texture(id).is_some() {
                registry.texture_mut(id)
            } else {
                registry.framebuffer_mut(id).map(|f| f.texture_mut())
            };
            let found = match texture {
                Some(texture) => {
                    texture.set_filter(filter);
                    true
                }
                None => false,
            };
            stack.push(&found)?;
            Ok(1)
        })?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "create_framebuffer", move |stack| {
            let width: u32 = stack.pop(1);
            let height: u32 = stack.pop(2);
            let color_type = color_type_at(stack, 3);
            let id = registry
                .borrow_mut()
                .create_framebuffer(width, height, color_type);
            stack.push(&FramebufferHandle(id))?;
            Ok(1)
        })?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "bind_framebuffer", move |stack| {
            let FramebufferHandle(id) = stack.pop(1);
            let found = match registry.borrow_mut().framebuffer_mut(id) {
                Some(framebuffer) => {
                    framebuffer.bind();
                    true
                }
                None => false,
            };
            stack.push(&found)?;
            Ok(1)
        })?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "unbind_framebuffer", move |stack| {
            let FramebufferHandle(id) = stack.pop(1);
            let found = match registry.borrow_mut().framebuffer_mut(id) {
                Some(framebuffer) => {
                    framebuffer.unbind();
                    true
                }
                None => false,
            };
            stack.push(&found)?;
            Ok(1)
        })?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "clear", move |stack| {
            let FramebufferHandle(id) = stack.pop(1);
            let color: Color = stack.pop(2);
            let found = match registry.borrow_mut().framebuffer_mut(id) {
                Some(framebuffer) => {
                    framebuffer.clear(color);
                    true
                }
                None => false,
            };
            stack.push(&found)?;
            Ok(1)
        })?;

        // -> width, height, pixels (flat byte array)
        let registry = self.registry.clone();
        register_function(lua, &graphics, "read_pixels", move |stack| {
            let FramebufferHandle(id) = stack.pop(1);
            let image = registry
                .borrow_mut()
                .framebuffer_mut(id)
                .filter(|f| f.is_valid())
                .map(|f| f.read_pixels());
            let Some(image) = image else {
                stack.push_nil();
                return Ok(1);
            };
            stack.push(&image.width)?;
            stack.push(&image.height)?;
            stack.push(&image.data)?;
            Ok(3)
        })?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "cache_framebuffer", move |stack| {
            let FramebufferHandle(id) = stack.pop(1);
            let mut registry = registry.borrow_mut();
            let found = registry.framebuffer(id).is_some() && registry.cache(id);
            stack.push(&found)?;
            Ok(1)
        })?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "set_reloadable", move |stack| {
            let ResourceHandle(id) = stack.pop(1);
            let reloadable: bool = stack.pop(2);
            let found = registry.borrow_mut().set_reloadable(id, reloadable);
            stack.push(&found)?;
            Ok(1)
        })?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "is_valid", move |stack| {
            let ResourceHandle(id) = stack.pop(1);
            let valid = registry.borrow().is_valid(id);
            stack.push(&valid)?;
            Ok(1)
        })?;

        let registry = self.registry.clone();
        register_function(lua, &graphics, "release", move |stack| {
            let ResourceHandle(id) = stack.pop(1);
            let removed = registry.borrow_mut().remove(id);
            stack.push(&removed)?;
            Ok(1)
        })?;

        Ok(graphics)
    }
}

fn create_color_table(lua: &Lua) -> mlua::Result<Table> {
    let color = lua.create_table()?;

    register_function(lua, &color, "rgb", |stack| {
        let r: u8 = stack.pop(1);
        let g: u8 = stack.pop(2);
        let b: u8 = stack.pop(3);
        let a = stack.pop::<Option<u8>>(4).unwrap_or(u8::MAX);
        stack.push(&Color::rgb(r, g, b, a))?;
        Ok(1)
    })?;

    register_function(lua, &color, "rgb_float", |stack| {
        let r: f32 = stack.pop(1);
        let g: f32 = stack.pop(2);
        let b: f32 = stack.pop(3);
        let a = stack.pop::<Option<f32>>(4).unwrap_or(1.0);
        stack.push(&Color::rgb_float(r, g, b, a))?;
        Ok(1)
    })?;

    register_function(lua, &color, "hex", |stack| {
        let hex: u32 = stack.pop(1);
        let a = stack.pop::<Option<f32>>(2).unwrap_or(1.0);
        stack.push(&Color::hex(hex, a))?;
        Ok(1)
    })?;

    register_function(lua, &color, "hex_string", |stack| {
        let hex: String = stack.pop(1);
        let a = stack.pop::<Option<f32>>(2).unwrap_or(1.0);
        stack.push(&Color::hex_string(&hex, a))?;
        Ok(1)
    })?;

    register_function(lua, &color, "from_uint32", |stack| {
        let packed: u32 = stack.pop(1);
        stack.push(&Color::from_uint32(packed))?;
        Ok(1)
    })?;

    register_function(lua, &color, "to_uint32", |stack| {
        let color: Color = stack.pop(1);
        stack.push(&color.to_uint32())?;
        Ok(1)
    })?;

    for (name, value) in Color::NAMED {
        register_value(lua, &color, name, &value)?;
    }

    Ok(color)
}
