pub mod color;
pub mod config;
pub mod files;
pub mod framebuffer;
pub mod gpu;
pub mod image;
pub mod registry;
pub mod resource;
pub mod texture;
