pub mod api;
pub mod collections;
pub mod dynamic;
pub mod native;
pub mod platform;
pub mod sandbox;
pub mod stack;

pub use native::{create_native_function, register_function, register_value, NativeFn};
pub use stack::{Pop, Push, ScriptStack};
