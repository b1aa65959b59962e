//! Value marshalling between Lua and native types.
//!
//! [`ScriptStack`] mirrors the Lua C stack: values are pushed on top and
//! read back by index without being removed. Indices follow Lua: `1` is the
//! bottom slot, `-1` the top; anything outside the stack reads as `nil`.
//!
//! Each native type picks its conversion through [`Push`] and [`Pop`]. Pops
//! are total: a Lua value of the wrong type produces the native type's
//! zero/empty value instead of an error, so malformed script data never takes
//! the host down.

use mlua::{LightUserData, Lua, MultiValue, Value};

pub struct ScriptStack<'lua> {
    lua: &'lua Lua,
    slots: Vec<Value>,
}

impl<'lua> ScriptStack<'lua> {
    pub fn new(lua: &'lua Lua) -> Self {
        Self {
            lua,
            slots: Vec::new(),
        }
    }

    /// Stack holding the arguments of a native call, first argument at index 1
    pub fn with_args(lua: &'lua Lua, args: MultiValue) -> Self {
        Self {
            lua,
            slots: args.into_iter().collect(),
        }
    }

    pub fn lua(&self) -> &'lua Lua {
        self.lua
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn push<T: Push + ?Sized>(&mut self, value: &T) -> mlua::Result<()> {
        value.push(self)
    }

    pub fn pop<T: Pop>(&mut self, index: i32) -> T {
        T::pop(self, index)
    }

    pub fn push_value(&mut self, value: Value) {
        Vec::push(&mut self.slots, value);
    }

    pub fn push_nil(&mut self) {
        Vec::push(&mut self.slots, Value::Nil);
    }

    /// Slot position for a Lua-style index
    fn position(&self, index: i32) -> Option<usize> {
        let len = self.slots.len() as i64;
        let index = index as i64;
        let pos = if index > 0 { index - 1 } else { len + index };
        (index != 0 && pos >= 0 && pos < len).then_some(pos as usize)
    }

    /// Copy of the value at `index`, `nil` when out of range
    pub fn value(&self, index: i32) -> Value {
        self.position(index)
            .map(|pos| self.slots[pos].clone())
            .unwrap_or(Value::Nil)
    }

    pub fn type_name(&self, index: i32) -> &'static str {
        match self.position(index) {
            Some(pos) => self.slots[pos].type_name(),
            None => "no value",
        }
    }

    pub fn is_nil(&self, index: i32) -> bool {
        matches!(self.value(index), Value::Nil)
    }

    /// Remove the slot at `index`, shifting the ones above it down
    pub fn remove(&mut self, index: i32) {
        if let Some(pos) = self.position(index) {
            self.slots.remove(pos);
        }
    }

    /// Remove and return the top slot
    pub fn take_top(&mut self) -> Value {
        self.slots.pop().unwrap_or(Value::Nil)
    }

    /// Drop slots until `len` remain
    pub fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
    }

    /// The top `count` slots as call results, bottom-most first
    pub fn into_results(mut self, count: usize) -> MultiValue {
        let start = self.slots.len().saturating_sub(count);
        self.slots.drain(start..).collect()
    }
}

/// Native value that can be placed on a [`ScriptStack`]
pub trait Push {
    /// Push exactly one value. Fails only if Lua cannot allocate.
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()>;
}

/// Native value that can be read from a [`ScriptStack`]
pub trait Pop: Sized {
    /// Read the value at `index` without removing it. Never fails.
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self;
}

// a shared reference marshals exactly like the value it points to
impl<T: Push + ?Sized> Push for &T {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        (**self).push(stack)
    }
}

macro_rules! integer_kind {
    ($($t:ty),*) => {$(
        impl Push for $t {
            fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
                let value = i64::try_from(*self)
                    .map(Value::Integer)
                    .unwrap_or(Value::Number(*self as f64));
                stack.push_value(value);
                Ok(())
            }
        }

        impl Pop for $t {
            fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
                match stack.value(index) {
                    Value::Integer(i) => i as $t,
                    // `as` truncates toward zero and saturates
                    Value::Number(n) => n as $t,
                    _ => 0,
                }
            }
        }
    )*};
}

integer_kind!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! float_kind {
    ($($t:ty),*) => {$(
        impl Push for $t {
            fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
                stack.push_value(Value::Number(*self as f64));
                Ok(())
            }
        }

        impl Pop for $t {
            fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
                match stack.value(index) {
                    Value::Integer(i) => i as $t,
                    Value::Number(n) => n as $t,
                    _ => 0.0,
                }
            }
        }
    )*};
}

float_kind!(f32, f64);

impl Push for bool {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        stack.push_value(Value::Boolean(*self));
        Ok(())
    }
}

impl Pop for bool {
    // strict: truthy non-booleans are still `false`
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        matches!(stack.value(index), Value::Boolean(true))
    }
}

impl Push for str {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        let s = stack.lua().create_string(self)?;
        stack.push_value(Value::String(s));
        Ok(())
    }
}

impl Push for String {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        self.as_str().push(stack)
    }
}

impl Pop for String {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        string_bytes(stack, index)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

/// Raw bytes of a string slot; numbers are converted the way Lua's
/// `tostring` converts them. `None` for every other type.
pub(crate) fn string_bytes(stack: &ScriptStack<'_>, index: i32) -> Option<Vec<u8>> {
    match stack.value(index) {
        Value::String(s) => Some(s.as_bytes().to_vec()),
        v @ (Value::Integer(_) | Value::Number(_)) => stack
            .lua()
            .coerce_string(v)
            .ok()
            .flatten()
            .map(|s| s.as_bytes().to_vec()),
        _ => None,
    }
}

impl<T: Push> Push for Option<T> {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        match self {
            Some(value) => value.push(stack),
            None => {
                stack.push_nil();
                Ok(())
            }
        }
    }
}

impl<T: Pop> Pop for Option<T> {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        if stack.is_nil(index) {
            None
        } else {
            Some(T::pop(stack, index))
        }
    }
}

impl Push for LightUserData {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        stack.push_value(Value::LightUserData(*self));
        Ok(())
    }
}

impl Pop for LightUserData {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        match stack.value(index) {
            Value::LightUserData(ud) => ud,
            _ => LightUserData(std::ptr::null_mut()),
        }
    }
}

impl Push for mlua::Function {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        stack.push_value(Value::Function(self.clone()));
        Ok(())
    }
}

impl Push for Value {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        stack.push_value(self.clone());
        Ok(())
    }
}

impl Pop for Value {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        stack.value(index)
    }
}
