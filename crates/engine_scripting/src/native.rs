//! Native functions callable from Lua.
//!
//! A native function sees its arguments on a fresh [`ScriptStack`] (first
//! argument at index 1), pushes its results and returns how many of the top
//! slots Lua should receive.

use mlua::{Function, Lua, MultiValue, Table, Value};

use crate::stack::{Push, ScriptStack};

/// Plain function pointer in the native calling convention
#[derive(Clone, Copy)]
pub struct NativeFn(pub fn(&mut ScriptStack<'_>) -> mlua::Result<usize>);

impl Push for NativeFn {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        let f = self.0;
        let function = create_native_function(stack.lua(), move |stack| f(stack))?;
        stack.push_value(Value::Function(function));
        Ok(())
    }
}

pub fn create_native_function<F>(lua: &Lua, f: F) -> mlua::Result<Function>
where
    F: Fn(&mut ScriptStack<'_>) -> mlua::Result<usize> + 'static,
{
    lua.create_function(move |lua, args: MultiValue| {
        let mut stack = ScriptStack::with_args(lua, args);
        let count = f(&mut stack)?;
        Ok(stack.into_results(count))
    })
}

/// `table[name] = f`
pub fn register_function<F>(lua: &Lua, table: &Table, name: &str, f: F) -> mlua::Result<()>
where
    F: Fn(&mut ScriptStack<'_>) -> mlua::Result<usize> + 'static,
{
    table.raw_set(name, create_native_function(lua, f)?)
}

/// `table[name] = value`, marshalled through [`Push`]
pub fn register_value<T: Push + ?Sized>(
    lua: &Lua,
    table: &Table,
    name: &str,
    value: &T,
) -> mlua::Result<()> {
    let mut stack = ScriptStack::new(lua);
    value.push(&mut stack)?;
    table.raw_set(name, stack.take_top())
}
