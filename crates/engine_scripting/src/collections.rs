//! Sequences, string-keyed maps and sets as Lua tables

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use mlua::Value;

use crate::stack::{Pop, Push, ScriptStack};

/// Push every element and move it into a fresh array table at `i + 1`
fn push_sequence<'a, T, I>(stack: &mut ScriptStack<'_>, len: usize, items: I) -> mlua::Result<()>
where
    T: Push + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let table = stack.lua().create_table_with_capacity(len, 0)?;
    for (i, item) in items.into_iter().enumerate() {
        item.push(stack)?;
        table.raw_set(i + 1, stack.take_top())?;
    }
    stack.push_value(Value::Table(table));
    Ok(())
}

/// Read indices `1..=raw_len` of the table at `index`
fn pop_sequence<T: Pop>(stack: &mut ScriptStack<'_>, index: i32) -> Vec<T> {
    let Value::Table(table) = stack.value(index) else {
        return Vec::new();
    };
    let len = table.raw_len();
    let mut items = Vec::with_capacity(len);
    for i in 1..=len {
        let value = table.raw_get::<Value>(i).unwrap_or(Value::Nil);
        stack.push_value(value);
        Vec::push(&mut items, T::pop(stack, -1));
        stack.remove(-1);
    }
    items
}

impl<T: Push> Push for [T] {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        push_sequence(stack, self.len(), self.iter())
    }
}

impl<T: Push> Push for Vec<T> {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        self.as_slice().push(stack)
    }
}

impl<T: Pop> Pop for Vec<T> {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        pop_sequence(stack, index)
    }
}

impl<T: Push> Push for HashMap<String, T> {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        let table = stack.lua().create_table_with_capacity(0, self.len())?;
        for (key, value) in self {
            value.push(stack)?;
            table.raw_set(key.as_str(), stack.take_top())?;
        }
        stack.push_value(Value::Table(table));
        Ok(())
    }
}

impl<T: Pop> Pop for HashMap<String, T> {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        let Value::Table(table) = stack.value(index) else {
            return HashMap::new();
        };
        let mut map = HashMap::new();
        for pair in table.pairs::<Value, Value>() {
            let Ok((Value::String(key), value)) = pair else {
                continue;
            };
            stack.push_value(value);
            let value = T::pop(stack, -1);
            stack.remove(-1);
            map.insert(String::from_utf8_lossy(&key.as_bytes()).into_owned(), value);
        }
        map
    }
}

impl<T: Push> Push for HashSet<T> {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        push_sequence(stack, self.len(), self.iter())
    }
}

impl<T: Pop + Eq + Hash> Pop for HashSet<T> {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        pop_sequence(stack, index).into_iter().collect()
    }
}
