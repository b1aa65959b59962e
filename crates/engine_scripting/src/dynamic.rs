//! Runtime-tagged values. `serde_json::Value` stands in for "any Lua value
//! the host can represent".

use serde_json::{Map, Number, Value as Json};

use mlua::Value;

use crate::stack::{Pop, Push, ScriptStack};

/// Tables nested deeper than this pop as `Null`
const MAX_DEPTH: usize = 64;

impl Push for Json {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        match self {
            Json::Null => stack.push_nil(),
            Json::Bool(b) => stack.push_value(Value::Boolean(*b)),
            Json::Number(n) => {
                let value = if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Number(u as f64)
                } else {
                    Value::Number(n.as_f64().unwrap_or(0.0))
                };
                stack.push_value(value);
            }
            Json::String(s) => stack.push(s.as_str())?,
            Json::Array(items) => stack.push(items)?,
            Json::Object(fields) => {
                let table = stack.lua().create_table_with_capacity(0, fields.len())?;
                for (key, value) in fields {
                    value.push(stack)?;
                    table.raw_set(key.as_str(), stack.take_top())?;
                }
                stack.push_value(Value::Table(table));
            }
        }
        Ok(())
    }
}

impl Pop for Json {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        from_lua(stack.value(index), 0)
    }
}

fn from_lua(value: Value, depth: usize) -> Json {
    match value {
        Value::Boolean(b) => Json::Bool(b),
        Value::Integer(i) => Json::Number(i.into()),
        Value::Number(n) => Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null),
        Value::String(s) => Json::String(String::from_utf8_lossy(&s.as_bytes()).into_owned()),
        Value::Table(table) => {
            if depth >= MAX_DEPTH {
                tracing::warn!("Table nested deeper than {} levels, dropped", MAX_DEPTH);
                return Json::Null;
            }
            let len = table.raw_len();
            if len > 0 {
                let items = (1..=len)
                    .map(|i| {
                        let item = table.raw_get::<Value>(i).unwrap_or(Value::Nil);
                        from_lua(item, depth + 1)
                    })
                    .collect();
                return Json::Array(items);
            }
            let mut fields = Map::new();
            for pair in table.pairs::<Value, Value>() {
                let Ok((Value::String(key), item)) = pair else {
                    continue;
                };
                fields.insert(
                    String::from_utf8_lossy(&key.as_bytes()).into_owned(),
                    from_lua(item, depth + 1),
                );
            }
            Json::Object(fields)
        }
        _ => Json::Null,
    }
}
