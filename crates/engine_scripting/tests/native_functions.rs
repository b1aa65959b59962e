use engine_scripting::native::{create_native_function, register_function, register_value, NativeFn};
use engine_scripting::stack::ScriptStack;
use mlua::{Lua, Table};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

fn sum(stack: &mut ScriptStack<'_>) -> mlua::Result<usize> {
    let values: Vec<f64> = stack.pop(1);
    stack.push(&values.iter().sum::<f64>())?;
    stack.push(&values.len())?;
    Ok(2)
}

#[test]
fn native_fn_pointer_is_callable_from_lua() {
    let lua = Lua::new();
    let mut stack = ScriptStack::new(&lua);
    stack.push(&NativeFn(sum)).unwrap();
    lua.globals().set("sum", stack.take_top()).unwrap();

    let (total, count): (f64, i64) = lua.load("return sum({1, 2, 3.5})").eval().unwrap();
    assert_eq!(total, 6.5);
    assert_eq!(count, 3);
}

#[test]
fn arguments_start_at_index_one() {
    let lua = Lua::new();
    let f = create_native_function(&lua, |stack| {
        let a: String = stack.pop(1);
        let b: i32 = stack.pop(2);
        let missing: Option<bool> = stack.pop(3);
        stack.push(&format!("{}:{}:{}", a, b, missing.is_none()))?;
        Ok(1)
    })
    .unwrap();
    let out: String = f.call(("x", 4)).unwrap();
    assert_eq!(out, "x:4:true");
}

#[test]
fn result_count_selects_top_slots() {
    let lua = Lua::new();
    let f = create_native_function(&lua, |stack| {
        // arguments stay below the results and are not returned
        stack.push(&"first")?;
        stack.push(&"second")?;
        Ok(1)
    })
    .unwrap();
    let out: (String, Option<String>) = f.call(("arg",)).unwrap();
    assert_eq!(out, ("second".to_string(), None));

    let none = create_native_function(&lua, |_| Ok(0)).unwrap();
    let count: i64 = lua
        .load("local f = ... return select('#', f())")
        .call(none)
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn errors_propagate_to_lua() {
    let lua = Lua::new();
    let f = create_native_function(&lua, |_| {
        Err(mlua::Error::RuntimeError("boom".to_string()))
    })
    .unwrap();
    lua.globals().set("fail", f).unwrap();
    let (ok, msg): (bool, String) = lua
        .load("local ok, err = pcall(fail) return ok, tostring(err)")
        .eval()
        .unwrap();
    assert!(!ok);
    assert!(msg.contains("boom"));
}

#[test]
fn closures_keep_state() {
    let lua = Lua::new();
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let table: Table = lua.create_table().unwrap();
    register_function(&lua, &table, "tick", move |stack| {
        counter.set(counter.get() + 1);
        stack.push(&counter.get())?;
        Ok(1)
    })
    .unwrap();
    lua.globals().set("lib", table).unwrap();

    let last: i64 = lua.load("lib.tick() lib.tick() return lib.tick()").eval().unwrap();
    assert_eq!(last, 3);
    assert_eq!(calls.get(), 3);
}

#[test]
fn register_value_marshals_through_push() {
    let lua = Lua::new();
    let table: Table = lua.create_table().unwrap();
    register_value(&lua, &table, "version", &2u32).unwrap();
    register_value(&lua, &table, "name", "engine").unwrap();
    register_value(&lua, &table, "limits", &HashMap::from([("max".to_string(), 8)])).unwrap();

    assert_eq!(table.get::<u32>("version").unwrap(), 2);
    assert_eq!(table.get::<String>("name").unwrap(), "engine");
    let limits: Table = table.get("limits").unwrap();
    assert_eq!(limits.get::<i64>("max").unwrap(), 8);
}
