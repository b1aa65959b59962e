use anyhow::Result;
use mlua::{Function, Lua, Table, Value};

/// Globals scripts may read, copied into the whitelisted base environment
const SAFE_GLOBALS: [&str; 11] = [
    "assert", "error", "pcall", "select", "getmetatable", "pairs", "ipairs", "next", "tonumber",
    "tostring", "type",
];

const SAFE_LIBS: [&str; 4] = ["math", "table", "utf8", "string"];

/// Frames listed by `debug.traceback` before the rest are elided
const MAX_TRACEBACK_FRAMES: usize = 16;

/// `message` followed by one line per Lua frame, skipping the traceback call itself
fn stack_traceback(lua: &Lua, message: &str) -> String {
    let mut out = String::from(message);
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str("stack traceback:");
    let mut level = 1;
    while let Some(frame) = lua.inspect_stack(level) {
        if level > MAX_TRACEBACK_FRAMES {
            out.push_str("\n\t...");
            break;
        }
        let source = frame.source();
        let src = source.short_src.as_deref().unwrap_or("?");
        let line = frame.curr_line();
        out.push_str("\n\t");
        out.push_str(src);
        if line > 0 {
            out.push_str(&format!(":{}", line));
        }
        match (frame.names().name, source.what) {
            (Some(name), _) => out.push_str(&format!(": in function '{}'", name)),
            (None, "main") => out.push_str(": in main chunk"),
            (None, "Lua") => {
                let defined = source.line_defined.unwrap_or(0);
                out.push_str(&format!(": in function <{}:{}>", src, defined));
            }
            (None, _) => out.push_str(": in ?"),
        }
        level += 1;
    }
    out
}

pub struct LuaSandbox {
    lua: Lua,
}

impl LuaSandbox {
    pub fn new() -> Result<Self> {
        let lua = Lua::new();
        let sandbox = Self { lua };
        sandbox.setup_safe_environment()?;
        Ok(sandbox)
    }

    fn setup_safe_environment(&self) -> Result<()> {
        let globals = self.lua.globals();

        // Build a whitelisted environment (safe_base)
        let safe = self
            .lua
            .create_table()
            .map_err(|e| anyhow::Error::msg(format!("create_table failed: {}", e)))?;
        for name in SAFE_GLOBALS.iter().chain(SAFE_LIBS.iter()) {
            if let Ok(v) = globals.get::<Value>(*name) {
                safe.set(*name, v)
                    .map_err(|e| anyhow::Error::msg(format!("safe.set {} failed: {}", name, e)))?;
            }
        }
        // Limited debug: only traceback, built from the inspected call stack
        let dbg = self
            .lua
            .create_table()
            .map_err(|e| anyhow::Error::msg(format!("create_table failed: {}", e)))?;
        let traceback = self
            .lua
            .create_function(|lua, message: Value| match message {
                Value::Nil => Ok(Value::String(lua.create_string(stack_traceback(lua, ""))?)),
                Value::String(s) => {
                    let text = stack_traceback(lua, &s.to_string_lossy());
                    Ok(Value::String(lua.create_string(text)?))
                }
                other => Ok(other),
            })
            .map_err(|e| anyhow::Error::msg(format!("create traceback failed: {}", e)))?;
        dbg.set("traceback", traceback)
            .map_err(|e| anyhow::Error::msg(format!("dbg.set traceback failed: {}", e)))?;
        safe.set("debug", dbg)
            .map_err(|e| anyhow::Error::msg(format!("safe.set debug failed: {}", e)))?;

        // Lock package system on globals (affects any accidental access)
        self.lock_package_system(&globals)?;

        self.lua
            .set_named_registry_value("safe_base", safe)
            .map_err(|e| anyhow::Error::msg(format!("set_named_registry_value failed: {}", e)))?;
        Ok(())
    }

    fn lock_package_system(&self, globals: &Table) -> Result<()> {
        let package_table = self
            .lua
            .create_table()
            .map_err(|e| anyhow::Error::msg(format!("Failed to create package table: {}", e)))?;
        package_table
            .set("path", "")
            .map_err(|e| anyhow::Error::msg(format!("Failed to set package.path: {}", e)))?;
        package_table
            .set("cpath", "")
            .map_err(|e| anyhow::Error::msg(format!("Failed to set package.cpath: {}", e)))?;
        globals
            .set("package", package_table)
            .map_err(|e| anyhow::Error::msg(format!("Failed to set package table: {}", e)))?;

        // Replace require with our controlled version
        let controlled_require = self
            .lua
            .create_function(|_lua, module_name: String| -> mlua::Result<()> {
                Err(mlua::Error::RuntimeError(format!(
                    "Module loading disabled in sandbox: {}",
                    module_name
                )))
            })
            .map_err(|e| anyhow::Error::msg(format!("Failed to create require function: {}", e)))?;
        globals
            .set("require", controlled_require)
            .map_err(|e| anyhow::Error::msg(format!("Failed to set require function: {}", e)))?;
        Ok(())
    }

    /// Fresh script environment: reads fall through to safe_base, `engine` injected
    fn create_environment(&self) -> Result<Table> {
        let safe_base: Table = self
            .lua
            .named_registry_value("safe_base")
            .map_err(|e| anyhow::Error::msg(format!("get safe_base failed: {}", e)))?;
        let env = self
            .lua
            .create_table()
            .map_err(|e| anyhow::Error::msg(format!("create_table failed: {}", e)))?;
        let mt = self
            .lua
            .create_table()
            .map_err(|e| anyhow::Error::msg(format!("create_table failed: {}", e)))?;
        mt.set("__index", safe_base)
            .map_err(|e| anyhow::Error::msg(format!("set __index failed: {}", e)))?;
        env.set_metatable(Some(mt));

        if let Ok(engine_tbl) = self.lua.globals().get::<Table>("engine") {
            env.set("engine", engine_tbl)
                .map_err(|e| anyhow::Error::msg(format!("env.set engine failed: {}", e)))?;
        }
        Ok(env)
    }

    fn exec_in(&self, env: &Table, script_content: &str, script_name: &str) -> Result<()> {
        self.lua
            .load(script_content)
            .set_name(script_name)
            .set_environment(env.clone())
            .exec()
            .map_err(|e| {
                anyhow::Error::msg(format!("Failed to load script {}: {}", script_name, e))
            })
    }

    fn current_env(&self) -> Result<Table> {
        self.lua
            .named_registry_value("current_env")
            .map_err(|e| anyhow::anyhow!("get current_env failed: {}", e))
    }

    pub fn load_script(&self, script_content: &str, script_name: &str) -> Result<()> {
        let env = self.create_environment()?;
        self.exec_in(&env, script_content, script_name)?;

        // Remember current env for function lookups
        self.lua
            .set_named_registry_value("current_env", env)
            .map_err(|e| anyhow::Error::msg(format!("set current_env failed: {}", e)))?;
        tracing::info!("Loaded script {}", script_name);
        Ok(())
    }

    pub fn reload_script(&self, script_content: &str, script_name: &str) -> Result<()> {
        let old_env = self.current_env()?;
        let env = self.create_environment()?;
        self.exec_in(&env, script_content, script_name)?;

        // Call new env's on_start() first to (re)initialize state
        if let Ok(on_start) = env.get::<Function>("on_start") {
            if let Err(e) = on_start.call::<()>(()) {
                tracing::error!("on_start failed during reload: {}", e);
            }
        }
        // Then allow state migration via on_reload(old_env)
        if let Ok(on_reload) = env.get::<Function>("on_reload") {
            if let Err(e) = on_reload.call::<()>(old_env) {
                tracing::error!("on_reload failed: {}", e);
            }
        }

        self.lua
            .set_named_registry_value("current_env", env)
            .map_err(|e| anyhow::Error::msg(format!("set current_env failed: {}", e)))?;
        tracing::info!("Reloaded script {}", script_name);
        Ok(())
    }

    pub fn call_function<A, R>(&self, func_name: &str, args: A) -> Result<R>
    where
        A: mlua::IntoLuaMulti,
        R: mlua::FromLuaMulti,
    {
        let env = self.current_env()?;
        let func: Function = env
            .get(func_name)
            .map_err(|e| anyhow::anyhow!("Function '{}' not found: {}", func_name, e))?;

        func.call(args)
            .map_err(|e| anyhow::anyhow!("Error calling function '{}': {}", func_name, e))
    }

    /// Call an optional script callback. Returns false when the script does not define it.
    pub fn call_hook<A>(&self, hook_name: &str, args: A) -> Result<bool>
    where
        A: mlua::IntoLuaMulti,
    {
        let env = self.current_env()?;
        match env.get::<Value>(hook_name) {
            Ok(Value::Function(func)) => {
                func.call::<()>(args)
                    .map_err(|e| anyhow::anyhow!("Error calling hook '{}': {}", hook_name, e))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn get_memory_usage(&self) -> f64 {
        // Get Lua memory usage in MB
        self.lua.used_memory() as f64 / 1024.0 / 1024.0
    }
}
