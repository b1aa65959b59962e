//! OS strings and paths. Unix paths are arbitrary bytes, so they pass through
//! unchanged; other platforms go through UTF-8 and lose what does not fit.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use mlua::Value;

use crate::stack::{string_bytes, Pop, Push, ScriptStack};

#[cfg(unix)]
fn os_bytes(s: &OsStr) -> std::borrow::Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    std::borrow::Cow::Borrowed(s.as_bytes())
}

#[cfg(unix)]
fn os_string(bytes: Vec<u8>) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes)
}

#[cfg(not(unix))]
fn os_bytes(s: &OsStr) -> std::borrow::Cow<'_, [u8]> {
    std::borrow::Cow::Owned(s.to_string_lossy().into_owned().into_bytes())
}

#[cfg(not(unix))]
fn os_string(bytes: Vec<u8>) -> OsString {
    OsString::from(String::from_utf8_lossy(&bytes).into_owned())
}

impl Push for OsStr {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        let s = stack.lua().create_string(os_bytes(self))?;
        stack.push_value(Value::String(s));
        Ok(())
    }
}

impl Push for OsString {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        self.as_os_str().push(stack)
    }
}

impl Pop for OsString {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        os_string(string_bytes(stack, index).unwrap_or_default())
    }
}

impl Push for Path {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        self.as_os_str().push(stack)
    }
}

impl Push for PathBuf {
    fn push(&self, stack: &mut ScriptStack<'_>) -> mlua::Result<()> {
        self.as_os_str().push(stack)
    }
}

impl Pop for PathBuf {
    fn pop(stack: &mut ScriptStack<'_>, index: i32) -> Self {
        PathBuf::from(OsString::pop(stack, index))
    }
}
