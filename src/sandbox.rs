//! Isolated execution of plugin source
//!
//! Every plugin runs as its own Lua chunk with exactly four positional
//! parameters bound from the execution context: plugin id, plugin name,
//! current URL and the execution timestamp. No other host capability is
//! injected. Ambient Lua globals stay reachable across executions; that is
//! an accepted bounded-trust tradeoff, not a security boundary.

use mlua::{Lua, Table, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::exports;
use crate::plugin::ExecutionContext;

/// Lua environment hardening applied once at startup
const SANDBOX_PRELUDE: &str = r#"
-- Disable dangerous functions
os.execute = nil
os.exit = nil
io.popen = nil
loadfile = nil
dofile = nil
"#;

/// Export map recovered from a module plugin
pub type ExportMap<'lua> = HashMap<String, Value<'lua>>;

/// Executes plugin source inside a restricted Lua state
pub struct Sandbox {
    lua: Lua,
}

impl Sandbox {
    /// Create a sandbox with the hardened environment
    pub fn new() -> Result<Self, PluginError> {
        let lua = Lua::new();
        lua.load(SANDBOX_PRELUDE)
            .exec()
            .map_err(|e| PluginError::ExecutionFailed(format!("sandbox setup failed: {e}")))?;
        Ok(Self { lua })
    }

    /// Run plugin source for its side effects
    ///
    /// The code becomes the body of a fresh chunk, so its locals cannot leak
    /// into later executions; only explicit globals persist.
    pub fn execute(&self, code: &str, context: &ExecutionContext) -> Result<(), PluginError> {
        let wrapped = format!("local plugin_id, plugin_name, url, timestamp = ...\n{code}");
        self.lua
            .load(wrapped)
            .call::<_, ()>((
                context.plugin_id.as_str(),
                context.plugin_name.as_str(),
                context.url.as_str(),
                context.timestamp,
            ))
            .map_err(|e| {
                warn!("plugin {} execution failed: {e}", context.plugin_id);
                PluginError::ExecutionFailed(e.to_string())
            })?;

        debug!("plugin {} executed", context.plugin_id);
        Ok(())
    }

    /// Recover the export map of a module plugin without running it as a
    /// real module
    ///
    /// Content without an `export` keyword yields an empty map and is never
    /// executed. Otherwise the rewritten source runs with `__exports`
    /// pre-seeded as an empty table; a non-table result also yields an empty
    /// map.
    pub fn extract_exports<'lua>(
        &'lua self,
        code: &str,
        context: &ExecutionContext,
    ) -> Result<ExportMap<'lua>, PluginError> {
        if !exports::has_exports(code) {
            return Ok(HashMap::new());
        }

        let rewritten = exports::rewrite(code);
        let wrapped = format!(
            "local __exports, plugin_id, plugin_name, url, timestamp = ...\n{rewritten}\nreturn __exports"
        );

        let capture: Table<'lua> = self
            .lua
            .create_table()
            .map_err(|e| PluginError::ExecutionFailed(e.to_string()))?;

        let result: Value<'lua> = self
            .lua
            .load(wrapped)
            .call((
                capture,
                context.plugin_id.as_str(),
                context.plugin_name.as_str(),
                context.url.as_str(),
                context.timestamp,
            ))
            .map_err(|e| {
                warn!("plugin {} export extraction failed: {e}", context.plugin_id);
                PluginError::ExecutionFailed(e.to_string())
            })?;

        let Value::Table(table) = result else {
            return Ok(HashMap::new());
        };

        let mut map = HashMap::new();
        for pair in table.pairs::<String, Value>() {
            let (key, value) = pair.map_err(|e| PluginError::ExecutionFailed(e.to_string()))?;
            map.insert(key, value);
        }
        Ok(map)
    }
}
