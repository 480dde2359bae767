//! Built-in plugins
//!
//! Registered in-process under their command name, so they win over any
//! executable of the same name in the plugin directory.

use crate::backend::PluginRegistry;
use crate::store;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Registry holding every built-in plugin
pub fn builtin() -> PluginRegistry {
    PluginRegistry::new().with("example", example)
}

/// Count the items in the store per type and log the totals
pub fn example(location: &str) -> Result<()> {
    let store = store::open(location).with_context(|| format!("opening store {}", location))?;
    let counts = count_by_type(&store.all()?);

    if counts.is_empty() {
        log::info!("example: store {} is empty", location);
    }
    for (item_type, count) in &counts {
        log::info!("example: {} {} items", count, item_type);
    }
    Ok(())
}

fn count_by_type(items: &[Value]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        let item_type = item
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        *counts.entry(item_type.to_string()).or_insert(0) += 1;
    }
    counts
}
