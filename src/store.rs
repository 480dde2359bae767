//! Store gateway - minimal evidence store used by plugins and tests
//!
//! A store is a directory holding `items.jsonl` (one JSON record per line,
//! each carrying a `type` field) and a `files/` tree for exported files.
//! The engine itself never opens a store; only plugins and callers do.

use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

const ITEMS_FILE: &str = "items.jsonl";
const FILES_DIR: &str = "files";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record has no 'type' field")]
    MissingType,
}

/// Handle on an open store. Dropping it is the teardown.
#[derive(Debug)]
pub struct JsonLiteStore {
    root: PathBuf,
}

/// Open a store at `location`, creating it if missing
pub fn open(location: impl AsRef<Path>) -> Result<JsonLiteStore, StoreError> {
    let root = location.as_ref().to_path_buf();
    fs::create_dir_all(root.join(FILES_DIR))?;
    log::debug!("Opened store {}", root.display());
    Ok(JsonLiteStore { root })
}

impl JsonLiteStore {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append a record and return its id (`<type>--<uuid>`).
    ///
    /// Ids are random, so writers need no coordination. Each record is
    /// written with a single `write_all` on an append-mode handle, so
    /// concurrent writers never interleave within a line.
    pub fn insert_struct<T: Serialize>(&self, record: &T) -> Result<String, StoreError> {
        let mut value = serde_json::to_value(record)?;
        let item_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(StoreError::MissingType)?
            .to_string();

        let id = format!("{}--{}", item_type, Uuid::new_v4());
        if let Value::Object(map) = &mut value {
            map.entry("id").or_insert_with(|| Value::String(id.clone()));
        }

        let mut line = serde_json::to_vec(&value)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(ITEMS_FILE))?;
        file.write_all(&line)?;
        Ok(id)
    }

    /// All records of the given type
    pub fn select(&self, item_type: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some(item_type))
            .collect())
    }

    /// Every record in insertion order
    pub fn all(&self) -> Result<Vec<Value>, StoreError> {
        let path = self.root.join(ITEMS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut items = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            items.push(serde_json::from_str(&line)?);
        }
        Ok(items)
    }

    /// Reserve a destination for an exported file. Returns the path relative
    /// to the store root and a writer on it; name clashes get a numeric suffix.
    pub fn store_file(&self, file_path: impl AsRef<Path>) -> Result<(PathBuf, File), StoreError> {
        let name = file_path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let mut relative = Path::new(FILES_DIR).join(&name);
        let mut n = 0;
        while self.root.join(&relative).exists() {
            n += 1;
            relative = Path::new(FILES_DIR).join(format!("{}_{}", n, name));
        }

        let file = File::create(self.root.join(&relative))?;
        Ok((relative, file))
    }
}
