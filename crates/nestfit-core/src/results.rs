//! Loading of the nested_fit result file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::Result;
use crate::models::RESULT_FILE_NAME;

/// Contents of `nf_output_res.json`, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FitResult(serde_json::Value);

impl FitResult {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Top-level entry by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Scalar leaves as `(dotted.path, value)` pairs, sorted by key.
    ///
    /// Arrays are indexed (`params.0`), so every scalar in the document shows
    /// up exactly once.
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        flatten_into(&self.0, String::new(), &mut out);
        out
    }
}

fn flatten_into(value: &serde_json::Value, prefix: String, out: &mut Vec<(String, String)>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };

    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                flatten_into(v, join(k), out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(v, join(&i.to_string()), out);
            }
        }
        serde_json::Value::String(s) => out.push((prefix, s.clone())),
        other => out.push((prefix, other.to_string())),
    }
}

/// Read the result file from a run directory.
pub fn read_result(run_dir: &Path) -> Result<FitResult> {
    let content = fs::read_to_string(run_dir.join(RESULT_FILE_NAME))?;
    Ok(serde_json::from_str(&content)?)
}

/// Like [`read_result`], but a missing or corrupt file is logged and yields `None`.
pub fn load_result(run_dir: &Path) -> Option<FitResult> {
    match read_result(run_dir) {
        Ok(result) => Some(result),
        Err(e) => {
            error!("Could not load nested_fit's output result.");
            error!(
                path = %run_dir.join(RESULT_FILE_NAME).display(),
                "I/O exception {}",
                e
            );
            None
        }
    }
}
