//! Data models for nestfit-rs.
//!
//! `FitConfiguration` mirrors the layout of `nf_input.yaml`, the input file
//! read by the nested_fit executable. Per-slot keys (`expression_2`,
//! `data_2`, ...) are kept in flattened maps so the document round-trips.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of the input file written into the run directory.
pub const INPUT_FILE_NAME: &str = "nf_input.yaml";

/// Name of the result file nested_fit leaves in the run directory.
pub const RESULT_FILE_NAME: &str = "nf_output_res.json";

/// Key of the extents/expression entry for a model slot.
///
/// Slot 0 is the single unkeyed slot (`data`); slots from 1 up are keyed
/// (`data_1`, `data_2`, ...).
pub fn slot_key(prefix: &str, slot: usize) -> String {
    if slot == 0 {
        prefix.to_string()
    } else {
        format!("{prefix}_{slot}")
    }
}

/// Whether `key` is the slot key of some slot, e.g. `data` or `data_2`.
pub fn is_slot_key(prefix: &str, key: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('_')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

/// `major.minor` of a version string as a number, e.g. `"5.3.1"` -> `5.3`.
pub fn major_minor(version: &str) -> f64 {
    let parts: Vec<&str> = version.split('.').take(2).collect();
    parts.join(".").parse().unwrap_or(0.0)
}

/// The full input document for one nested_fit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfiguration {
    /// Tool version, major.minor only.
    pub version: f64,
    /// Data files; written as a single comma-separated string.
    #[serde(with = "datafile_list")]
    pub datafiles: Vec<PathBuf>,
    pub search: SearchSettings,
    pub convergence: ConvergenceSettings,
    pub clustering: ClusteringSettings,
    /// Column layout of the data files, e.g. `x,c` or `x,c,ce`.
    pub specstr: String,
    pub likelihood: String,
    pub function: FunctionSettings,
    /// `data` or `data_1`, `data_2`, ... blocks. Other top-level keys are
    /// skipped when reading.
    #[serde(flatten, with = "data_slots")]
    pub data: BTreeMap<String, DataExtents>,
}

impl FitConfiguration {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Write the document to `path`, returning nothing on success.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn extents(&self, slot: usize) -> Option<&DataExtents> {
        self.data.get(&slot_key("data", slot))
    }

    pub fn extents_mut(&mut self, slot: usize) -> Option<&mut DataExtents> {
        self.data.get_mut(&slot_key("data", slot))
    }

    pub fn expression(&self, slot: usize) -> Option<&str> {
        self.function
            .expressions
            .get(&slot_key("expression", slot))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    pub livepoints: u32,
    pub method: String,
    pub param1: f64,
    pub param2: f64,
    pub max_tries: u32,
    pub tries_mult: u32,
    pub num_tries: u32,
    pub max_steps: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceSettings {
    pub method: String,
    pub accuracy: f64,
    pub parameter: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringSettings {
    pub enabled: bool,
    pub method: String,
    pub distance: f64,
    pub bandwidth: f64,
}

/// Model expression(s) and named parameter defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionSettings {
    /// `expression` or `expression_1`, `expression_2`, ...
    #[serde(flatten, with = "expression_slots")]
    pub expressions: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

/// Fit window for one model slot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DataExtents {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl DataExtents {
    pub fn is_unset(&self) -> bool {
        self.xmin == 0.0 && self.xmax == 0.0
    }
}

/// Capabilities nested_fit was built with, shown in the dashboard header.
///
/// The YAML form uses the keys and `ON`/`OFF` values of the tool's build
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(rename = "OpenMP", with = "on_off")]
    pub openmp: bool,
    #[serde(rename = "OpenMPI", with = "on_off")]
    pub openmpi: bool,
    #[serde(rename = "LTRACE", with = "on_off")]
    pub tracing: bool,
    #[serde(rename = "BUILDTYPE")]
    pub build_type: String,
    #[serde(rename = "PPROF", with = "on_off")]
    pub profiling: bool,
}

impl Features {
    /// Flags baked in at compile time (see `build.rs`).
    pub fn from_build() -> Self {
        Self {
            openmp: on_off::is_on(env!("NF_FEATURE_OPENMP")),
            openmpi: on_off::is_on(env!("NF_FEATURE_OPENMPI")),
            tracing: on_off::is_on(env!("NF_FEATURE_LTRACE")),
            build_type: env!("NF_FEATURE_BUILDTYPE").to_string(),
            profiling: on_off::is_on(env!("NF_FEATURE_PPROF")),
        }
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn is_debug_build(&self) -> bool {
        self.build_type.eq_ignore_ascii_case("debug")
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::from_build()
    }
}

mod datafile_list {
    use std::path::PathBuf;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(files: &[PathBuf], serializer: S) -> Result<S::Ok, S::Error> {
        let joined = files
            .iter()
            .map(|f| f.to_string_lossy())
            .collect::<Vec<_>>()
            .join(", ");
        serializer.serialize_str(&joined)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PathBuf>, D::Error> {
        let joined = String::deserialize(deserializer)?;
        Ok(joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}

/// Collects the entries of a flattened map whose keys are slot keys of
/// `prefix`, parsing each value as `T`.
mod slot_map {
    use std::collections::BTreeMap;

    use serde::de::{DeserializeOwned, Error};
    use serde::{Deserialize, Deserializer};

    use super::is_slot_key;

    pub fn deserialize<'de, D, T>(prefix: &str, deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let entries = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
        entries
            .into_iter()
            .filter(|(key, _)| is_slot_key(prefix, key))
            .map(|(key, value)| -> Result<(String, T), D::Error> {
                let parsed = serde_yaml::from_value(value)
                    .map_err(|e| D::Error::custom(format!("{key}: {e}")))?;
                Ok((key, parsed))
            })
            .collect()
    }
}

mod data_slots {
    use std::collections::BTreeMap;

    use serde::{Deserializer, Serialize, Serializer};

    use super::DataExtents;

    pub fn serialize<S: Serializer>(
        data: &BTreeMap<String, DataExtents>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        data.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, DataExtents>, D::Error> {
        super::slot_map::deserialize("data", deserializer)
    }
}

mod expression_slots {
    use std::collections::BTreeMap;

    use serde::{Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        expressions: &BTreeMap<String, String>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        expressions.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, String>, D::Error> {
        super::slot_map::deserialize("expression", deserializer)
    }
}

mod on_off {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn is_on(value: &str) -> bool {
        matches!(value.trim().to_ascii_uppercase().as_str(), "ON" | "YES" | "TRUE" | "1")
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "ON" } else { "OFF" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(is_on(&value))
    }
}
