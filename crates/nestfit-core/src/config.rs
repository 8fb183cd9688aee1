//! The `Configurator`: builds and persists nested_fit input files.
//!
//! A `Configurator` is created from `FitSettings` (whose defaults match the
//! nested_fit Python front end) and owns the resulting `FitConfiguration`
//! for as long as the caller keeps it. Data extents start out automatic:
//! they follow the `x` range of the data files until the caller pins them
//! with [`Configurator::set_extents`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::{NestfitError, Result};
use crate::extents::{compute_extents, read_xy, Delimiter};
use crate::models::{
    major_minor, slot_key, ClusteringSettings, ConvergenceSettings, DataExtents,
    FitConfiguration, FunctionSettings, SearchSettings, INPUT_FILE_NAME,
};

/// Everything needed to build a configuration.
#[derive(Debug, Clone)]
pub struct FitSettings {
    pub datafiles: Vec<PathBuf>,
    /// Column layout of the data files.
    pub specstr: String,
    pub likelihood: String,
    /// One expression per model; more than one switches to keyed slots.
    pub expressions: Vec<String>,
    /// Named parameter defaults.
    pub params: BTreeMap<String, serde_yaml::Value>,

    pub livepoints: u32,
    pub search_method: String,
    pub search_params: (f64, f64),
    pub search_maxtries: u32,
    pub search_multries: u32,
    pub search_maxsteps: u64,

    pub conv_method: String,
    pub conv_accuracy: f64,
    pub conv_parameter: f64,

    pub cluster_enable: bool,
    pub cluster_method: String,
    pub cluster_distance: f64,
    pub cluster_bandwidth: f64,

    /// Keep `nf_input.yaml` after a run.
    pub keep_yaml: bool,
    /// Version of the nested_fit executable to target.
    pub tool_version: String,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            datafiles: Vec::new(),
            specstr: "x,c".to_string(),
            likelihood: "GAUSSIAN".to_string(),
            expressions: Vec::new(),
            params: BTreeMap::new(),
            livepoints: 200,
            search_method: "SLICE_SAMPLING".to_string(),
            search_params: (0.5, 3.0),
            search_maxtries: 1000,
            search_multries: 100,
            search_maxsteps: 100_000,
            conv_method: "LIKE_ACC".to_string(),
            conv_accuracy: 1.0e-5,
            conv_parameter: 0.01,
            cluster_enable: false,
            cluster_method: "f".to_string(),
            cluster_distance: 0.5,
            cluster_bandwidth: 0.2,
            keep_yaml: true,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl FitSettings {
    pub fn new<I, P>(datafiles: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            datafiles: datafiles.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expressions.push(expression.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Builds, edits and writes the nested_fit input file.
#[derive(Debug, Clone)]
pub struct Configurator {
    config: FitConfiguration,
    multiexp: bool,
    manual_extents: bool,
    keep_yaml: bool,
    tool_version: String,
}

impl Configurator {
    /// Build a configuration, computing data extents from the data files.
    ///
    /// Fails without a data file, or when the single data file is neither
    /// `.csv` nor `.tsv`.
    pub fn new(settings: FitSettings) -> Result<Self> {
        let FitSettings {
            datafiles,
            specstr,
            likelihood,
            expressions,
            params,
            livepoints,
            search_method,
            search_params,
            search_maxtries,
            search_multries,
            search_maxsteps,
            conv_method,
            conv_accuracy,
            conv_parameter,
            cluster_enable,
            cluster_method,
            cluster_distance,
            cluster_bandwidth,
            keep_yaml,
            tool_version,
        } = settings;

        if datafiles.is_empty() {
            error!("Configurator needs at least one datafile.");
            return Err(NestfitError::NoDataFiles);
        }

        let multiexp = expressions.len() > 1;

        let mut function = FunctionSettings {
            expressions: BTreeMap::new(),
            params,
        };
        for (i, expr) in expressions.iter().enumerate() {
            let slot = if multiexp { i + 1 } else { 0 };
            function.expressions.insert(slot_key("expression", slot), expr.clone());
        }

        let mut data = BTreeMap::new();
        if multiexp {
            for slot in 1..=expressions.len() {
                data.insert(slot_key("data", slot), DataExtents::default());
            }
        } else {
            data.insert(slot_key("data", 0), DataExtents::default());
            if let Err(e) = Delimiter::from_path(&datafiles[0]) {
                error!("Input file invalid format/extension.");
                error!("Valid formats: `.csv` and `.tsv`.");
                return Err(e);
            }
        }

        let config = FitConfiguration {
            version: major_minor(&tool_version),
            datafiles,
            search: SearchSettings {
                livepoints,
                method: search_method,
                param1: search_params.0,
                param2: search_params.1,
                max_tries: search_maxtries,
                tries_mult: search_multries,
                num_tries: 1,
                max_steps: search_maxsteps,
            },
            convergence: ConvergenceSettings {
                method: conv_method,
                accuracy: conv_accuracy,
                parameter: conv_parameter,
            },
            clustering: ClusteringSettings {
                enabled: cluster_enable,
                method: cluster_method,
                distance: cluster_distance,
                bandwidth: cluster_bandwidth,
            },
            specstr,
            likelihood,
            function,
            data,
        };

        let mut configurator = Self {
            config,
            multiexp,
            manual_extents: false,
            keep_yaml,
            tool_version,
        };
        configurator.reconfigure_extents()?;
        Ok(configurator)
    }

    /// Load an existing `nf_input.yaml`.
    ///
    /// Extents found in the file are treated as manual unless they are all zero.
    pub fn from_input_file(path: &Path) -> Result<Self> {
        let config = FitConfiguration::load(path)?;
        let multiexp = config.data.keys().any(|k| k != "data");
        let manual_extents = config.data.values().any(|d| !d.is_unset());

        let mut configurator = Self {
            config,
            multiexp,
            manual_extents,
            keep_yaml: true,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        configurator.reconfigure_extents()?;
        Ok(configurator)
    }

    pub fn config(&self) -> &FitConfiguration {
        &self.config
    }

    pub fn is_multi_expression(&self) -> bool {
        self.multiexp
    }

    pub fn has_manual_extents(&self) -> bool {
        self.manual_extents
    }

    pub fn keep_yaml(&self) -> bool {
        self.keep_yaml
    }

    pub fn set_keep_yaml(&mut self, keep: bool) {
        self.keep_yaml = keep;
    }

    pub fn tool_version(&self) -> &str {
        &self.tool_version
    }

    pub fn set_tool_version(&mut self, version: impl Into<String>) {
        self.tool_version = version.into();
        self.config.version = major_minor(&self.tool_version);
    }

    pub fn extents(&self, slot: usize) -> Option<DataExtents> {
        self.config.extents(slot).copied()
    }

    /// Replace the expression of a slot (0 = the single unkeyed expression).
    pub fn set_expression(&mut self, expression: impl Into<String>, slot: usize) {
        self.config
            .function
            .expressions
            .insert(slot_key("expression", slot), expression.into());
    }

    /// Pin the x extents of a slot.
    ///
    /// `(0, 0)` means "unset": extents go back to automatic for every slot and
    /// are recomputed from the data files. A zero-width manual window at 0
    /// therefore cannot be requested.
    pub fn set_extents(&mut self, xmin: f64, xmax: f64, slot: usize) -> Result<()> {
        if xmin == 0.0 && xmax == 0.0 {
            self.manual_extents = false;
            return self.reconfigure_extents();
        }

        let extents = self
            .config
            .extents_mut(slot)
            .ok_or(NestfitError::UnknownSlot(slot))?;
        extents.xmin = xmin;
        extents.xmax = xmax;
        self.manual_extents = true;
        Ok(())
    }

    /// Replace the whole parameter-defaults mapping.
    pub fn set_params(&mut self, params: BTreeMap<String, serde_yaml::Value>) {
        self.config.function.params = params;
    }

    /// Replace the data files, recomputing automatic extents.
    pub fn set_datafiles<I, P>(&mut self, datafiles: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let datafiles: Vec<PathBuf> = datafiles.into_iter().map(Into::into).collect();
        if datafiles.is_empty() {
            error!("Configurator needs at least one datafile.");
            return Err(NestfitError::NoDataFiles);
        }
        if !self.multiexp {
            Delimiter::from_path(&datafiles[0])?;
        }
        self.config.datafiles = datafiles;
        self.reconfigure_extents()
    }

    /// The `x` and `c` columns of the data file.
    pub fn data(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        if self.multiexp {
            error!("data() does not support multiple datafiles.");
            return Err(NestfitError::MultiFileUnsupported("data()"));
        }
        let file = self
            .config
            .datafiles
            .first()
            .ok_or(NestfitError::NoDataFiles)?;
        read_xy(file, &self.config.specstr)
    }

    /// Write `nf_input.yaml` into `dir`, creating the directory if needed.
    pub fn write_input_file(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(INPUT_FILE_NAME);
        self.config.save(&path)?;
        info!(path = %path.display(), "Wrote nested_fit input file");
        Ok(path)
    }

    fn reconfigure_extents(&mut self) -> Result<()> {
        if self.manual_extents || self.config.datafiles.is_empty() {
            return Ok(());
        }

        if !self.multiexp {
            let (xmin, xmax) = self.slot_extents(&self.config.datafiles[0])?;
            self.store_extents(0, xmin, xmax);
            return Ok(());
        }

        for slot in 1..=self.config.data.len() {
            let Some(file) = self.config.datafiles.get(slot - 1).cloned() else {
                warn!(slot, "No datafile for model slot; keeping its extents");
                continue;
            };
            let (xmin, xmax) = self.slot_extents(&file)?;
            self.store_extents(slot, xmin, xmax);
        }
        Ok(())
    }

    fn slot_extents(&self, file: &Path) -> Result<(f64, f64)> {
        compute_extents(file, &self.config.specstr).inspect_err(|e| {
            error!(file = %file.display(), "Could not compute data extents: {}", e);
        })
    }

    fn store_extents(&mut self, slot: usize, xmin: f64, xmax: f64) {
        let key = slot_key("data", slot);
        let extents = self.config.data.entry(key).or_default();
        extents.xmin = xmin;
        extents.xmax = xmax;
    }
}
