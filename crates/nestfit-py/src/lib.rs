//! PyO3 Python extension module for nestfit.
//!
//! Exposes a `Configurator` class with the keyword arguments of the Python
//! nested_fit front end. `sample()` releases the GIL while nested_fit runs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use pyo3::IntoPyObjectExt;
use tracing_subscriber::EnvFilter;

use nestfit::{Configurator, FitSettings, NestfitError, SampleOptions};

/// Python-facing Configurator class.
#[pyclass(name = "Configurator")]
struct PyConfigurator {
    inner: Configurator,
}

#[pymethods]
impl PyConfigurator {
    /// Build a nested_fit configuration.
    ///
    /// Args:
    ///     datafiles: Data files (.csv or .tsv). At least one is required.
    ///     specstr: Column layout of the data files. Default: "x,c"
    ///     likelihood: Likelihood function. Default: "GAUSSIAN"
    ///     expressions: Model expressions, one per data file.
    ///     params: Dict of parameter name → default.
    ///     keep_yaml: Keep nf_input.yaml after sampling. Default: True
    ///     tool_version: nested_fit version to run. Default: this package's version
    #[new]
    #[pyo3(signature = (
        datafiles=Vec::new(),
        specstr="x,c",
        likelihood="GAUSSIAN",
        expressions=Vec::new(),
        params=None,
        livepoints=200,
        search_method="SLICE_SAMPLING",
        search_params=(0.5, 3.0),
        search_maxtries=1000,
        search_multries=100,
        search_maxsteps=100000,
        conv_method="LIKE_ACC",
        conv_accuracy=1e-5,
        conv_parameter=0.01,
        cluster_enable=false,
        cluster_method="f",
        cluster_distance=0.5,
        cluster_bandwidth=0.2,
        keep_yaml=true,
        tool_version=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        datafiles: Vec<PathBuf>,
        specstr: &str,
        likelihood: &str,
        expressions: Vec<String>,
        params: Option<&Bound<'_, PyDict>>,
        livepoints: u32,
        search_method: &str,
        search_params: (f64, f64),
        search_maxtries: u32,
        search_multries: u32,
        search_maxsteps: u64,
        conv_method: &str,
        conv_accuracy: f64,
        conv_parameter: f64,
        cluster_enable: bool,
        cluster_method: &str,
        cluster_distance: f64,
        cluster_bandwidth: f64,
        keep_yaml: bool,
        tool_version: Option<String>,
    ) -> PyResult<Self> {
        let params = match params {
            Some(dict) => py_dict_to_yaml(dict)?,
            None => BTreeMap::new(),
        };
        let defaults = FitSettings::default();
        let settings = FitSettings {
            datafiles,
            specstr: specstr.to_string(),
            likelihood: likelihood.to_string(),
            expressions,
            params,
            livepoints,
            search_method: search_method.to_string(),
            search_params,
            search_maxtries,
            search_multries,
            search_maxsteps,
            conv_method: conv_method.to_string(),
            conv_accuracy,
            conv_parameter,
            cluster_enable,
            cluster_method: cluster_method.to_string(),
            cluster_distance,
            cluster_bandwidth,
            keep_yaml,
            tool_version: tool_version.unwrap_or(defaults.tool_version),
        };

        let inner = Configurator::new(settings).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Replace the expression of a slot (0 for a single expression).
    #[pyo3(signature = (expr, slot=0))]
    fn set_expression(&mut self, expr: &str, slot: usize) {
        self.inner.set_expression(expr, slot);
    }

    /// Pin the x extents of a slot. `(0, 0)` goes back to automatic extents.
    #[pyo3(signature = (xmin, xmax, slot=0))]
    fn set_extents(&mut self, xmin: f64, xmax: f64, slot: usize) -> PyResult<()> {
        self.inner.set_extents(xmin, xmax, slot).map_err(to_py_err)
    }

    /// Replace all parameter defaults with the given keyword arguments.
    #[pyo3(signature = (**params))]
    fn set_params(&mut self, params: Option<&Bound<'_, PyDict>>) -> PyResult<()> {
        let params = match params {
            Some(dict) => py_dict_to_yaml(dict)?,
            None => BTreeMap::new(),
        };
        self.inner.set_params(params);
        Ok(())
    }

    /// Run nested_fit in `path` and return its result, or None.
    ///
    /// Args:
    ///     path: Run directory. Default: "."
    ///     silent_output: Skip the live dashboard. Default: False
    #[pyo3(signature = (path=".", silent_output=false))]
    fn sample(&self, py: Python<'_>, path: &str, silent_output: bool) -> PyResult<Py<PyAny>> {
        let options = SampleOptions::default()
            .with_run_dir(path)
            .with_silent_output(silent_output);
        let inner = &self.inner;
        let result = py
            .detach(|| inner.sample(&options))
            .map_err(to_py_err)?;

        match result {
            Some(result) => json_to_py(py, result.as_value()),
            None => Ok(py.None()),
        }
    }

    /// Write nf_input.yaml into `path` and return the file path.
    #[pyo3(signature = (path="."))]
    fn write(&self, path: &str) -> PyResult<String> {
        let written = self
            .inner
            .write_input_file(&PathBuf::from(path))
            .map_err(to_py_err)?;
        Ok(written.to_string_lossy().to_string())
    }

    /// The (x, c) columns of the single data file.
    fn data(&self) -> PyResult<(Vec<f64>, Vec<f64>)> {
        self.inner.data().map_err(to_py_err)
    }

    /// The configuration as a dict, in the layout of nf_input.yaml.
    #[getter]
    fn config(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let value = serde_json::to_value(self.inner.config())
            .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;
        json_to_py(py, &value)
    }

    #[getter]
    fn keep_yaml(&self) -> bool {
        self.inner.keep_yaml()
    }

    #[setter]
    fn set_keep_yaml(&mut self, keep: bool) {
        self.inner.set_keep_yaml(keep);
    }

    fn __repr__(&self) -> String {
        let cfg = self.inner.config();
        format!(
            "Configurator(datafiles={:?}, likelihood={:?}, version={})",
            cfg.datafiles, cfg.likelihood, cfg.version
        )
    }
}

// ─── Type conversion helpers ──────────────────────────────────────────────────

fn to_py_err(e: NestfitError) -> PyErr {
    match e {
        NestfitError::NoDataFiles
        | NestfitError::UnsupportedExtension(_)
        | NestfitError::MissingColumn { .. }
        | NestfitError::InvalidValue { .. }
        | NestfitError::EmptyData(_)
        | NestfitError::MultiFileUnsupported(_)
        | NestfitError::UnknownSlot(_) => PyValueError::new_err(e.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn py_dict_to_yaml(dict: &Bound<'_, PyDict>) -> PyResult<BTreeMap<String, serde_yaml::Value>> {
    let mut map = BTreeMap::new();
    for (k, v) in dict.iter() {
        let key: String = k.extract()?;
        map.insert(key, py_to_yaml(&v)?);
    }
    Ok(map)
}

fn py_to_yaml(v: &Bound<'_, PyAny>) -> PyResult<serde_yaml::Value> {
    // bool before int: Python bools are ints.
    let val = if v.is_none() {
        serde_yaml::Value::Null
    } else if let Ok(b) = v.extract::<bool>() {
        serde_yaml::Value::Bool(b)
    } else if let Ok(i) = v.extract::<i64>() {
        serde_yaml::Value::Number(serde_yaml::Number::from(i))
    } else if let Ok(f) = v.extract::<f64>() {
        serde_yaml::Value::Number(serde_yaml::Number::from(f))
    } else if let Ok(s) = v.extract::<String>() {
        serde_yaml::Value::String(s)
    } else if let Ok(dict) = v.extract::<Bound<'_, PyDict>>() {
        let mut mapping = serde_yaml::Mapping::new();
        for (key, value) in py_dict_to_yaml(&dict)? {
            mapping.insert(serde_yaml::Value::String(key), value);
        }
        serde_yaml::Value::Mapping(mapping)
    } else if let Ok(items) = v.extract::<Vec<Bound<'_, PyAny>>>() {
        serde_yaml::Value::Sequence(items.iter().map(py_to_yaml).collect::<PyResult<_>>()?)
    } else {
        serde_yaml::Value::String(v.str()?.to_string())
    };
    Ok(val)
}

fn json_to_py(py: Python<'_>, value: &serde_json::Value) -> PyResult<Py<PyAny>> {
    use serde_json::Value;

    match value {
        Value::Null => Ok(py.None()),
        Value::Bool(b) => b.into_py_any(py),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into_py_any(py)
            } else if let Some(u) = n.as_u64() {
                u.into_py_any(py)
            } else {
                n.as_f64().unwrap_or(f64::NAN).into_py_any(py)
            }
        }
        Value::String(s) => s.into_py_any(py),
        Value::Array(items) => {
            let list = PyList::empty(py);
            for item in items {
                list.append(json_to_py(py, item)?)?;
            }
            list.into_py_any(py)
        }
        Value::Object(map) => {
            let dict = PyDict::new(py);
            for (k, v) in map {
                dict.set_item(k, json_to_py(py, v)?)?;
            }
            dict.into_py_any(py)
        }
    }
}

// ─── Module definition ────────────────────────────────────────────────────────

#[pymodule]
fn pynestfit(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();

    m.add_class::<PyConfigurator>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
