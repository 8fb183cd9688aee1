//! nestfit CLI: configure, run and inspect nested_fit fits from the shell.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nestfit::extents::compute_extents;
use nestfit::{
    read_result, Configurator, Features, FitResult, FitSettings, ProgressRecord, RunObserver,
    RunOutcome, SampleOptions,
};

#[derive(Parser)]
#[command(
    name = "nestfit",
    about = "🎯 nestfit: run and monitor nested_fit",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the input file, run nested_fit and show its result
    Run {
        #[command(flatten)]
        fit: FitArgs,
        /// Directory to run in
        #[arg(long, env = "NESTFIT_RUN_DIR", default_value = ".")]
        dir: PathBuf,
        /// Delete nf_input.yaml once the run is over
        #[arg(long)]
        no_keep_yaml: bool,
        /// No dashboard; only echo error lines
        #[arg(long)]
        silent: bool,
        /// Show a one-line spinner instead of the dashboard
        #[arg(long, conflicts_with = "silent")]
        plain: bool,
        /// Executable to launch instead of nested_fit<version>
        #[arg(long, env = "NESTFIT_EXECUTABLE")]
        executable: Option<PathBuf>,
        /// Kill nested_fit after this many seconds without output
        #[arg(long, value_name = "SECS")]
        stall_timeout: Option<u64>,
        /// Build metadata (OpenMP, OpenMPI, LTRACE, BUILDTYPE, PPROF) to display
        #[arg(long)]
        features_file: Option<PathBuf>,
    },
    /// Only write nf_input.yaml
    Config {
        #[command(flatten)]
        fit: FitArgs,
        /// Directory to write into
        #[arg(long, env = "NESTFIT_RUN_DIR", default_value = ".")]
        dir: PathBuf,
    },
    /// Print the x range of a data file
    Extents {
        /// Data file (.csv or .tsv)
        file: PathBuf,
        /// Column layout
        #[arg(long, default_value = "x,c")]
        specstr: String,
    },
    /// Show the result of a finished run
    Show {
        /// Run directory containing nf_output_res.json
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Print the raw JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Fit settings; anything left out keeps its default.
#[derive(Args)]
struct FitArgs {
    /// Data files (.csv or .tsv)
    #[arg(required = true)]
    datafiles: Vec<PathBuf>,
    /// Model expression; repeat for one expression per data file
    #[arg(long = "expression", short = 'e')]
    expressions: Vec<String>,
    /// Parameter default, e.g. `--param x0=10.5`; the value is read as YAML
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, serde_yaml::Value)>,
    /// Column layout of the data files
    #[arg(long)]
    specstr: Option<String>,
    #[arg(long)]
    likelihood: Option<String>,
    #[arg(long)]
    livepoints: Option<u32>,
    #[arg(long)]
    search_method: Option<String>,
    #[arg(long, num_args = 2, value_names = ["PARAM1", "PARAM2"], allow_negative_numbers = true)]
    search_params: Option<Vec<f64>>,
    #[arg(long)]
    search_maxtries: Option<u32>,
    #[arg(long)]
    search_multries: Option<u32>,
    #[arg(long)]
    search_maxsteps: Option<u64>,
    #[arg(long)]
    conv_method: Option<String>,
    #[arg(long)]
    conv_accuracy: Option<f64>,
    #[arg(long)]
    conv_parameter: Option<f64>,
    /// Enable clustering
    #[arg(long)]
    cluster: bool,
    #[arg(long)]
    cluster_method: Option<String>,
    #[arg(long)]
    cluster_distance: Option<f64>,
    #[arg(long)]
    cluster_bandwidth: Option<f64>,
    /// Pin the lower x extent
    #[arg(long, allow_negative_numbers = true)]
    xmin: Option<f64>,
    /// Pin the upper x extent
    #[arg(long, allow_negative_numbers = true)]
    xmax: Option<f64>,
    /// Slot the extents apply to (default: the first one)
    #[arg(long)]
    slot: Option<usize>,
    /// nested_fit version to target
    #[arg(long, env = "NESTFIT_TOOL_VERSION")]
    tool_version: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            fit,
            dir,
            no_keep_yaml,
            silent,
            plain,
            executable,
            stall_timeout,
            features_file,
        } => {
            let mut cfg = fit.build()?;
            if no_keep_yaml {
                cfg.set_keep_yaml(false);
            }
            let features = match features_file {
                Some(path) => Features::from_yaml_file(&path)
                    .with_context(|| format!("Reading {}", path.display()))?,
                None => Features::default(),
            };
            let mut options = SampleOptions::default()
                .with_run_dir(dir)
                .with_silent_output(silent)
                .with_features(features);
            options.executable = executable;
            options.stall_timeout = stall_timeout.map(Duration::from_secs);

            cmd_run(&cfg, &options, plain).await?;
        }
        Commands::Config { fit, dir } => {
            let cfg = fit.build()?;
            let path = cfg.write_input_file(&dir)?;
            println!("✓ Wrote {}", path.display());
        }
        Commands::Extents { file, specstr } => {
            let (xmin, xmax) = compute_extents(&file, &specstr)?;
            println!("xmin: {}", xmin);
            println!("xmax: {}", xmax);
        }
        Commands::Show { dir, json } => {
            cmd_show(&dir, json)?;
        }
    }

    Ok(())
}

impl FitArgs {
    fn build(self) -> Result<Configurator> {
        let defaults = FitSettings::default();
        let search_params = match self.search_params.as_deref() {
            Some([p1, p2]) => (*p1, *p2),
            _ => defaults.search_params,
        };

        let settings = FitSettings {
            datafiles: self.datafiles,
            specstr: self.specstr.unwrap_or(defaults.specstr),
            likelihood: self.likelihood.unwrap_or(defaults.likelihood),
            expressions: self.expressions,
            params: self.params.into_iter().collect::<BTreeMap<_, _>>(),
            livepoints: self.livepoints.unwrap_or(defaults.livepoints),
            search_method: self.search_method.unwrap_or(defaults.search_method),
            search_params,
            search_maxtries: self.search_maxtries.unwrap_or(defaults.search_maxtries),
            search_multries: self.search_multries.unwrap_or(defaults.search_multries),
            search_maxsteps: self.search_maxsteps.unwrap_or(defaults.search_maxsteps),
            conv_method: self.conv_method.unwrap_or(defaults.conv_method),
            conv_accuracy: self.conv_accuracy.unwrap_or(defaults.conv_accuracy),
            conv_parameter: self.conv_parameter.unwrap_or(defaults.conv_parameter),
            cluster_enable: self.cluster,
            cluster_method: self.cluster_method.unwrap_or(defaults.cluster_method),
            cluster_distance: self.cluster_distance.unwrap_or(defaults.cluster_distance),
            cluster_bandwidth: self.cluster_bandwidth.unwrap_or(defaults.cluster_bandwidth),
            keep_yaml: defaults.keep_yaml,
            tool_version: self.tool_version.unwrap_or(defaults.tool_version),
        };

        let mut cfg = Configurator::new(settings)?;

        if self.xmin.is_some() || self.xmax.is_some() {
            let slot = self
                .slot
                .unwrap_or(if cfg.is_multi_expression() { 1 } else { 0 });
            let current = cfg
                .extents(slot)
                .with_context(|| format!("No data slot {slot}"))?;
            cfg.set_extents(
                self.xmin.unwrap_or(current.xmin),
                self.xmax.unwrap_or(current.xmax),
                slot,
            )?;
        }

        Ok(cfg)
    }
}

fn parse_param(raw: &str) -> std::result::Result<(String, serde_yaml::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing parameter name in `{raw}`"));
    }
    let value = serde_yaml::from_str(value.trim()).map_err(|e| e.to_string())?;
    Ok((key.to_string(), value))
}

// ─── Command implementations ──────────────────────────────────────────────────

async fn cmd_run(cfg: &Configurator, options: &SampleOptions, plain: bool) -> Result<()> {
    info!(
        files = cfg.config().datafiles.len(),
        dir = %options.run_dir.display(),
        "Starting fit"
    );

    let outcome = if plain {
        let mut spinner = Spinner::new()?;
        cfg.run_with(options, &mut spinner).await?
    } else {
        cfg.run(options).await?
    };

    print_summary(&outcome);

    match &outcome.result {
        Some(result) => {
            println!("{}", result_table(result));
            Ok(())
        }
        None => anyhow::bail!("nested_fit produced no result"),
    }
}

fn cmd_show(dir: &Path, json: bool) -> Result<()> {
    let result = read_result(dir)
        .with_context(|| format!("No readable result in {}", dir.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(result.as_value())?);
    } else {
        println!("Result: {}", dir.display());
        println!("{}", result_table(&result));
    }
    Ok(())
}

// ─── Plain progress ───────────────────────────────────────────────────────────

/// One-line spinner for terminals where the dashboard is unwelcome.
struct Spinner {
    bar: ProgressBar,
    records: usize,
}

impl Spinner {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {msg}",
        )?);
        bar.set_message("waiting for output");
        Ok(Self { bar, records: 0 })
    }
}

impl RunObserver for Spinner {
    fn on_error(&mut self, line: &str) {
        self.bar.suspend(|| println!("{line}"));
    }

    fn on_progress(&mut self, record: &ProgressRecord) {
        self.records += 1;
        self.bar.set_message(format!(
            "{} records │ {}",
            self.records,
            record.fields.join(" │ ")
        ));
    }

    fn on_tick(&mut self) -> nestfit::Result<()> {
        self.bar.tick();
        Ok(())
    }

    fn finish(&mut self) -> nestfit::Result<()> {
        self.bar.finish_and_clear();
        Ok(())
    }
}

// ─── Utilities ────────────────────────────────────────────────────────────────

fn print_summary(outcome: &RunOutcome) {
    let status = if outcome.aborted {
        "aborted".to_string()
    } else if outcome.stalled {
        "stalled".to_string()
    } else {
        match outcome.exit_code {
            Some(code) => format!("exit {}", code),
            None => "killed".to_string(),
        }
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Status", "Started", "Duration", "Records", "Errors"]);
    table.add_row([
        status.as_str(),
        &outcome
            .started_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        &format_duration(outcome.duration_secs()),
        &outcome.progress_records.to_string(),
        &outcome.errors.to_string(),
    ]);
    println!("{}", table);
}

fn result_table(result: &FitResult) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Key", "Value"]);
    for (key, value) in result.flatten() {
        table.add_row([key, value]);
    }
    table
}

fn format_duration(secs: f64) -> String {
    let secs = secs as u64;
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}h {}m", h, m)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}
