//! Running nested_fit on a configuration.
//!
//! The driving loop multiplexes two sources with `tokio::select!`: lines from
//! the process reader task, and a refresh ticker that redraws the observer
//! and checks for exit, abort and stalls. Neither can starve the other.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Configurator;
use crate::dashboard::{Dashboard, InputInfo, LiveDashboard};
use crate::error::Result;
use crate::models::{Features, INPUT_FILE_NAME};
use crate::parser::{parse_line, ParsedLine, ProgressRecord};
use crate::results::{load_result, FitResult};
use crate::supervisor::{executable_name, LineEvent, RunProcess};

/// How long to keep reading after exit before giving up on the stream.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// Receives what a run produces while it is supervised.
pub trait RunObserver {
    /// A line carrying the error marker, newline stripped.
    fn on_error(&mut self, line: &str);

    fn on_progress(&mut self, record: &ProgressRecord);

    /// Called on every refresh tick.
    fn on_tick(&mut self) -> Result<()> {
        Ok(())
    }

    /// Polled on every tick; `true` kills the process.
    fn abort_requested(&mut self) -> bool {
        false
    }

    /// Called once after the process is gone.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Echoes error lines to stdout and nothing else.
#[derive(Debug, Default)]
pub struct ConsoleEcho;

impl RunObserver for ConsoleEcho {
    fn on_error(&mut self, line: &str) {
        println!("{line}");
    }

    fn on_progress(&mut self, _record: &ProgressRecord) {}
}

/// How to run the executable.
#[derive(Debug, Clone)]
pub struct SampleOptions {
    /// Where the input file is written and the process runs.
    pub run_dir: PathBuf,
    /// No dashboard; only error lines are echoed.
    pub silent_output: bool,
    /// Executable to launch instead of `nested_fit<version>`.
    pub executable: Option<PathBuf>,
    pub refresh_interval: Duration,
    /// Kill the process after this long without output.
    pub stall_timeout: Option<Duration>,
    pub features: Features,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from("."),
            silent_output: false,
            executable: None,
            refresh_interval: Duration::from_millis(1500),
            stall_timeout: None,
            features: Features::default(),
        }
    }
}

impl SampleOptions {
    pub fn with_run_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.run_dir = dir.into();
        self
    }

    pub fn with_silent_output(mut self, silent: bool) -> Self {
        self.silent_output = silent;
        self
    }

    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn with_refresh_interval(mut self, every: Duration) -> Self {
        self.refresh_interval = every;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }
}

/// Counters collected by [`supervise`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisionStats {
    pub progress_records: usize,
    pub errors: usize,
    pub ignored: usize,
    pub aborted: bool,
    pub stalled: bool,
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
}

/// Everything known about a finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub progress_records: usize,
    pub errors: usize,
    pub aborted: bool,
    pub stalled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: Option<FitResult>,
}

impl RunOutcome {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

enum Wake {
    Line(Option<String>),
    Tick,
}

/// Drive a started process to completion, feeding its output to `observer`.
///
/// A failing [`RunObserver::on_tick`] is logged and never ends the run. Abort
/// and stall kills are only logged at debug level here, as the observer may
/// still own the screen; they are reported in the returned stats.
pub async fn supervise<O: RunObserver + ?Sized>(
    process: &mut RunProcess,
    observer: &mut O,
    refresh: Duration,
    stall_timeout: Option<Duration>,
) -> Result<SupervisionStats> {
    let mut stats = SupervisionStats::default();
    let mut ticker = interval(refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_output = Instant::now();
    let mut stream_open = true;

    loop {
        let wake = tokio::select! {
            line = process.recv_line(), if stream_open => Wake::Line(line),
            _ = ticker.tick() => Wake::Tick,
        };

        match wake {
            Wake::Line(Some(line)) => {
                last_output = Instant::now();
                handle_line(&line, observer, &mut stats);
            }
            Wake::Line(None) => stream_open = false,
            Wake::Tick => {
                if let Err(e) = observer.on_tick() {
                    warn!("Refresh failed, the run carries on: {}", e);
                }

                if observer.abort_requested() {
                    debug!("Abort requested, killing nested_fit");
                    stats.aborted = true;
                    process.kill().await?;
                    break;
                }

                if let Some(limit) = stall_timeout {
                    let silent_for = last_output.elapsed();
                    if silent_for >= limit {
                        debug!(
                            silent_secs = silent_for.as_secs_f64(),
                            "nested_fit produced no output, killing it"
                        );
                        stats.stalled = true;
                        process.kill().await?;
                        break;
                    }
                }

                if process.poll_exit()?.is_some() {
                    break;
                }
            }
        }
    }

    while let LineEvent::Line(line) = process.next_line(DRAIN_TIMEOUT).await {
        handle_line(&line, observer, &mut stats);
    }

    stats.exit_code = process.wait().await?.code();
    Ok(stats)
}

fn handle_line<O: RunObserver + ?Sized>(line: &str, observer: &mut O, stats: &mut SupervisionStats) {
    match parse_line(line) {
        ParsedLine::Error(text) => {
            stats.errors += 1;
            observer.on_error(&text);
        }
        ParsedLine::Progress(record) => {
            stats.progress_records += 1;
            observer.on_progress(&record);
        }
        ParsedLine::Ignorable => {
            stats.ignored += 1;
            debug!(line = line.trim_end(), "Ignoring output line");
        }
    }
}

impl Configurator {
    /// Write the input file, run the executable under `observer` and load its result.
    ///
    /// Fails before anything is shown if the process cannot be started. A run
    /// that produced no readable result still succeeds, with `result: None`.
    pub async fn run_with(
        &self,
        options: &SampleOptions,
        observer: &mut dyn RunObserver,
    ) -> Result<RunOutcome> {
        let input_file = self.write_input_file(&options.run_dir)?;

        let program = options
            .executable
            .clone()
            .unwrap_or_else(|| PathBuf::from(executable_name(self.tool_version())));
        let mut process = RunProcess::new(program, &options.run_dir);

        let started_at = Utc::now();
        if let Err(e) = process.start() {
            self.discard_input_file(&input_file);
            return Err(e);
        }

        let supervised = supervise(
            &mut process,
            &mut *observer,
            options.refresh_interval,
            options.stall_timeout,
        )
        .await;
        let finished = observer.finish();
        self.discard_input_file(&input_file);
        let stats = supervised?;
        finished?;

        let finished_at = Utc::now();
        if stats.aborted {
            warn!("Run aborted by user");
        }
        if stats.stalled {
            warn!(limit = ?options.stall_timeout, "nested_fit stopped producing output and was killed");
        }
        info!(
            code = ?stats.exit_code,
            records = stats.progress_records,
            errors = stats.errors,
            "Run finished"
        );

        Ok(RunOutcome {
            exit_code: stats.exit_code,
            progress_records: stats.progress_records,
            errors: stats.errors,
            aborted: stats.aborted,
            stalled: stats.stalled,
            started_at,
            finished_at,
            result: load_result(&options.run_dir),
        })
    }

    /// [`run_with`](Self::run_with) using the live dashboard, or plain error
    /// echo when `silent_output` is set.
    pub async fn run(&self, options: &SampleOptions) -> Result<RunOutcome> {
        let mut observer: Box<dyn RunObserver> = if options.silent_output {
            Box::new(ConsoleEcho)
        } else {
            let dashboard = Dashboard::new(
                self.tool_version(),
                options.features.clone(),
                InputInfo::from_config(self.config()),
            );
            Box::new(LiveDashboard::new(dashboard))
        };
        self.run_with(options, observer.as_mut()).await
    }

    /// [`run`](Self::run) on a fresh current-thread runtime.
    pub fn run_blocking(&self, options: &SampleOptions) -> Result<RunOutcome> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.run(options))
    }

    /// Run and return only the result.
    pub fn sample(&self, options: &SampleOptions) -> Result<Option<FitResult>> {
        Ok(self.run_blocking(options)?.result)
    }

    fn discard_input_file(&self, path: &Path) {
        if self.keep_yaml() {
            return;
        }
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), "Could not remove input file: {}", e);
        } else {
            debug!(path = %path.display(), "Removed {}", INPUT_FILE_NAME);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::FitSettings;
    use crate::error::NestfitError;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        errors: Vec<String>,
        records: Vec<ProgressRecord>,
        ticks: usize,
        abort_after: Option<usize>,
        finished: bool,
    }

    impl RunObserver for Recorder {
        fn on_error(&mut self, line: &str) {
            self.errors.push(line.to_string());
        }

        fn on_progress(&mut self, record: &ProgressRecord) {
            self.records.push(record.clone());
        }

        fn on_tick(&mut self) -> Result<()> {
            self.ticks += 1;
            Ok(())
        }

        fn abort_requested(&mut self) -> bool {
            self.abort_after.is_some_and(|n| self.ticks >= n)
        }

        fn finish(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn shell(tmp: &TempDir, script: &str) -> RunProcess {
        let mut process = RunProcess::new("sh", tmp.path()).with_args(["-c", script]);
        process.start().unwrap();
        process
    }

    #[tokio::test]
    async fn test_lines_are_routed() {
        let tmp = TempDir::new().unwrap();
        let mut process = shell(
            &tmp,
            "echo 'LO| 1 | -12.5'; echo '<ERROR>| bad prior'; echo 'banner'; echo 'LO|2|-11.0'",
        );
        let mut recorder = Recorder::default();

        let stats = supervise(&mut process, &mut recorder, Duration::from_millis(20), None)
            .await
            .unwrap();

        assert_eq!(stats.progress_records, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.ignored, 1);
        assert_eq!(stats.exit_code, Some(0));
        assert_eq!(recorder.errors, vec!["<ERROR>| bad prior".to_string()]);
        assert_eq!(recorder.records[0].fields, vec!["1", "-12.5"]);
        assert!(recorder.ticks >= 1);
    }

    #[tokio::test]
    async fn test_error_lines_never_count_as_progress() {
        let tmp = TempDir::new().unwrap();
        let mut process = shell(&tmp, "echo '<ERROR> LO|x'; echo '<ERROR>|LO'");
        let mut recorder = Recorder::default();

        let stats = supervise(&mut process, &mut recorder, Duration::from_millis(20), None)
            .await
            .unwrap();

        assert_eq!(stats.errors, 2);
        assert_eq!(stats.progress_records, 0);
        assert!(recorder.records.is_empty());
    }

    #[tokio::test]
    async fn test_stderr_errors_are_counted() {
        let tmp = TempDir::new().unwrap();
        let mut process = shell(&tmp, "echo '<ERROR>| from stderr' >&2; echo 'LO|1'");
        let mut recorder = Recorder::default();

        let stats = supervise(&mut process, &mut recorder, Duration::from_millis(20), None)
            .await
            .unwrap();

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.progress_records, 1);
        assert_eq!(recorder.errors, vec!["<ERROR>| from stderr".to_string()]);
    }

    #[tokio::test]
    async fn test_failing_refresh_does_not_end_run() {
        struct BrokenScreen(Recorder);

        impl RunObserver for BrokenScreen {
            fn on_error(&mut self, line: &str) {
                self.0.on_error(line);
            }

            fn on_progress(&mut self, record: &ProgressRecord) {
                self.0.on_progress(record);
            }

            fn on_tick(&mut self) -> Result<()> {
                self.0.ticks += 1;
                Err(std::io::Error::from_raw_os_error(6).into())
            }
        }

        let tmp = TempDir::new().unwrap();
        let mut process = shell(&tmp, "sleep 0.2; echo 'LO|1|-1'; exit 4");
        let mut screen = BrokenScreen(Recorder::default());

        let stats = supervise(&mut process, &mut screen, Duration::from_millis(20), None)
            .await
            .unwrap();

        assert!(screen.0.ticks > 1);
        assert_eq!(stats.progress_records, 1);
        assert_eq!(stats.exit_code, Some(4));
        assert!(!stats.aborted);
    }

    #[tokio::test]
    async fn test_output_before_exit_is_not_lost() {
        let tmp = TempDir::new().unwrap();
        let mut process = shell(
            &tmp,
            "i=0; while [ $i -lt 500 ]; do echo \"LO|$i\"; i=$((i+1)); done; exit 3",
        );
        let mut recorder = Recorder::default();

        let stats = supervise(&mut process, &mut recorder, Duration::from_millis(5), None)
            .await
            .unwrap();

        assert_eq!(stats.progress_records, 500);
        assert_eq!(recorder.records.last().unwrap().fields, vec!["499"]);
        assert_eq!(stats.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_stall_timeout_kills_silent_process() {
        let tmp = TempDir::new().unwrap();
        let mut process = shell(&tmp, "exec sleep 30");
        let mut recorder = Recorder::default();

        let started = Instant::now();
        let stats = supervise(
            &mut process,
            &mut recorder,
            Duration::from_millis(20),
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        assert!(stats.stalled);
        assert!(!stats.aborted);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_abort_kills_process() {
        let tmp = TempDir::new().unwrap();
        let mut process = shell(&tmp, "exec sleep 30");
        let mut recorder = Recorder {
            abort_after: Some(2),
            ..Default::default()
        };

        let stats = supervise(&mut process, &mut recorder, Duration::from_millis(20), None)
            .await
            .unwrap();

        assert!(stats.aborted);
        assert_eq!(recorder.ticks, 2);
        assert_eq!(stats.exit_code, None);
    }

    fn configurator(tmp: &TempDir, keep_yaml: bool) -> Configurator {
        let file = tmp.path().join("data.csv");
        fs::write(&file, "1,10\n5,20\n3,15\n").unwrap();
        let mut settings = FitSettings::new([file]).with_expression("a*x+b");
        settings.keep_yaml = keep_yaml;
        Configurator::new(settings).unwrap()
    }

    #[tokio::test]
    async fn test_start_failure_removes_input_when_not_kept() {
        let tmp = TempDir::new().unwrap();
        let cfg = configurator(&tmp, false);
        let run_dir = tmp.path().join("run");
        let options = SampleOptions::default()
            .with_run_dir(&run_dir)
            .with_executable("nested_fit-does-not-exist");
        let mut recorder = Recorder::default();

        let err = cfg.run_with(&options, &mut recorder).await.unwrap_err();

        assert!(matches!(err, NestfitError::Spawn { .. }));
        assert!(!run_dir.join(INPUT_FILE_NAME).exists());
        assert_eq!(recorder.ticks, 0);
        assert!(!recorder.finished);
    }

    #[tokio::test]
    async fn test_start_failure_keeps_input_when_asked() {
        let tmp = TempDir::new().unwrap();
        let cfg = configurator(&tmp, true);
        let options = SampleOptions::default()
            .with_run_dir(tmp.path())
            .with_executable("nested_fit-does-not-exist");

        assert!(cfg.run_with(&options, &mut Recorder::default()).await.is_err());
        assert!(tmp.path().join(INPUT_FILE_NAME).exists());
    }

    #[test]
    fn test_default_options() {
        let options = SampleOptions::default();
        assert_eq!(options.run_dir, PathBuf::from("."));
        assert!(!options.silent_output);
        assert_eq!(options.refresh_interval, Duration::from_millis(1500));
        assert!(options.stall_timeout.is_none());
    }
}
