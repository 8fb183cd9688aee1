//! Live terminal dashboard for a running nested_fit process.
//!
//! Layout, top to bottom:
//!
//! ```text
//! ┌ Nested Fit Dashboard ─────────────────────────────────────────┐
//! │ Version  Elapsed │ CPU/MEM gauges │ flags │ warnings │ ✓ ALL OK │
//! └───────────────────────────────────────────────────────────────┘
//! ┌ Input Info ──────────────────┐┌ Output Info ──────────────────┐
//! │ data files, expressions, ... ││ progress records              │
//! └──────────────────────────────┘└───────────────────────────────┘
//! ```
//!
//! [`Dashboard`] only holds render state and can be drawn on any ratatui
//! backend. [`LiveDashboard`] puts it on the real terminal and plugs it into
//! the run loop as a [`RunObserver`].

use std::io::{self, IsTerminal, Write};

use ratatui::{
    layout::{Constraint, Layout},
    Frame,
};
use tracing::warn;

use crate::error::Result;
use crate::models::Features;
use crate::parser::ProgressRecord;
use crate::runner::RunObserver;

pub mod gauge;
mod header;
mod panels;
mod terminal;

pub use gauge::{LoadSource, RollingGauge, SystemLoad};
pub use header::DashboardHeader;
pub use panels::{InputInfo, OutputInfo};
pub use terminal::LiveTerminal;

/// Header height, borders included.
const HEADER_HEIGHT: u16 = 4;

pub struct Dashboard<L = SystemLoad> {
    header: DashboardHeader,
    input: InputInfo,
    output: OutputInfo,
    load: L,
}

impl Dashboard<SystemLoad> {
    pub fn new(version: impl Into<String>, features: Features, input: InputInfo) -> Self {
        Self::with_load_source(version, features, input, SystemLoad::new())
    }
}

impl<L: LoadSource> Dashboard<L> {
    pub fn with_load_source(
        version: impl Into<String>,
        features: Features,
        input: InputInfo,
        load: L,
    ) -> Self {
        Self {
            header: DashboardHeader::new(version, features),
            input,
            output: OutputInfo::default(),
            load,
        }
    }

    /// One refresh tick: elapsed time and both load gauges.
    pub fn update(&mut self) {
        self.header.update(&mut self.load);
    }

    pub fn push_record(&mut self, record: ProgressRecord) {
        self.output.push(record);
    }

    pub fn note_error(&mut self) {
        self.output.note_error();
    }

    pub fn header(&self) -> &DashboardHeader {
        &self.header
    }

    pub fn output(&self) -> &OutputInfo {
        &self.output
    }

    pub fn render(&self, frame: &mut Frame<'_>) {
        let [header, body] =
            Layout::vertical([Constraint::Length(HEADER_HEIGHT), Constraint::Min(0)])
                .areas(frame.area());
        let [input, output] =
            Layout::horizontal([Constraint::Percentage(50); 2]).areas(body);

        self.header.render(frame, header);
        self.input.render(frame, input);
        self.output.render(frame, output);
    }
}

/// Where a [`LiveDashboard`] is drawing.
enum Screen {
    /// Before the first tick.
    Pending,
    Live(LiveTerminal),
    /// No usable terminal: error lines go straight to stdout.
    Echo,
}

/// A [`Dashboard`] on the real terminal.
///
/// The alternate screen is entered on the first tick, so a run that fails to
/// start never flashes an empty dashboard. Error lines are held back while
/// the dashboard is up and echoed to stdout once the terminal is restored.
///
/// When stdout is not a terminal, or the terminal cannot be set up or drawn
/// on, the dashboard logs a warning and degrades to echoing error lines as
/// they arrive. The run itself carries on.
pub struct LiveDashboard<L: LoadSource = SystemLoad> {
    dashboard: Dashboard<L>,
    screen: Screen,
    interactive: bool,
    pending_errors: Vec<String>,
}

impl<L: LoadSource> LiveDashboard<L> {
    pub fn new(dashboard: Dashboard<L>) -> Self {
        Self {
            dashboard,
            screen: Screen::Pending,
            interactive: io::stdout().is_terminal(),
            pending_errors: Vec::new(),
        }
    }

    /// Override terminal detection. `false` never touches the terminal.
    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn dashboard(&self) -> &Dashboard<L> {
        &self.dashboard
    }

    /// Whether the alternate screen is currently up.
    pub fn is_live(&self) -> bool {
        matches!(self.screen, Screen::Live(_))
    }

    /// Error lines waiting for the terminal to be restored.
    pub fn pending_errors(&self) -> &[String] {
        &self.pending_errors
    }

    fn open_screen(&self) -> Screen {
        if !self.interactive {
            warn!("stdout is not a terminal, showing error lines only");
            return Screen::Echo;
        }
        match LiveTerminal::enter() {
            Ok(terminal) => Screen::Live(terminal),
            Err(e) => {
                warn!("Could not open the dashboard, showing error lines only: {}", e);
                Screen::Echo
            }
        }
    }

    /// Leave the alternate screen, if any, and stay in echo mode.
    fn fall_back(&mut self) -> io::Result<()> {
        self.screen = Screen::Echo;
        self.flush_errors(&mut io::stdout().lock())
    }

    fn flush_errors(&mut self, out: &mut impl Write) -> io::Result<()> {
        for line in self.pending_errors.drain(..) {
            writeln!(out, "{line}")?;
        }
        out.flush()
    }
}

impl<L: LoadSource> RunObserver for LiveDashboard<L> {
    fn on_error(&mut self, line: &str) {
        self.dashboard.note_error();
        if matches!(self.screen, Screen::Echo) {
            println!("{line}");
        } else {
            self.pending_errors.push(line.to_string());
        }
    }

    fn on_progress(&mut self, record: &ProgressRecord) {
        self.dashboard.push_record(record.clone());
    }

    fn on_tick(&mut self) -> Result<()> {
        if matches!(self.screen, Screen::Pending) {
            self.screen = self.open_screen();
            if matches!(self.screen, Screen::Echo) {
                self.fall_back()?;
            }
        }
        self.dashboard.update();

        let drawn = match &mut self.screen {
            Screen::Live(terminal) => terminal.draw(&self.dashboard),
            _ => Ok(()),
        };
        if let Err(e) = drawn {
            warn!("Dashboard redraw failed, showing error lines only: {}", e);
            self.fall_back()?;
        }
        Ok(())
    }

    fn abort_requested(&mut self) -> bool {
        match &mut self.screen {
            Screen::Live(terminal) => terminal.abort_requested().unwrap_or(false),
            _ => false,
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.fall_back()?;
        Ok(())
    }
}

impl<L: LoadSource> Drop for LiveDashboard<L> {
    fn drop(&mut self) {
        let _ = self.fall_back();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Features;
    use ratatui::{backend::TestBackend, Terminal};

    struct FixedLoad;

    impl LoadSource for FixedLoad {
        fn cpu_percent(&mut self) -> f64 {
            42.0
        }

        fn memory_percent(&mut self) -> f64 {
            77.0
        }
    }

    fn features(debug: bool) -> Features {
        Features {
            openmp: true,
            openmpi: false,
            tracing: debug,
            build_type: if debug { "Debug" } else { "Release" }.to_string(),
            profiling: debug,
        }
    }

    fn render(dashboard: &Dashboard<FixedLoad>) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 20)).unwrap();
        terminal.draw(|f| dashboard.render(f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn test_header_contents() {
        let mut dashboard =
            Dashboard::with_load_source("5.3.0", features(false), InputInfo::default(), FixedLoad);
        dashboard.update();
        dashboard.update();

        assert_eq!(dashboard.header().cpu().history(), vec![42, 42]);
        assert_eq!(dashboard.header().mem().latest(), Some(77));

        let screen = render(&dashboard);
        assert!(screen.contains("Nested Fit Dashboard"));
        assert!(screen.contains("Version 5.3.0"));
        assert!(screen.contains("Elapsed 00:00:00"));
        assert!(screen.contains("CPU"));
        assert!(screen.contains("MEM"));
        assert!(screen.contains("OpenMP YES"));
        assert!(screen.contains("OpenMPI NO"));
        assert!(screen.contains("ALL OK"));
        assert!(!screen.contains("Debug build!"));
    }

    #[test]
    fn test_warnings_follow_features() {
        let dashboard =
            Dashboard::with_load_source("5.3.0", features(true), InputInfo::default(), FixedLoad);
        let screen = render(&dashboard);
        assert!(screen.contains("Tracing on!"));
        assert!(screen.contains("Debug build!"));
        assert!(screen.contains("Profiling on!"));
        assert!(screen.contains("ALL OK"));
    }

    #[test]
    fn test_output_panel_lists_records() {
        let mut dashboard =
            Dashboard::with_load_source("5.3.0", features(false), InputInfo::default(), FixedLoad);
        dashboard.push_record(ProgressRecord {
            tag: "LO".to_string(),
            fields: vec!["1200".to_string(), "-345.6".to_string()],
        });
        dashboard.note_error();

        let screen = render(&dashboard);
        assert!(screen.contains("Input Info"));
        assert!(screen.contains("Output Info"));
        assert!(screen.contains("Records 1"));
        assert!(screen.contains("Errors 1"));
        assert!(screen.contains("1200 │ -345.6"));
    }

    fn headless() -> LiveDashboard<FixedLoad> {
        let dashboard =
            Dashboard::with_load_source("5.3.0", features(false), InputInfo::default(), FixedLoad);
        LiveDashboard::new(dashboard).with_interactive(false)
    }

    #[test]
    fn test_errors_wait_for_first_tick() {
        let mut live = headless();
        live.on_error("<ERROR>| first");
        live.on_error("<ERROR>| second");

        assert!(!live.is_live());
        assert_eq!(live.pending_errors(), ["<ERROR>| first", "<ERROR>| second"]);
        assert_eq!(live.dashboard().output().errors(), 2);
    }

    #[test]
    fn test_pending_errors_flush_in_order() {
        let mut live = headless();
        live.on_error("<ERROR>| first");
        live.on_error("<ERROR>| second");

        let mut out = Vec::new();
        live.flush_errors(&mut out).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "<ERROR>| first\n<ERROR>| second\n");
        assert!(live.pending_errors().is_empty());
    }

    #[test]
    fn test_no_terminal_falls_back_to_echo() {
        let mut live = headless();
        live.on_error("<ERROR>| before");

        live.on_tick().unwrap();
        assert!(!live.is_live());
        assert!(live.pending_errors().is_empty());
        assert!(!live.abort_requested());

        live.on_error("<ERROR>| after");
        assert!(live.pending_errors().is_empty());
        assert_eq!(live.dashboard().output().errors(), 2);
        assert_eq!(live.dashboard().header().cpu().latest(), Some(42));

        live.finish().unwrap();
    }

    #[test]
    fn test_progress_reaches_output_panel() {
        let mut live = headless();
        live.on_progress(&ProgressRecord {
            tag: "LO".to_string(),
            fields: vec!["7".to_string()],
        });
        live.on_tick().unwrap();

        assert_eq!(live.dashboard().output().total(), 1);
    }
}
