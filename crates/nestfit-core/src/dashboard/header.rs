//! Dashboard header: version, elapsed time, load gauges and build flags.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Sparkline},
    Frame,
};

use super::gauge::{format_elapsed, ElapsedTimer, LoadSource, RollingGauge, GAUGE_HISTORY};
use crate::models::Features;

pub struct DashboardHeader {
    version: String,
    timer: ElapsedTimer,
    cpu: RollingGauge,
    mem: RollingGauge,
    features: Features,
}

impl DashboardHeader {
    pub fn new(version: impl Into<String>, features: Features) -> Self {
        Self {
            version: version.into(),
            timer: ElapsedTimer::start(),
            cpu: RollingGauge::new(GAUGE_HISTORY),
            mem: RollingGauge::new(GAUGE_HISTORY),
            features,
        }
    }

    pub fn update(&mut self, load: &mut impl LoadSource) {
        self.timer.update();
        self.cpu.push(load.cpu_percent());
        self.mem.push(load.memory_percent());
    }

    pub fn cpu(&self) -> &RollingGauge {
        &self.cpu
    }

    pub fn mem(&self) -> &RollingGauge {
        &self.mem
    }

    pub fn render(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::bordered().title(" Nested Fit Dashboard ");
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let [left, right] = Layout::horizontal([Constraint::Percentage(50); 2]).areas(inner);
        let [info, gauges] = Layout::horizontal([Constraint::Percentage(50); 2]).areas(left);
        let [switches, warnings, status] =
            Layout::horizontal([Constraint::Ratio(1, 3); 3]).areas(right);

        let info_lines = vec![
            Line::from(vec![bold("Version "), Span::raw(self.version.clone())]),
            Line::from(vec![
                bold("Elapsed "),
                Span::raw(format_elapsed(self.timer.elapsed())),
            ]),
        ];
        frame.render_widget(Paragraph::new(info_lines), info);

        let [cpu_row, mem_row] = Layout::vertical([Constraint::Length(1); 2]).areas(gauges);
        render_gauge(frame, cpu_row, "CPU ", &self.cpu, Color::Cyan);
        render_gauge(frame, mem_row, "MEM ", &self.mem, Color::Magenta);

        let switch_lines = vec![
            Line::from(vec![bold("OpenMP "), yes_no(self.features.openmp)]),
            Line::from(vec![bold("OpenMPI "), yes_no(self.features.openmpi)]),
        ];
        frame.render_widget(Paragraph::new(switch_lines), switches);

        let mut warning_lines = Vec::new();
        if self.features.tracing {
            warning_lines.push(warning("⚠ Tracing on!"));
        }
        if self.features.is_debug_build() {
            warning_lines.push(warning("⚠ Debug build!"));
        }
        frame.render_widget(Paragraph::new(warning_lines), warnings);

        let status_lines = vec![
            if self.features.profiling {
                warning("⚠ Profiling on!")
            } else {
                Line::default()
            },
            Line::from(Span::styled("✓ ALL OK", Style::default().fg(Color::Green))),
        ];
        frame.render_widget(Paragraph::new(status_lines), status);
    }
}

fn render_gauge(frame: &mut Frame<'_>, area: Rect, label: &str, gauge: &RollingGauge, color: Color) {
    let [label_area, bars] =
        Layout::horizontal([Constraint::Length(4), Constraint::Length(GAUGE_HISTORY as u16)])
            .areas(area);
    frame.render_widget(Paragraph::new(Line::from(bold(label))), label_area);

    let history = gauge.history();
    let sparkline = Sparkline::default()
        .data(history.as_slice())
        .max(100)
        .style(Style::default().fg(color));
    frame.render_widget(sparkline, bars);
}

fn bold(text: &str) -> Span<'static> {
    Span::styled(
        text.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    )
}

fn yes_no(on: bool) -> Span<'static> {
    if on {
        Span::styled("YES", Style::default().fg(Color::Green))
    } else {
        Span::styled("NO", Style::default().fg(Color::Red))
    }
}

fn warning(text: &'static str) -> Line<'static> {
    Line::from(Span::styled(
        text,
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    ))
}
