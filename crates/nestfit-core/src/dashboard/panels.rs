//! Body panels: what went in, what is coming out.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Wrap},
    Frame,
};

use crate::models::FitConfiguration;
use crate::parser::ProgressRecord;

/// Progress records kept for display.
const OUTPUT_BACKLOG: usize = 200;

/// Summary of the run's input, fixed for the whole run.
#[derive(Debug, Clone, Default)]
pub struct InputInfo {
    rows: Vec<(String, String)>,
}

impl InputInfo {
    pub fn from_config(config: &FitConfiguration) -> Self {
        let mut rows = Vec::new();
        let files = config
            .datafiles
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        rows.push(("Data".to_string(), files));
        rows.push(("Layout".to_string(), config.specstr.clone()));
        for (key, expr) in &config.function.expressions {
            rows.push((key.clone(), expr.clone()));
        }
        for (key, extents) in &config.data {
            rows.push((key.clone(), format!("x ∈ [{}, {}]", extents.xmin, extents.xmax)));
        }
        rows.push((
            "Search".to_string(),
            format!(
                "{} ({} live points)",
                config.search.method, config.search.livepoints
            ),
        ));
        rows.push((
            "Convergence".to_string(),
            format!(
                "{} {:e}",
                config.convergence.method, config.convergence.accuracy
            ),
        ));
        rows.push((
            "Clustering".to_string(),
            if config.clustering.enabled {
                config.clustering.method.clone()
            } else {
                "off".to_string()
            },
        ));
        rows.push(("Likelihood".to_string(), config.likelihood.clone()));

        let started: DateTime<Local> = Local::now();
        rows.push((
            "Started".to_string(),
            started.format("%Y-%m-%d %H:%M:%S").to_string(),
        ));
        Self { rows }
    }

    pub fn rows(&self) -> &[(String, String)] {
        &self.rows
    }

    pub fn render(&self, frame: &mut Frame<'_>, area: Rect) {
        let lines: Vec<Line> = self
            .rows
            .iter()
            .map(|(k, v)| {
                Line::from(vec![
                    Span::styled(
                        format!("{k}: "),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(v.clone()),
                ])
            })
            .collect();
        let panel = Paragraph::new(lines)
            .block(Block::bordered().title(" Input Info "))
            .wrap(Wrap { trim: true });
        frame.render_widget(panel, area);
    }
}

/// Live progress records, newest last.
#[derive(Debug, Clone, Default)]
pub struct OutputInfo {
    records: VecDeque<ProgressRecord>,
    total: usize,
    errors: usize,
}

impl OutputInfo {
    pub fn push(&mut self, record: ProgressRecord) {
        if self.records.len() == OUTPUT_BACKLOG {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.total += 1;
    }

    pub fn note_error(&mut self) {
        self.errors += 1;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn render(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::bordered().title(" Output Info ");
        let visible = block.inner(area).height.saturating_sub(1) as usize;

        let mut lines = vec![Line::from(vec![
            Span::styled("Records ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(self.total.to_string()),
            Span::raw("  "),
            Span::styled("Errors ", Style::default().add_modifier(Modifier::BOLD)),
            Span::styled(
                self.errors.to_string(),
                if self.errors > 0 {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default()
                },
            ),
        ])];

        let skip = self.records.len().saturating_sub(visible);
        lines.extend(
            self.records
                .iter()
                .skip(skip)
                .map(|r| Line::from(r.fields.join(" │ "))),
        );

        frame.render_widget(Paragraph::new(lines).block(block), area);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_backlog_is_bounded() {
        let mut output = OutputInfo::default();
        for i in 0..(OUTPUT_BACKLOG + 10) {
            output.push(ProgressRecord {
                tag: "LO".to_string(),
                fields: vec![i.to_string()],
            });
        }
        assert_eq!(output.total(), OUTPUT_BACKLOG + 10);
        assert_eq!(output.records.len(), OUTPUT_BACKLOG);
        assert_eq!(output.records.front().unwrap().fields[0], "10");
    }
}
