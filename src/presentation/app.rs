//! Interactive scatter explorer.
//!
//! Holds the per-metric control state and draws it. All data comes from an
//! `AnalysisSnapshot` computed beforehand; key presses only move range
//! handles and the highlighted point.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph, Tabs},
    Frame,
};
use tracing::debug;

use super::range::RangeSelector;
use crate::analysis::{LabeledPoint, MetricView};
use crate::data::Metric;
use crate::pipeline::AnalysisSnapshot;

const ACCENT: Color = Color::Cyan;
const HIGHLIGHT: Color = Color::Yellow;
const TEXT_DIM: Color = Color::DarkGray;

/// Which end of which axis the arrow keys move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    XMin,
    XMax,
    YMin,
    YMax,
}

impl Handle {
    const ALL: [Handle; 4] = [Handle::XMin, Handle::XMax, Handle::YMin, Handle::YMax];

    fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|h| *h == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|h| *h == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Control state for one metric panel.
#[derive(Debug, Clone)]
pub struct PanelState {
    pub metric: Metric,
    pub x_range: Option<RangeSelector>,
    pub y_range: Option<RangeSelector>,
    pub handle: Handle,
    pub highlighted: usize,
}

impl PanelState {
    pub fn new(view: &MetricView) -> Self {
        let build = |extent| match RangeSelector::for_series(view.metric, extent) {
            Ok(range) => Some(range),
            Err(err) => {
                debug!(error = %err, "Panel will render empty");
                None
            }
        };

        Self {
            metric: view.metric,
            x_range: build(view.x_extent()),
            y_range: build(view.y_extent()),
            handle: Handle::XMin,
            highlighted: 0,
        }
    }

    /// Points of `view` inside both current selections.
    pub fn visible<'a>(&self, view: &'a MetricView) -> Vec<&'a LabeledPoint> {
        let (Some(xr), Some(yr)) = (&self.x_range, &self.y_range) else {
            return Vec::new();
        };
        view.points
            .iter()
            .filter(|p| xr.contains(p.x) && yr.contains(p.y))
            .collect()
    }

    pub fn nudge(&mut self, steps: i32) {
        let range = match self.handle {
            Handle::XMin | Handle::XMax => self.x_range.as_mut(),
            Handle::YMin | Handle::YMax => self.y_range.as_mut(),
        };
        let Some(range) = range else {
            return;
        };
        match self.handle {
            Handle::XMin | Handle::YMin => range.move_lower(steps),
            Handle::XMax | Handle::YMax => range.move_upper(steps),
        }
    }

    pub fn reset(&mut self) {
        if let Some(r) = self.x_range.as_mut() {
            r.reset();
        }
        if let Some(r) = self.y_range.as_mut() {
            r.reset();
        }
        self.highlighted = 0;
    }

    fn cycle_highlight(&mut self, forward: bool, visible: usize) {
        if visible == 0 {
            self.highlighted = 0;
            return;
        }
        let current = self.highlighted.min(visible - 1);
        self.highlighted = if forward {
            (current + 1) % visible
        } else {
            (current + visible - 1) % visible
        };
    }
}

pub struct ExplorerApp<'a> {
    pub running: bool,
    pub current: usize,
    pub panels: Vec<PanelState>,
    snapshot: &'a AnalysisSnapshot,
}

impl<'a> ExplorerApp<'a> {
    pub fn new(snapshot: &'a AnalysisSnapshot) -> Self {
        Self {
            running: true,
            current: 0,
            panels: snapshot.views.iter().map(PanelState::new).collect(),
            snapshot,
        }
    }

    fn current_view(&self) -> &'a MetricView {
        &self.snapshot.views[self.current]
    }

    pub fn visible_count(&self) -> usize {
        self.panels[self.current].visible(self.current_view()).len()
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.panels.is_empty() {
            self.running = false;
            return;
        }
        let stride = if key.modifiers.contains(KeyModifiers::SHIFT) {
            10
        } else {
            1
        };

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.running = false,
            KeyCode::Tab => self.current = (self.current + 1) % self.panels.len(),
            KeyCode::BackTab => {
                self.current = (self.current + self.panels.len() - 1) % self.panels.len()
            }
            KeyCode::Char(c @ '1'..='9') => {
                let idx = c as usize - '1' as usize;
                if idx < self.panels.len() {
                    self.current = idx;
                }
            }
            KeyCode::Up => {
                let panel = &mut self.panels[self.current];
                panel.handle = panel.handle.prev();
            }
            KeyCode::Down => {
                let panel = &mut self.panels[self.current];
                panel.handle = panel.handle.next();
            }
            KeyCode::Left => self.panels[self.current].nudge(-stride),
            KeyCode::Right => self.panels[self.current].nudge(stride),
            KeyCode::Char('r') => self.panels[self.current].reset(),
            KeyCode::Char('n') => {
                let visible = self.visible_count();
                self.panels[self.current].cycle_highlight(true, visible);
            }
            KeyCode::Char('p') => {
                let visible = self.visible_count();
                self.panels[self.current].cycle_highlight(false, visible);
            }
            _ => {}
        }
    }

    pub fn render(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(6),
                Constraint::Length(1),
            ])
            .split(frame.size());

        self.render_tabs(frame, chunks[0]);
        if self.panels.is_empty() {
            return;
        }

        let view = self.current_view();
        let panel = &self.panels[self.current];
        let visible = panel.visible(view);

        match (&panel.x_range, &panel.y_range) {
            (Some(xr), Some(yr)) => {
                render_chart(frame, chunks[1], view.metric, &visible, panel.highlighted, xr, yr);
                render_controls(frame, chunks[2], panel, &visible, view.points.len());
            }
            _ => render_empty(frame, chunks[1].union(chunks[2]), view.metric),
        }

        let help = Paragraph::new(Line::from(vec![Span::styled(
            " Tab/1-3 metric  ↑↓ handle  ←→ move (Shift ×10)  n/p point  r reset  q quit",
            Style::default().fg(TEXT_DIM),
        )]));
        frame.render_widget(help, chunks[3]);
    }

    fn render_tabs(&self, frame: &mut Frame, area: Rect) {
        let titles: Vec<Line> = self
            .snapshot
            .views
            .iter()
            .map(|v| Line::from(format!(" {} ({}) ", v.metric.title(), v.points.len())))
            .collect();

        let tabs = Tabs::new(titles)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" CEDEAR Analysis "),
            )
            .select(self.current)
            .style(Style::default().fg(TEXT_DIM))
            .highlight_style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD));

        frame.render_widget(tabs, area);
    }
}

/// Axis bounds for a selection; a zero-width selection is padded so the chart can draw it.
fn axis_bounds(range: &RangeSelector) -> [f64; 2] {
    let (lo, hi) = range.selection();
    if hi > lo {
        [lo, hi]
    } else {
        let pad = (lo.abs() * 0.01).max(1e-9);
        [lo - pad, hi + pad]
    }
}

fn axis_labels(bounds: [f64; 2]) -> Vec<Span<'static>> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|v| Span::raw(format_value(*v)))
        .collect()
}

fn format_value(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1_000_000.0 {
        format!("{:.2}M", value / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("{:.1}", value)
    } else if magnitude >= 1.0 {
        format!("{:.3}", value)
    } else {
        format!("{:.5}", value)
    }
}

fn render_chart(
    frame: &mut Frame,
    area: Rect,
    metric: Metric,
    visible: &[&LabeledPoint],
    highlighted: usize,
    x_range: &RangeSelector,
    y_range: &RangeSelector,
) {
    let data: Vec<(f64, f64)> = visible.iter().map(|p| (p.x, p.y)).collect();
    let focus: Vec<(f64, f64)> = visible
        .get(highlighted.min(visible.len().saturating_sub(1)))
        .map(|p| vec![(p.x, p.y)])
        .unwrap_or_default();

    let datasets = vec![
        Dataset::default()
            .name(metric.short_name())
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(ACCENT))
            .data(&data),
        Dataset::default()
            .marker(symbols::Marker::Block)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(HIGHLIGHT))
            .data(&focus),
    ];

    let x_bounds = axis_bounds(x_range);
    let y_bounds = axis_bounds(y_range);

    let chart = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", metric.title())),
        )
        .x_axis(
            Axis::default()
                .title(format!("X_{}", metric.short_name()))
                .style(Style::default().fg(TEXT_DIM))
                .bounds(x_bounds)
                .labels(axis_labels(x_bounds)),
        )
        .y_axis(
            Axis::default()
                .title(format!("Y_{}", metric.short_name()))
                .style(Style::default().fg(TEXT_DIM))
                .bounds(y_bounds)
                .labels(axis_labels(y_bounds)),
        );

    frame.render_widget(chart, area);
}

fn render_controls(
    frame: &mut Frame,
    area: Rect,
    panel: &PanelState,
    visible: &[&LabeledPoint],
    total: usize,
) {
    let handle_span = |handle: Handle, value: f64| {
        let style = if panel.handle == handle {
            Style::default().fg(HIGHLIGHT).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        Span::styled(format!("[{}]", format_value(value)), style)
    };

    let mut lines = Vec::new();
    for (name, range, low, high) in [
        ("X", &panel.x_range, Handle::XMin, Handle::XMax),
        ("Y", &panel.y_range, Handle::YMin, Handle::YMax),
    ] {
        if let Some(range) = range {
            let (lo, hi) = range.selection();
            let domain = range.domain();
            lines.push(Line::from(vec![
                Span::raw(format!("Filter {name} values ({}): ", panel.metric.short_name())),
                handle_span(low, lo),
                Span::raw(" – "),
                handle_span(high, hi),
                Span::styled(
                    if range.is_full() {
                        "  full domain".to_string()
                    } else {
                        format!(
                            "  domain {} – {}",
                            format_value(domain.min),
                            format_value(domain.max)
                        )
                    },
                    Style::default().fg(TEXT_DIM),
                ),
            ]));
        }
    }

    lines.push(Line::from(format!("Showing {} of {} rows", visible.len(), total)));
    match visible.get(panel.highlighted.min(visible.len().saturating_sub(1))) {
        Some(point) => lines.push(Line::from(vec![
            Span::styled(
                point.label.clone(),
                Style::default().fg(HIGHLIGHT).add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                "  x = {}  y = {}",
                format_value(point.x),
                format_value(point.y)
            )),
        ])),
        None => lines.push(Line::from(Span::styled(
            "No rows inside the selected ranges",
            Style::default().fg(TEXT_DIM),
        ))),
    }

    let controls = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
    frame.render_widget(controls, area);
}

fn render_empty(frame: &mut Frame, area: Rect, metric: Metric) {
    let message = Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(
            format!("No rows survived filtering for {}", metric.title()),
            Style::default().fg(TEXT_DIM),
        )),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", metric.title())),
    );
    frame.render_widget(message, area);
}
