// Terminal plot of position against time, one screen per controller

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyEventKind},
    execute, queue,
    style::Print,
    terminal::{self, Clear, ClearType, disable_raw_mode, enable_raw_mode},
};
use std::io::{self, Write};
use tracing::info;

use super::collector::Trace;
use crate::config::PLOT_HEADROOM;

const X_LABEL: &str = "Time (S)";
const Y_LABEL: &str = "Position (Rotations)";
const MARGIN: usize = 9;

/// Axis limits: [min x, max x] and [min y, max y + headroom]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

pub fn axis_bounds(trace: &Trace) -> Option<Bounds> {
    if trace.is_empty() {
        return None;
    }
    let min = |v: &[f64]| v.iter().copied().fold(f64::INFINITY, f64::min);
    let max = |v: &[f64]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(Bounds {
        x_min: min(&trace.seconds),
        x_max: max(&trace.seconds),
        y_min: min(&trace.rotations),
        y_max: max(&trace.rotations) + PLOT_HEADROOM,
    })
}

/// Lay a trace out as text rows fitting `width` x `height` cells
pub fn render(trace: &Trace, width: u16, height: u16) -> Vec<String> {
    let title = format!("Controller {}", trace.controller);
    let Some(bounds) = axis_bounds(trace) else {
        return vec![title, "no samples received".to_string()];
    };

    // title, y label, plot rows, x axis, x tick labels, x label
    let cols = usize::from(width).saturating_sub(MARGIN + 1).max(10);
    let rows = usize::from(height).saturating_sub(5).max(4);

    let x_span = (bounds.x_max - bounds.x_min).max(f64::EPSILON);
    let y_span = (bounds.y_max - bounds.y_min).max(f64::EPSILON);

    let mut grid = vec![vec![' '; cols]; rows];
    for (&x, &y) in trace.seconds.iter().zip(&trace.rotations) {
        let col = ((x - bounds.x_min) / x_span * (cols - 1) as f64).round() as usize;
        let row = ((bounds.y_max - y) / y_span * (rows - 1) as f64).round() as usize;
        grid[row.min(rows - 1)][col.min(cols - 1)] = '*';
    }

    let mut lines = Vec::with_capacity(rows + 5);
    lines.push(format!("{:^w$}", title, w = cols + MARGIN));
    lines.push(Y_LABEL.to_string());
    for (r, cells) in grid.iter().enumerate() {
        let label = if r == 0 {
            format!("{:>8.2}", bounds.y_max)
        } else if r == rows - 1 {
            format!("{:>8.2}", bounds.y_min)
        } else {
            " ".repeat(MARGIN - 1)
        };
        lines.push(format!("{}|{}", label, cells.iter().collect::<String>()));
    }
    lines.push(format!("{}+{}", " ".repeat(MARGIN - 1), "-".repeat(cols)));

    let left = format!("{:.2}", bounds.x_min);
    let right = format!("{:.2}", bounds.x_max);
    let gap = cols.saturating_sub(left.len() + right.len());
    lines.push(format!("{}{}{}{}", " ".repeat(MARGIN), left, " ".repeat(gap), right));
    lines.push(format!("{}{:^w$}", " ".repeat(MARGIN), X_LABEL, w = cols));
    lines
}

/// Show each trace full screen, waiting for a key press between them
pub fn show(traces: &[Trace]) -> io::Result<()> {
    let mut out = io::stdout();

    for (i, trace) in traces.iter().enumerate() {
        info!(
            "Plotting controller {} ({} samples)",
            trace.controller,
            trace.len()
        );
        let (width, height) = terminal::size().unwrap_or((80, 24));
        let lines = render(trace, width, height.saturating_sub(1));
        let hint = if i + 1 < traces.len() {
            "Press any key for the next plot"
        } else {
            "Press any key to exit"
        };

        enable_raw_mode()?;
        let shown = draw(&mut out, &lines, hint, height).and_then(|_| wait_for_key());
        disable_raw_mode()?;
        shown?;
    }

    execute!(out, Clear(ClearType::All), MoveTo(0, 0), Show)
}

fn draw(out: &mut impl Write, lines: &[String], hint: &str, height: u16) -> io::Result<()> {
    queue!(out, Hide, Clear(ClearType::All))?;
    for (row, line) in lines.iter().enumerate() {
        queue!(out, MoveTo(0, row as u16), Print(line))?;
    }
    queue!(out, MoveTo(0, height.saturating_sub(1)), Print(hint))?;
    out.flush()
}

fn wait_for_key() -> io::Result<()> {
    loop {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                return Ok(());
            }
        }
    }
}
