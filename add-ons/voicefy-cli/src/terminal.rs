//! Character-grid surface for the visualizer.

use std::io::Write;
use voicefy_voice::Surface;

/// Logical canvas the bar layout is computed against.
const CANVAS_WIDTH: f32 = 300.0;
const CANVAS_HEIGHT: f32 = 150.0;

pub struct TerminalSurface {
    cols: usize,
    rows: usize,
    cells: Vec<char>,
    drawn: bool,
}

impl TerminalSurface {
    pub fn new(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            cells: vec![' '; cols * rows],
            drawn: false,
        }
    }

    fn col(&self, x: f32) -> usize {
        ((x / CANVAS_WIDTH) * self.cols as f32).floor().max(0.0) as usize
    }

    fn row(&self, y: f32) -> usize {
        ((y / CANVAS_HEIGHT) * self.rows as f32).floor().max(0.0) as usize
    }

    pub fn lines(&self) -> Vec<String> {
        self.cells
            .chunks(self.cols)
            .map(|row| row.iter().collect())
            .collect()
    }
}

fn glyph(value: u8) -> char {
    match value {
        0..=84 => '░',
        85..=169 => '▒',
        _ => '█',
    }
}

impl Surface for TerminalSurface {
    fn width(&self) -> f32 {
        CANVAS_WIDTH
    }

    fn height(&self) -> f32 {
        CANVAS_HEIGHT
    }

    fn clear(&mut self) {
        self.cells.fill(' ');
    }

    fn fill_bar(&mut self, x: f32, y: f32, width: f32, height: f32, value: u8) {
        let first_col = self.col(x);
        let last_col = self.col(x + width).max(first_col + 1).min(self.cols);
        let first_row = self.row(y).min(self.rows - 1);
        let last_row = self.row(y + height).max(first_row + 1).min(self.rows);
        let ch = glyph(value);
        for r in first_row..last_row {
            for c in first_col..last_col {
                self.cells[r * self.cols + c] = ch;
            }
        }
    }

    fn draw_idle_line(&mut self, y: f32) {
        let r = self.row(y).min(self.rows - 1);
        for c in 0..self.cols {
            self.cells[r * self.cols + c] = '─';
        }
    }

    fn present(&mut self) {
        let mut out = std::io::stdout().lock();
        if self.drawn {
            // redraw in place
            let _ = write!(out, "\x1b[{}A", self.rows);
        }
        for line in self.lines() {
            let _ = writeln!(out, "\r{}", line);
        }
        let _ = out.flush();
        self.drawn = true;
    }
}
