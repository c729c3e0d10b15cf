//! Frame renderer
//!
//! Computes the wrapped visual rows for the prompt, the edit buffer and
//! any completion menu or search line, then diffs them against the
//! previously drawn frame and emits only the cursor motion and line
//! rewrites needed for the rows that changed. There is never a
//! full-screen clear.
//!
//! Layout is done on plain characters with their display widths (wide
//! glyphs count two columns, combining marks zero); styling is applied
//! per span afterwards so escape bytes never confuse the wrap math.

use std::ops::Range;

use unicode_width::UnicodeWidthChar;

use crate::buffer::EditBuffer;
use crate::complete::Completion;
use crate::config::{Color, EditorConfig};
use crate::term::{Result, Terminal};

/// Maximum completion menu rows shown below the input
const MENU_ROWS: usize = 10;

/// The prompt for one session.
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub text: String,
    pub marker: String,
    pub color: Color,
}

/// Completion menu to draw under the input.
pub struct MenuView<'a> {
    pub candidates: &'a [Completion],
    pub selected: Option<usize>,
}

/// History-search line to draw under the input.
pub struct SearchView<'a> {
    pub query: &'a str,
    /// Current hit and the highlighted span within it
    pub hit: Option<(&'a str, Range<usize>)>,
}

/// Everything needed to draw one frame.
pub struct Frame<'a> {
    pub prompt: &'a PromptSpec,
    pub buffer: &'a EditBuffer,
    /// Dimmed inline completion preview at the cursor
    pub preview: Option<&'a str>,
    pub menu: Option<MenuView<'a>>,
    pub search: Option<SearchView<'a>>,
    pub config: &'a EditorConfig,
    /// Styling off entirely (config or capability)
    pub color_enabled: bool,
}

/// A run of characters with one style
#[derive(Debug, Clone, PartialEq, Eq)]
struct Span {
    text: String,
    sgr: Option<u8>,
}

/// One character queued for wrapping
#[derive(Debug, Clone, Copy)]
struct Cell {
    c: char,
    sgr: Option<u8>,
    /// True for the cell the cursor sits before
    cursor: bool,
}

pub struct Renderer {
    width: u16,
    /// Styled rows as last written
    prev_rows: Vec<String>,
    /// Frame row the terminal cursor currently sits on
    cursor_row: usize,
    /// Physical rows our frame has created on screen
    rows_on_screen: usize,
}

impl Renderer {
    pub fn new(width: u16) -> Self {
        Self {
            width: width.max(2),
            prev_rows: Vec::new(),
            cursor_row: 0,
            rows_on_screen: 1,
        }
    }

    /// Draw `frame`, rewriting only rows that changed since last time.
    pub fn redraw(&mut self, term: &mut Terminal, frame: &Frame) -> Result<()> {
        let (width, _) = term.extent();
        if width != self.width {
            // Size changed: relayout and rewrite everything
            self.width = width.max(2);
            self.invalidate();
        }
        let (rows, cursor) = build_rows(frame, self.width as usize);
        let ops = self.diff_ops(&rows, cursor);
        self.prev_rows = rows;
        term.write(&ops);
        term.flush()
    }

    /// Force the next redraw to rewrite every row (Ctrl-L).
    pub fn invalidate(&mut self) {
        for row in &mut self.prev_rows {
            row.clear();
            row.push('\0');
        }
    }

    /// Move below the frame and return to column 0, ending the session.
    pub fn finish(&mut self, term: &mut Terminal) -> Result<()> {
        let mut ops = String::new();
        let last = self.rows_on_screen.saturating_sub(1);
        self.move_to_row(&mut ops, last);
        ops.push_str("\r\n");
        term.write(&ops);
        term.flush()
    }

    /// Escape output for transitioning from the previous frame to `rows`.
    fn diff_ops(&mut self, rows: &[String], cursor: (usize, usize)) -> String {
        let mut ops = String::new();
        let total = rows.len().max(self.prev_rows.len());
        for r in 0..total {
            let new = rows.get(r).map(String::as_str).unwrap_or("");
            let old = self.prev_rows.get(r).map(String::as_str).unwrap_or("");
            if new == old {
                continue;
            }
            self.move_to_row(&mut ops, r);
            ops.push_str("\r\x1b[2K");
            ops.push_str(new);
        }
        let (crow, ccol) = cursor;
        self.move_to_row(&mut ops, crow);
        ops.push('\r');
        if ccol > 0 {
            ops.push_str(&format!("\x1b[{}C", ccol));
        }
        ops
    }

    fn move_to_row(&mut self, ops: &mut String, target: usize) {
        if target < self.cursor_row {
            ops.push_str(&format!("\x1b[{}A", self.cursor_row - target));
        } else if target > self.cursor_row {
            let existing = self.rows_on_screen.saturating_sub(1);
            let by_move = target.min(existing);
            if by_move > self.cursor_row {
                ops.push_str(&format!("\x1b[{}B", by_move - self.cursor_row));
            }
            // Rows past the bottom of the frame are created by newlines
            for _ in existing..target {
                ops.push_str("\r\n");
            }
            self.rows_on_screen = self.rows_on_screen.max(target + 1);
        }
        self.cursor_row = target;
    }
}

/// Lay out the frame into styled rows plus the cursor position.
fn build_rows(frame: &Frame, width: usize) -> (Vec<String>, (usize, usize)) {
    let paint = |color: Color| -> Option<u8> {
        if frame.color_enabled {
            color.sgr()
        } else {
            None
        }
    };
    let prompt_sgr = paint(frame.prompt.color);
    let info_sgr = paint(frame.config.info_color);
    let diminish_sgr = paint(frame.config.diminish_color);
    let highlight_sgr = paint(frame.config.highlight_color);

    let head = format!("{}{}", frame.prompt.text, frame.prompt.marker);
    let head_width: usize = head.chars().map(|c| c.width().unwrap_or(0)).sum();
    let marker_width: usize = frame
        .prompt
        .marker
        .chars()
        .map(|c| c.width().unwrap_or(0))
        .sum();

    let mut rows: Vec<Vec<Span>> = Vec::new();
    let mut cursor = (0usize, 0usize);
    let (cur_line, cur_col) = frame.buffer.cursor();

    for line_idx in 0..frame.buffer.line_count() {
        let mut cells: Vec<Cell> = Vec::new();
        if line_idx == 0 {
            push_str_cells(&mut cells, &head, prompt_sgr);
        } else {
            // Continuation prompt: pad to the prompt width, then the marker
            let pad = head_width.saturating_sub(marker_width);
            push_str_cells(&mut cells, &" ".repeat(pad), None);
            push_str_cells(&mut cells, &frame.prompt.marker, prompt_sgr);
        }
        let line = frame.buffer.line(line_idx);
        for (i, c) in line.char_indices() {
            if line_idx == cur_line && i == cur_col {
                // Zero-width marker so the preview lands after the cursor
                cells.push(Cell {
                    c: '\0',
                    sgr: None,
                    cursor: true,
                });
                if let Some(preview) = frame.preview {
                    push_str_cells(&mut cells, preview, diminish_sgr);
                }
            }
            cells.push(Cell {
                c,
                sgr: None,
                cursor: false,
            });
        }
        if line_idx == cur_line && cur_col == line.len() {
            // Cursor past the last character
            cells.push(Cell {
                c: '\0',
                sgr: None,
                cursor: true,
            });
            if let Some(preview) = frame.preview {
                push_str_cells(&mut cells, preview, diminish_sgr);
            }
        }
        let base_row = rows.len();
        let cursor_pos = wrap_cells(&mut rows, cells, width);
        if let Some((r, c)) = cursor_pos {
            cursor = (base_row + r, c);
        }
    }

    if let Some(ref menu) = frame.menu {
        for (i, cand) in menu.candidates.iter().take(MENU_ROWS).enumerate() {
            let mut cells = Vec::new();
            push_str_cells(&mut cells, &format!("{:>2} ", i + 1), info_sgr);
            let sgr = if menu.selected == Some(i) {
                highlight_sgr
            } else {
                None
            };
            push_str_cells(&mut cells, &cand.display, sgr);
            truncate_cells(&mut cells, width);
            rows.push(cells_to_spans(&cells));
        }
        if menu.candidates.len() > MENU_ROWS {
            let mut cells = Vec::new();
            push_str_cells(
                &mut cells,
                &format!("   ... and {} more", menu.candidates.len() - MENU_ROWS),
                info_sgr,
            );
            rows.push(cells_to_spans(&cells));
        }
    }

    if let Some(ref search) = frame.search {
        let mut cells = Vec::new();
        push_str_cells(&mut cells, "history-search", info_sgr);
        push_str_cells(&mut cells, &format!(" '{}': ", search.query), None);
        let mut ccol = cells.iter().map(|c| c.c.width().unwrap_or(0)).sum::<usize>();
        match search.hit {
            Some((entry, ref span)) => {
                let line = entry.split('\n').next().unwrap_or(entry);
                let span = span.start.min(line.len())..span.end.min(line.len());
                push_str_cells(&mut cells, &line[..span.start], diminish_sgr);
                push_str_cells(&mut cells, &line[span.clone()], highlight_sgr);
                push_str_cells(&mut cells, &line[span.end..], diminish_sgr);
            }
            None => {
                push_str_cells(&mut cells, "(no match)", diminish_sgr);
            }
        }
        truncate_cells(&mut cells, width);
        ccol = ccol.min(width.saturating_sub(1));
        cursor = (rows.len(), ccol);
        rows.push(cells_to_spans(&cells));
    }

    let styled = rows.iter().map(|spans| spans_to_string(spans)).collect();
    (styled, cursor)
}

fn push_str_cells(cells: &mut Vec<Cell>, text: &str, sgr: Option<u8>) {
    for c in text.chars() {
        cells.push(Cell {
            c,
            sgr,
            cursor: false,
        });
    }
}

/// Wrap one logical line of cells into visual rows of at most `width`
/// columns, never splitting a wide glyph across the edge. Returns the
/// visual position of the cursor cell if present.
fn wrap_cells(rows: &mut Vec<Vec<Span>>, cells: Vec<Cell>, width: usize) -> Option<(usize, usize)> {
    let mut cursor = None;
    let mut row: Vec<Cell> = Vec::new();
    let mut col = 0usize;
    let mut row_idx = 0usize;
    let mut flush =
        |rows: &mut Vec<Vec<Span>>, row: &mut Vec<Cell>| rows.push(cells_to_spans(row));
    for cell in cells {
        let w = if cell.c == '\0' {
            0
        } else {
            cell.c.width().unwrap_or(0)
        };
        if col + w > width || (cell.cursor && col >= width) {
            flush(rows, &mut row);
            row.clear();
            row_idx += 1;
            col = 0;
        }
        if cell.cursor {
            cursor = Some((row_idx, col));
        }
        if cell.c != '\0' {
            row.push(cell);
            col += w;
        }
    }
    flush(rows, &mut row);
    cursor
}

fn truncate_cells(cells: &mut Vec<Cell>, width: usize) {
    let mut col = 0;
    for (i, cell) in cells.iter().enumerate() {
        col += cell.c.width().unwrap_or(0);
        if col > width {
            cells.truncate(i);
            return;
        }
    }
}

fn cells_to_spans(cells: &[Cell]) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    for cell in cells {
        if cell.c == '\0' {
            continue;
        }
        match spans.last_mut() {
            Some(last) if last.sgr == cell.sgr => last.text.push(cell.c),
            _ => spans.push(Span {
                text: cell.c.to_string(),
                sgr: cell.sgr,
            }),
        }
    }
    spans
}

fn spans_to_string(spans: &[Span]) -> String {
    let mut out = String::new();
    for span in spans {
        match span.sgr {
            Some(code) => {
                out.push_str(&format!("\x1b[{}m", code));
                out.push_str(&span.text);
                out.push_str("\x1b[0m");
            }
            None => out.push_str(&span.text),
        }
    }
    out
}
