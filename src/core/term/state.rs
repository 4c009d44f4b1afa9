//! Screen state
//!
//! This module defines the fixed-size cell grid, the cursor, and the
//! attributes carried by every cell.

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

/// Glyph id carried by cells written outside a NetHack tile-data tag.
pub const NO_GLYPH: u16 = u16::MAX;

/// Fixed-size screen holding all cell data
pub struct Screen {
    pub cols: u16,
    pub rows: u16,
    grid: Vec<Row>,
    cursor: Cursor,
    saved: Option<SavedCursor>,
    pub current_attrs: CellAttrs,
    /// Glyph attached to printable characters until the tag is closed
    current_glyph: u16,
    /// Scroll region (top, bottom) - 0-indexed, inclusive
    scroll_region: (u16, u16),
    auto_wrap: bool,
    /// The last column was written and the next printable character wraps
    wrap_pending: bool,
}

impl Screen {
    pub fn new(cols: u16, rows: u16) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            grid: (0..rows).map(|_| Row::new(cols)).collect(),
            cursor: Cursor::default(),
            saved: None,
            current_attrs: CellAttrs::default(),
            current_glyph: NO_GLYPH,
            scroll_region: (0, rows - 1),
            auto_wrap: true,
            wrap_pending: false,
        }
    }

    /// Full reset (RIS), keeping the geometry
    pub fn reset(&mut self) {
        *self = Self::new(self.cols, self.rows);
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        self.grid
            .get(row as usize)
            .and_then(|r| r.cells.get(col as usize))
    }

    /// Text content of every row, in order
    pub fn display(&self) -> Vec<String> {
        self.grid
            .iter()
            .map(|row| row.cells.iter().map(|c| c.ch).collect())
            .collect()
    }

    /// Copy of the cell grid together with the cursor
    pub fn to_grid(&self) -> CellGrid {
        CellGrid {
            rows: self.rows,
            cols: self.cols,
            cells: self
                .grid
                .iter()
                .flat_map(|row| row.cells.iter().copied())
                .collect(),
            cursor: self.cursor,
        }
    }

    /// Put a character at the current cursor position
    pub fn put_char(&mut self, ch: char) {
        let width = ch.width().unwrap_or(0) as u16;

        if width == 0 {
            return;
        }

        if self.wrap_pending {
            self.wrap_pending = false;
            if self.auto_wrap {
                self.cursor.col = 0;
                self.linefeed();
            }
        }

        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        let cell = Cell {
            ch,
            glyph: self.current_glyph,
            attrs: self.current_attrs,
        };
        self.grid[row].cells[col] = cell;

        // Wide characters take the following cell too (only if it fits)
        if width == 2 && col + 1 < self.cols as usize {
            self.grid[row].cells[col + 1] = Cell {
                ch: ' ',
                ..cell
            };
        }

        let next = self.cursor.col + width;
        if next >= self.cols {
            self.cursor.col = self.cols - 1;
            self.wrap_pending = true;
        } else {
            self.cursor.col = next;
        }
    }

    /// Start of a NetHack tile-data glyph tag
    pub fn start_glyph(&mut self, glyph: u16) {
        self.current_glyph = glyph;
    }

    /// End of a NetHack tile-data glyph tag
    pub fn end_glyph(&mut self) {
        self.current_glyph = NO_GLYPH;
    }

    /// Carriage return - move cursor to column 0
    pub fn carriage_return(&mut self) {
        self.cursor.col = 0;
        self.wrap_pending = false;
    }

    /// Line feed - move cursor down, scroll if needed
    pub fn linefeed(&mut self) {
        let scroll_bottom = self.scroll_region.1;
        self.wrap_pending = false;

        if self.cursor.row == scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor.row < self.rows - 1 {
            self.cursor.row += 1;
        }
    }

    /// Backspace - move cursor left
    pub fn backspace(&mut self) {
        self.wrap_pending = false;
        self.cursor.col = self.cursor.col.saturating_sub(1);
    }

    /// Horizontal tab (stops every 8 columns)
    pub fn horizontal_tab(&mut self) {
        self.wrap_pending = false;
        self.cursor.col = (((self.cursor.col / 8) + 1) * 8).min(self.cols - 1);
    }

    /// Scroll the scroll region up by n lines
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        for _ in 0..n.min(self.rows) {
            self.grid.remove(top as usize);
            self.grid.insert(bottom as usize, Row::new(self.cols));
        }
    }

    /// Scroll the scroll region down by n lines
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        for _ in 0..n.min(self.rows) {
            self.grid.remove(bottom as usize);
            self.grid.insert(top as usize, Row::new(self.cols));
        }
    }

    pub fn cursor_up(&mut self, n: u16) {
        self.wrap_pending = false;
        self.cursor.row = self.cursor.row.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        self.wrap_pending = false;
        self.cursor.row = self.cursor.row.saturating_add(n).min(self.rows - 1);
    }

    pub fn cursor_forward(&mut self, n: u16) {
        self.wrap_pending = false;
        self.cursor.col = self.cursor.col.saturating_add(n).min(self.cols - 1);
    }

    pub fn cursor_backward(&mut self, n: u16) {
        self.wrap_pending = false;
        self.cursor.col = self.cursor.col.saturating_sub(n);
    }

    /// Set cursor position (1-indexed parameters)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.wrap_pending = false;
        self.cursor.row = row.saturating_sub(1).min(self.rows - 1);
        self.cursor.col = col.saturating_sub(1).min(self.cols - 1);
    }

    /// Absolute column (1-indexed)
    pub fn set_column(&mut self, col: u16) {
        self.wrap_pending = false;
        self.cursor.col = col.saturating_sub(1).min(self.cols - 1);
    }

    /// Absolute row (1-indexed)
    pub fn set_row(&mut self, row: u16) {
        self.wrap_pending = false;
        self.cursor.row = row.saturating_sub(1).min(self.rows - 1);
    }

    /// Erase in display
    pub fn erase_in_display(&mut self, mode: u16) {
        let attrs = self.current_attrs;
        let cursor_row = self.cursor.row as usize;
        match mode {
            0 => {
                self.erase_in_line(0);
                for row in self.grid.iter_mut().skip(cursor_row + 1) {
                    row.clear(&attrs);
                }
            }
            1 => {
                for row in self.grid.iter_mut().take(cursor_row) {
                    row.clear(&attrs);
                }
                self.erase_in_line(1);
            }
            2 | 3 => {
                for row in &mut self.grid {
                    row.clear(&attrs);
                }
            }
            _ => {}
        }
    }

    /// Erase in line
    pub fn erase_in_line(&mut self, mode: u16) {
        let attrs = self.current_attrs;
        let col = self.cursor.col as usize;
        let row = &mut self.grid[self.cursor.row as usize];

        match mode {
            0 => row.cells[col..].iter_mut().for_each(|c| c.clear(&attrs)),
            1 => row.cells[..=col].iter_mut().for_each(|c| c.clear(&attrs)),
            2 => row.clear(&attrs),
            _ => {}
        }
    }

    /// Insert blank cells at the cursor, shifting the rest of the line right
    pub fn insert_chars(&mut self, n: u16) {
        let col = self.cursor.col as usize;
        let cells = &mut self.grid[self.cursor.row as usize].cells;
        for _ in 0..(n as usize).min(cells.len() - col) {
            cells.pop();
            cells.insert(col, Cell::default());
        }
    }

    /// Delete cells at the cursor, shifting the rest of the line left
    pub fn delete_chars(&mut self, n: u16) {
        let col = self.cursor.col as usize;
        let cells = &mut self.grid[self.cursor.row as usize].cells;
        for _ in 0..(n as usize).min(cells.len() - col) {
            cells.remove(col);
            cells.push(Cell::default());
        }
    }

    /// Blank n cells starting at the cursor without moving anything
    pub fn erase_chars(&mut self, n: u16) {
        let attrs = self.current_attrs;
        let col = self.cursor.col as usize;
        let cells = &mut self.grid[self.cursor.row as usize].cells;
        for cell in cells.iter_mut().skip(col).take(n as usize) {
            cell.clear(&attrs);
        }
    }

    /// Insert lines at cursor position
    pub fn insert_lines(&mut self, n: u16) {
        let row = self.cursor.row as usize;
        for _ in 0..n.min(self.rows) {
            self.grid.insert(row, Row::new(self.cols));
            self.grid.pop();
        }
    }

    /// Delete lines at cursor position
    pub fn delete_lines(&mut self, n: u16) {
        let row = self.cursor.row as usize;
        for _ in 0..n.min(self.rows) {
            self.grid.remove(row);
            self.grid.push(Row::new(self.cols));
        }
    }

    /// Set scroll region (1-indexed, inclusive)
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let top = top.saturating_sub(1).min(self.rows - 1);
        let bottom = bottom.saturating_sub(1).min(self.rows - 1);
        if top < bottom {
            self.scroll_region = (top, bottom);
        }
    }

    pub fn save_cursor(&mut self) {
        self.saved = Some(SavedCursor {
            cursor: self.cursor,
            attrs: self.current_attrs,
        });
    }

    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.saved {
            self.cursor = saved.cursor;
            self.current_attrs = saved.attrs;
            self.wrap_pending = false;
        }
    }

    /// Set private mode. Only auto-wrap changes how cells are written.
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        if mode == 7 {
            self.auto_wrap = enable;
        }
    }

    /// Reverse index - cursor up, scroll if at top
    pub fn reverse_index(&mut self) {
        if self.cursor.row == self.scroll_region.0 {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    /// Index - cursor down, scroll if at bottom
    pub fn index(&mut self) {
        self.linefeed();
    }
}

/// Cursor position, 0-indexed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub col: u16,
    pub row: u16,
}

#[derive(Clone, Copy)]
struct SavedCursor {
    cursor: Cursor,
    attrs: CellAttrs,
}

/// A single row
struct Row {
    cells: Vec<Cell>,
}

impl Row {
    fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
        }
    }

    fn clear(&mut self, attrs: &CellAttrs) {
        for cell in &mut self.cells {
            cell.clear(attrs);
        }
    }
}

/// A single cell
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cell {
    pub ch: char,
    pub glyph: u16,
    pub attrs: CellAttrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            glyph: NO_GLYPH,
            attrs: CellAttrs::default(),
        }
    }
}

impl Cell {
    pub fn clear(&mut self, attrs: &CellAttrs) {
        self.ch = ' ';
        self.glyph = NO_GLYPH;
        self.attrs = *attrs;
    }
}

/// Row-major snapshot of the screen cells plus the cursor
#[derive(Clone, Debug, PartialEq)]
pub struct CellGrid {
    pub rows: u16,
    pub cols: u16,
    pub cells: Vec<Cell>,
    pub cursor: Cursor,
}

impl CellGrid {
    pub fn get(&self, row: u16, col: u16) -> Option<&Cell> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row as usize * self.cols as usize + col as usize)
    }
}

/// Cell attributes
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CellAttrs {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl CellAttrs {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const DIM           = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const UNDERLINE     = 0b0000_0000_1000;
        const BLINK         = 0b0000_0001_0000;
        const INVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
    }
}
