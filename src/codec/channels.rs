//! Channel grid encoding
//!
//! Each cell of the screen becomes three floats, one per glyph family:
//! creatures, terrain and objects. A cell's glyph lands in the channel whose
//! range contains it and leaves the other two at zero.

use serde::{Deserialize, Serialize};

use crate::core::term::CellGrid;

pub const CHANNELS: usize = 3;

/// Inclusive range of glyph codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphRange {
    pub min: u16,
    pub max: u16,
}

impl GlyphRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, code: u16) -> bool {
        self.min <= code && code <= self.max
    }

    /// Rescale `code` into `[skew, 1.0]`.
    ///
    /// The range minimum maps to 0.0 so that "nothing here" stays zero;
    /// codes outside the range saturate to the minimum as well.
    pub fn normalize(&self, code: u16, skew: f32) -> f32 {
        if !self.contains(code) || self.max == self.min {
            return 0.0;
        }
        let v = f32::from(code - self.min) / f32::from(self.max - self.min);
        if v > 0.0 {
            v * (1.0 - skew) + skew
        } else {
            0.0
        }
    }
}

/// Glyph families and the floor applied to in-range codes
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlyphLayout {
    pub creatures: GlyphRange,
    pub terrain: GlyphRange,
    pub objects: GlyphRange,
    pub skew: f32,
}

impl Default for GlyphLayout {
    fn default() -> Self {
        Self {
            creatures: GlyphRange::new(0, 380),
            objects: GlyphRange::new(381, 828),
            terrain: GlyphRange::new(829, 1011),
            skew: 0.2,
        }
    }
}

impl GlyphLayout {
    fn encode(&self, code: u16) -> [f32; CHANNELS] {
        [
            self.creatures.normalize(code, self.skew),
            self.terrain.normalize(code, self.skew),
            self.objects.normalize(code, self.skew),
        ]
    }
}

/// `rows x cols x 3`, row-major
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelGrid {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<[f32; CHANNELS]>,
}

impl ChannelGrid {
    pub fn get(&self, row: usize, col: usize) -> Option<[f32; CHANNELS]> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col).copied()
        } else {
            None
        }
    }

    /// Flat `[row][col][channel]` buffer
    pub fn flatten(&self) -> Vec<f32> {
        self.data.iter().flat_map(|c| c.iter().copied()).collect()
    }
}

/// Encode a cell grid. The cursor cell is marked `(1, 1, 1)`.
pub fn to_channel_grid(grid: &CellGrid, layout: &GlyphLayout) -> ChannelGrid {
    let mut data: Vec<[f32; CHANNELS]> = grid.cells.iter().map(|cell| layout.encode(cell.glyph)).collect();

    let (rows, cols) = (grid.rows as usize, grid.cols as usize);
    let cursor = grid.cursor;
    if cursor.row < grid.rows && cursor.col < grid.cols {
        if let Some(cell) = data.get_mut(cursor.row as usize * cols + cursor.col as usize) {
            *cell = [1.0; CHANNELS];
        }
    }

    ChannelGrid { rows, cols, data }
}
