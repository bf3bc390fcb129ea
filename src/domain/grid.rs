/// Grid: the static per-level terrain layer.
///
/// Two parallel tables, both indexed `[row * width + col]`:
///   - `collidable`: derived from the tile table once at construction
///   - `codes`     : the raw interaction codes, kept for the hazard rule
///
/// Out-of-bounds queries are always collidable (closed boundary).

use super::tile::{self, TileCode};

/// A cell whose code is outside the tile table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownTile {
    pub col: usize,
    pub row: usize,
    pub code: i32,
}

#[derive(Clone, Debug)]
pub struct Grid {
    width: usize,
    height: usize,
    collidable: Vec<bool>,
    codes: Vec<i32>,
    unknown: Vec<UnknownTile>,
}

impl Grid {
    /// Build from `codes[row][col]`. Rows are assumed rectangular; the
    /// session validates shape before calling this.
    pub fn from_codes(codes: &[Vec<i32>]) -> Self {
        let height = codes.len();
        let width = codes.first().map_or(0, |r| r.len());
        let mut collidable = vec![true; width * height];
        let mut flat = vec![0; width * height];
        let mut unknown = vec![];

        for (row, line) in codes.iter().enumerate() {
            for (col, &code) in line.iter().enumerate().take(width) {
                let idx = row * width + col;
                flat[idx] = code;
                let class = TileCode::classify(code);
                collidable[idx] = class.terrain().map_or(true, |t| t.is_collidable());
                if let TileCode::Unknown(code) = class {
                    log::warn!("unknown tile code {code} at ({col},{row}); treating as wall");
                    unknown.push(UnknownTile { col, row, code });
                }
            }
        }

        Grid { width, height, collidable, codes: flat, unknown }
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }

    #[inline]
    pub fn in_bounds(&self, col: i32, row: i32) -> bool {
        col >= 0 && row >= 0 && (col as usize) < self.width && (row as usize) < self.height
    }

    /// Tile-layer collision. Out of bounds = wall.
    #[inline]
    pub fn is_collidable(&self, col: i32, row: i32) -> bool {
        if !self.in_bounds(col, row) { return true; }
        self.collidable[row as usize * self.width + col as usize]
    }

    /// Raw code at a cell, `None` out of bounds.
    #[inline]
    pub fn code_at(&self, col: i32, row: i32) -> Option<i32> {
        if !self.in_bounds(col, row) { return None; }
        Some(self.codes[row as usize * self.width + col as usize])
    }

    /// Terrain passability as the resolver sees it: either the tile is open,
    /// or the hazard layer governs the cell.
    pub fn is_walkable(&self, col: i32, row: i32) -> bool {
        if !self.in_bounds(col, row) { return false; }
        !self.is_collidable(col, row)
            || self.code_at(col, row).is_some_and(tile::is_hazard_walkable)
    }

    /// Cells that fell back to collidable because their code is unknown.
    pub fn diagnostics(&self) -> &[UnknownTile] {
        &self.unknown
    }

    /// Length of the grid diagonal in cells, rounded up.
    pub fn diagonal_len(&self) -> usize {
        let w = self.width as f64;
        let h = self.height as f64;
        (w * w + h * h).sqrt().ceil() as usize
    }
}
