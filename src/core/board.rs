//! Game board for 5-in-a-row matches
//!
//! The board is a square grid addressed by column `x` and row `y`, both
//! starting at zero. Cells only ever go from empty to marked, except when the
//! whole board is cleared for a rematch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, RustyCaroError};

/// The symbol a player places on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    /// The opposing mark
    pub fn other(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Seat index used for per-player arrays (X = 0, O = 1)
    pub fn index(self) -> usize {
        match self {
            Mark::X => 0,
            Mark::O => 1,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => write!(f, "X"),
            Mark::O => write!(f, "O"),
        }
    }
}

impl FromStr for Mark {
    type Err = RustyCaroError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "X" => Ok(Mark::X),
            "O" => Ok(Mark::O),
            other => Err(RustyCaroError::MalformedCommand(format!("unknown mark {}", other))),
        }
    }
}

/// A single board position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    Marked(Mark),
}

// Horizontal, vertical, diagonal, anti-diagonal
const AXES: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (1, -1)];

/// Square grid of cells with a running count of placed marks
#[derive(Debug, Clone)]
pub struct Board {
    size: usize,
    cells: Vec<Cell>,
    filled: usize,
}

impl Board {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![Cell::Empty; size * size],
            filled: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of marks currently on the board
    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.cells.len()
    }

    /// Convert signed client coordinates into a position on this board
    pub fn checked_position(&self, x: i64, y: i64) -> Result<(usize, usize)> {
        let in_range = |v: i64| v >= 0 && (v as u64) < self.size as u64;
        if in_range(x) && in_range(y) {
            Ok((x as usize, y as usize))
        } else {
            Err(RustyCaroError::OutOfBounds { x, y })
        }
    }

    /// Cell at (x, y), or None if outside the board
    pub fn get(&self, x: usize, y: usize) -> Option<Cell> {
        if x < self.size && y < self.size {
            Some(self.cells[y * self.size + x])
        } else {
            None
        }
    }

    /// Place a mark on an empty cell
    pub fn place(&mut self, x: usize, y: usize, mark: Mark) -> Result<()> {
        if x >= self.size || y >= self.size {
            return Err(RustyCaroError::OutOfBounds {
                x: x as i64,
                y: y as i64,
            });
        }

        let cell = &mut self.cells[y * self.size + x];
        if *cell != Cell::Empty {
            return Err(RustyCaroError::CellOccupied { x, y });
        }

        *cell = Cell::Marked(mark);
        self.filled += 1;
        Ok(())
    }

    /// Reset every cell to empty
    pub fn clear(&mut self) {
        self.cells.fill(Cell::Empty);
        self.filled = 0;
    }

    /// Length of the same-mark run through (x, y) along one axis, counting
    /// the origin once
    fn run_length(&self, x: usize, y: usize, mark: Mark, (dx, dy): (isize, isize)) -> usize {
        let forward = self.count_direction(x, y, mark, dx, dy);
        let backward = self.count_direction(x, y, mark, -dx, -dy);
        forward + backward - 1
    }

    /// Contiguous cells holding `mark` starting at (x, y) and stepping by (dx, dy)
    fn count_direction(&self, x: usize, y: usize, mark: Mark, dx: isize, dy: isize) -> usize {
        let mut count = 0;
        let (mut cx, mut cy) = (x as isize, y as isize);

        while cx >= 0 && cy >= 0 {
            match self.get(cx as usize, cy as usize) {
                Some(Cell::Marked(m)) if m == mark => count += 1,
                _ => break,
            }
            cx += dx;
            cy += dy;
        }

        count
    }

    /// Longest run of the mark at (x, y) over all four axes, 0 for an empty cell
    pub fn longest_run_through(&self, x: usize, y: usize) -> usize {
        let mark = match self.get(x, y) {
            Some(Cell::Marked(mark)) => mark,
            _ => return 0,
        };

        AXES.iter()
            .map(|&axis| self.run_length(x, y, mark, axis))
            .max()
            .unwrap_or(0)
    }

    /// Whether the mark at (x, y) is part of a run of at least `win_length`.
    /// Overlines count.
    pub fn is_winning_move(&self, x: usize, y: usize, win_length: usize) -> bool {
        self.longest_run_through(x, y) >= win_length
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.size) {
            for cell in row {
                let c = match cell {
                    Cell::Empty => '.',
                    Cell::Marked(Mark::X) => 'X',
                    Cell::Marked(Mark::O) => 'O',
                };
                write!(f, "{}", c)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
