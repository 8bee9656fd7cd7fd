use std::io::Write;

use anyhow::Result;

/// Where the best cost of an alignment cell came from.
///
/// A `None` predecessor means the cell was reached from the virtual
/// node in front of the lattice, before any lattice word.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Backpointer {
    /// Both the reference word and the lattice word were consumed
    Substitution { pred: Option<usize> },
    /// The lattice word was consumed with no reference word
    Insertion { pred: Option<usize> },
    /// The reference word was consumed with no lattice word
    #[default]
    Deletion,
}

#[derive(Default, Clone)]
pub struct CostMatrix {
    pub num_rows: usize,
    pub num_columns: usize,
    /// The edit costs as a flat vector.
    //
    // the data is stored in row-major order:
    //     [
    //         c_(0, 0), c_(0, 1), ..., c_(0, C),
    //         ...
    //         c_(R, 0), c_(R, 1), ..., c_(R, C),
    //     ]
    //
    // where:
    //
    //     R:        <num_rows>: one row per reference word
    //     C:        <num_columns>: one column per node arena slot
    //     c_(i, j): the cost of aligning the reference through word i
    //               against the best lattice path ending at node j
    //
    pub cost_data: Vec<usize>,
    /// The backpointers, laid out the same way as `cost_data`
    pub backpointer_data: Vec<Backpointer>,
}

impl CostMatrix {
    /// The cost of a cell that can't be reached.
    pub const UNREACHABLE: usize = usize::MAX;

    pub fn new(num_rows: usize, num_columns: usize) -> Self {
        let length = num_rows * num_columns;
        CostMatrix {
            num_rows,
            num_columns,
            cost_data: vec![Self::UNREACHABLE; length],
            backpointer_data: vec![Backpointer::default(); length],
        }
    }

    #[inline]
    fn idx(&self, row: usize, column: usize) -> usize {
        debug_assert!(row < self.num_rows);
        debug_assert!(column < self.num_columns);
        row * self.num_columns + column
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> usize {
        self.cost_data[self.idx(row, column)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, column: usize, cost: usize) {
        let idx = self.idx(row, column);
        self.cost_data[idx] = cost;
    }

    #[inline]
    pub fn get_backpointer(&self, row: usize, column: usize) -> Backpointer {
        self.backpointer_data[self.idx(row, column)]
    }

    #[inline]
    pub fn set_backpointer(&mut self, row: usize, column: usize, backpointer: Backpointer) {
        let idx = self.idx(row, column);
        self.backpointer_data[idx] = backpointer;
    }

    /// Writes the cost table to `out`, with `*` for unreachable cells.
    pub fn dump(&self, out: &mut impl Write) -> Result<()> {
        let row_idx_width = self.num_rows.to_string().len();
        let column_width = 6;

        write!(out, "{}", " ".repeat(row_idx_width + 1))?;
        for column in 0..self.num_columns {
            write!(out, "{:>w$}", column, w = column_width)?;
        }
        writeln!(out)?;

        for row in 0..self.num_rows {
            write!(out, "{:w$} ", row, w = row_idx_width)?;
            for column in 0..self.num_columns {
                match self.get(row, column) {
                    Self::UNREACHABLE => write!(out, "{:>w$}", "*", w = column_width)?,
                    cost => write!(out, "{:>w$}", cost, w = column_width)?,
                }
            }
            writeln!(out)?;
        }

        Ok(())
    }
}
