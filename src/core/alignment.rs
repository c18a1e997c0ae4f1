//! Multiple sequence alignment representation.
//!
//! The alignment is a column-major table of [`Cell`]s with one row per tree
//! node (leaf or internal). Letters are indices into the alphabet; rows
//! outside the scope of a sub-alignment carry the unknown marker. The row
//! count is fixed by the topology, the column count is mutable.

use ndarray::Array2;
use rand::Rng;

use crate::encoding::Cell;
use crate::errors::{PhylignError, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    /// The homology array, indexed (column, row).
    array: Array2<Cell>,
}

impl Alignment {
    /// An empty alignment with `n_rows` sequences of length 0.
    pub fn new(n_rows: usize) -> Self {
        Self {
            array: Array2::from_elem((0, n_rows), Cell::Gap),
        }
    }

    /// Build an alignment from per-sequence rows of equal length.
    pub fn from_rows(rows: &[Vec<Cell>]) -> Result<Self> {
        let n_rows = rows.len();
        let length = rows.first().map_or(0, |row| row.len());
        if rows.iter().any(|row| row.len() != length) {
            return Err(PhylignError::InitializationError(
                "alignment rows have unequal lengths".to_string(),
            ));
        }
        let mut array = Array2::from_elem((length, n_rows), Cell::Gap);
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                array[[c, r]] = *cell;
            }
        }
        Ok(Self { array })
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.array.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of sequences.
    pub fn n_rows(&self) -> usize {
        self.array.ncols()
    }

    #[inline]
    pub fn cell(&self, column: usize, row: usize) -> Cell {
        self.array[[column, row]]
    }

    #[inline]
    pub fn set(&mut self, column: usize, row: usize, cell: Cell) {
        self.array[[column, row]] = cell;
    }

    /// Does sequence `row` have a character in `column`?
    #[inline]
    pub fn character(&self, column: usize, row: usize) -> bool {
        self.cell(column, row).is_letter()
    }

    #[inline]
    pub fn gap(&self, column: usize, row: usize) -> bool {
        self.cell(column, row).is_gap()
    }

    #[inline]
    pub fn unknown(&self, column: usize, row: usize) -> bool {
        self.cell(column, row).is_unknown()
    }

    /// The length of sequence `row`, not counting gaps or unknowns.
    pub fn seqlength(&self, row: usize) -> usize {
        (0..self.len()).filter(|&c| self.character(c, row)).count()
    }

    /// The unaligned letters of sequence `row`, in column order.
    pub fn row_sequence(&self, row: usize) -> Vec<u8> {
        (0..self.len())
            .filter_map(|c| self.cell(c, row).letter())
            .collect()
    }

    /// Resize to `length` columns, padding new columns with gaps.
    pub fn changelength(&mut self, length: usize) {
        let n_rows = self.n_rows();
        let mut array = Array2::from_elem((length, n_rows), Cell::Gap);
        for c in 0..length.min(self.len()) {
            for r in 0..n_rows {
                array[[c, r]] = self.array[[c, r]];
            }
        }
        self.array = array;
    }

    /// Remove column `column`, preserving the information in other columns.
    pub fn delete_column(&mut self, column: usize) {
        assert!(column < self.len());
        let n_rows = self.n_rows();
        let mut array = Array2::from_elem((self.len() - 1, n_rows), Cell::Gap);
        for c in 0..self.len() {
            if c == column {
                continue;
            }
            let target = if c < column { c } else { c - 1 };
            for r in 0..n_rows {
                array[[target, r]] = self.array[[c, r]];
            }
        }
        self.array = array;
    }

    /// Does the column contain no characters at all?
    pub fn all_gaps(&self, column: usize) -> bool {
        (0..self.n_rows()).all(|r| !self.character(column, r))
    }

    /// Does the column contain no characters among the masked rows?
    pub fn all_gaps_masked(&self, column: usize, mask: &[bool]) -> bool {
        (0..self.n_rows()).all(|r| !mask[r] || !self.character(column, r))
    }

    /// How many characters are in this column?
    pub fn n_characters(&self, column: usize) -> usize {
        (0..self.n_rows())
            .filter(|&r| self.character(column, r))
            .count()
    }

    /// Remove columns that contain no characters; returns how many went.
    pub fn remove_empty_columns(&mut self) -> usize {
        let keep: Vec<usize> = (0..self.len()).filter(|&c| !self.all_gaps(c)).collect();
        let removed = self.len() - keep.len();
        if removed > 0 {
            let n_rows = self.n_rows();
            let mut array = Array2::from_elem((keep.len(), n_rows), Cell::Gap);
            for (target, &c) in keep.iter().enumerate() {
                for r in 0..n_rows {
                    array[[target, r]] = self.array[[c, r]];
                }
            }
            self.array = array;
        }
        removed
    }

    /// Generate a randomized alignment of the given unaligned sequences:
    /// each sequence is padded with gaps at random positions up to a common
    /// length, then empty columns are removed.
    pub fn randomize<R: Rng>(seqs: &[Vec<u8>], rng: &mut R) -> Self {
        let maxlength = seqs.iter().map(Vec::len).max().unwrap_or(0);
        let newlength = maxlength + 2 + maxlength / 10;

        let mut rows = Vec::with_capacity(seqs.len());
        for seq in seqs {
            let mut row: Vec<Cell> = seq.iter().map(|&l| Cell::Letter(l)).collect();
            while row.len() < newlength {
                let pos = rng.random_range(0..=row.len());
                row.insert(pos, Cell::Gap);
            }
            rows.push(row);
        }

        let mut alignment = Self::from_rows(&rows).unwrap();
        alignment.remove_empty_columns();
        alignment
    }
}

impl std::fmt::Display for Alignment {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for r in 0..self.n_rows() {
            for c in 0..self.len() {
                write!(f, "{}", self.cell(c, r))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
