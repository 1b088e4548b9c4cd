//! Sparse cell events to dense rows
//!
//! Spreadsheets omit empty cells. [`RowBuilder`] receives the cells that are
//! present, in column order, and fills the holes so that every row comes out
//! dense. The first completed row fixes the header width; later rows are
//! padded up to it.

use crate::source::Row;

#[derive(Debug, Default)]
pub struct RowBuilder {
    cells: Row,
    last_column: Option<u32>,
    in_row: bool,
    header_width: Option<usize>,
    header_cells: usize,
    row_cells: usize,
}

impl RowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new row, discarding any unfinished one
    pub fn begin_row(&mut self) {
        self.cells.clear();
        self.last_column = None;
        self.row_cells = 0;
        self.in_row = true;
    }

    /// Write a cell at a zero-based column.
    ///
    /// Columns skipped since the last write become empty strings. A column
    /// at or before the last one is appended as-is.
    pub fn push(&mut self, column: u32, value: String) {
        if !self.in_row {
            self.begin_row();
        }
        let next = self.last_column.map_or(0, |last| last + 1);
        if column > next {
            for _ in next..column {
                self.cells.push(String::new());
            }
        }
        self.cells.push(value);
        self.last_column = Some(column.max(self.last_column.unwrap_or(0)));
        self.row_cells += 1;
    }

    /// Complete the current row.
    ///
    /// The first row completed is the header: it is returned unpadded and
    /// its length becomes the width later rows are padded to.
    pub fn finish_row(&mut self) -> Row {
        self.in_row = false;
        self.last_column = None;
        let mut row = std::mem::take(&mut self.cells);

        match self.header_width {
            None => {
                self.header_width = Some(row.len());
                self.header_cells = self.row_cells;
            }
            Some(width) if width > 0 && row.len() < width => {
                row.resize(width, String::new());
            }
            Some(_) => {}
        }
        self.row_cells = 0;
        row
    }

    /// Width of the header row, once one has been completed
    pub fn header_width(&self) -> Option<usize> {
        self.header_width
    }

    /// Number of cells actually present in the header row
    pub fn header_cells(&self) -> usize {
        self.header_cells
    }
}

/// True when the row has no cells or every cell is blank
pub fn is_empty_row(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}
