//! Row sources and the uniform reader facade
//!
//! [`open`] picks one backend by file extension and wraps it in a
//! [`RowSource`]. Every backend produces sparse rows (cells present, with
//! their column); the facade densifies them through a shared
//! [`RowBuilder`], applies the skip and empty-row options, and hands rows out
//! one at a time.

pub mod text;
pub mod xls;
pub mod xlsx;

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::ReaderOptions;
use crate::error::{Anomaly, Error, Result};
use crate::reconstruct::{RowBuilder, is_empty_row};

pub use text::TextRows;
pub use xls::XlsRows;
pub use xlsx::XlsxRows;

/// A dense row of cell strings
pub type Row = Vec<String>;

/// Cells present in one source row, as `(zero-based column, value)`
pub type SparseRow = Vec<(u32, String)>;

/// The concrete reader behind a [`RowSource`], chosen once at open time
#[derive(Debug)]
pub enum Backend {
    Text(TextRows),
    LegacyBinary(XlsRows),
    ZipXml(XlsxRows),
}

impl Backend {
    fn next_cells(&mut self, anomalies: &mut Vec<Anomaly>) -> Result<Option<SparseRow>> {
        match self {
            Backend::Text(rows) => rows.next_cells(),
            Backend::LegacyBinary(rows) => Ok(rows.next_cells(anomalies)),
            Backend::ZipXml(rows) => rows.next_cells(anomalies),
        }
    }

    /// Drop `count` leading lines or rows before anything is built
    fn skip(&mut self, count: usize) -> Result<usize> {
        match self {
            Backend::Text(rows) => rows.skip_lines(count),
            Backend::LegacyBinary(rows) => Ok(rows.skip_rows(count)),
            Backend::ZipXml(rows) => rows.skip_rows(count),
        }
    }

    pub fn format_name(&self) -> &'static str {
        match self {
            Backend::Text(_) => "CSV",
            Backend::LegacyBinary(_) => "XLS",
            Backend::ZipXml(_) => "XLSX",
        }
    }
}

#[derive(Debug)]
enum CursorState {
    /// Skip not applied yet
    Unstarted,
    Idle,
    Ready(Row),
    Exhausted,
    Closed,
}

/// A lazily read sequence of rows from one file
#[derive(Debug)]
pub struct RowSource {
    path: PathBuf,
    backend: Option<Backend>,
    builder: RowBuilder,
    cursor: CursorState,
    skip_lines: usize,
    read_empty_rows: bool,
    anomalies: Vec<Anomaly>,
}

impl RowSource {
    fn new(path: PathBuf, backend: Backend, options: &ReaderOptions) -> Self {
        Self {
            path,
            backend: Some(backend),
            builder: RowBuilder::new(),
            cursor: CursorState::Unstarted,
            skip_lines: options.skip_lines,
            read_empty_rows: options.read_empty_rows,
            anomalies: Vec::new(),
        }
    }

    /// Advance to the next qualifying row, if any.
    ///
    /// Returns `Ok(true)` when a row is ready for [`RowSource::next_row`].
    /// Calling it again without taking the row does not advance. An error
    /// leaves the source exhausted.
    pub fn has_next(&mut self) -> Result<bool> {
        match self.advance() {
            Ok(ready) => Ok(ready),
            Err(e) => {
                self.cursor = CursorState::Exhausted;
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<bool> {
        loop {
            match &self.cursor {
                CursorState::Ready(_) => return Ok(true),
                CursorState::Exhausted | CursorState::Closed => return Ok(false),
                CursorState::Unstarted => {
                    if self.skip_lines > 0
                        && let Some(backend) = self.backend.as_mut()
                    {
                        let skipped = backend.skip(self.skip_lines)?;
                        debug!("{}: skipped {} leading rows", self.path.display(), skipped);
                    }
                    self.cursor = CursorState::Idle;
                }
                CursorState::Idle => {
                    let Some(backend) = self.backend.as_mut() else {
                        self.cursor = CursorState::Closed;
                        return Ok(false);
                    };
                    let Some(cells) = backend.next_cells(&mut self.anomalies)? else {
                        self.cursor = CursorState::Exhausted;
                        return Ok(false);
                    };

                    // Filtered rows must not become the header
                    if !self.read_empty_rows && cells.iter().all(|(_, v)| v.trim().is_empty()) {
                        continue;
                    }

                    self.builder.begin_row();
                    for (column, value) in cells {
                        self.builder.push(column, value);
                    }
                    let row = self.builder.finish_row();
                    debug_assert!(self.read_empty_rows || !is_empty_row(&row));
                    self.cursor = CursorState::Ready(row);
                }
            }
        }
    }

    /// Take the row found by the last successful [`RowSource::has_next`]
    pub fn next_row(&mut self) -> Option<Row> {
        match std::mem::replace(&mut self.cursor, CursorState::Idle) {
            CursorState::Ready(row) => Some(row),
            other => {
                self.cursor = other;
                None
            }
        }
    }

    /// Release the underlying file. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(backend) = self.backend.take() {
            debug!("{}: closing {} source", self.path.display(), backend.format_name());
        }
        self.cursor = CursorState::Closed;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.cursor, CursorState::Closed)
    }

    /// Cell problems absorbed so far, in the order they were met
    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// Width of the first row read, once it has been read
    pub fn header_width(&self) -> Option<usize> {
        self.builder.header_width()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `CSV`, `XLS` or `XLSX`; `None` once closed
    pub fn format_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(Backend::format_name)
    }
}

impl Iterator for RowSource {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => self.next_row().map(Ok),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Text,
    LegacyBinary,
    ZipXml,
}

fn source_kind(path: &Path) -> SourceKind {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("csv") => SourceKind::Text,
        Some("xlsx") => SourceKind::ZipXml,
        _ => SourceKind::LegacyBinary,
    }
}

/// Open a file as a row source, dispatching on its extension.
///
/// `.csv` is read as delimited text and `.xlsx` as a zipped XML workbook;
/// any other extension is treated as a legacy `.xls` workbook.
pub fn open<P: AsRef<Path>>(path: P, options: &ReaderOptions) -> Result<RowSource> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    let backend = match source_kind(path) {
        SourceKind::Text => {
            let file = File::open(path)?;
            Backend::Text(TextRows::new(
                Box::new(BufReader::new(file)),
                options.csv.clone(),
            ))
        }
        SourceKind::ZipXml => {
            let file = File::open(path)?;
            Backend::ZipXml(XlsxRows::open(BufReader::new(file), path)?)
        }
        SourceKind::LegacyBinary => {
            let bytes = std::fs::read(path)?;
            Backend::LegacyBinary(XlsRows::open(bytes, path)?)
        }
    };

    debug!("{}: opened as {}", path.display(), backend.format_name());
    Ok(RowSource::new(path.to_path_buf(), backend, options))
}

/// Open an in-memory or uploaded byte stream as a row source.
///
/// `file_name` only selects the format, exactly like the extension in
/// [`open`]. Spreadsheet streams are buffered fully since their containers
/// need random access.
pub fn open_stream<R: Read + 'static>(
    mut reader: R,
    file_name: &str,
    options: &ReaderOptions,
) -> Result<RowSource> {
    let path = PathBuf::from(file_name);

    let backend = match source_kind(&path) {
        SourceKind::Text => Backend::Text(TextRows::new(
            Box::new(BufReader::new(reader)),
            options.csv.clone(),
        )),
        SourceKind::ZipXml => {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            Backend::ZipXml(XlsxRows::open(Cursor::new(bytes), &path)?)
        }
        SourceKind::LegacyBinary => {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            Backend::LegacyBinary(XlsRows::open(bytes, &path)?)
        }
    };

    debug!("{}: opened stream as {}", file_name, backend.format_name());
    Ok(RowSource::new(path, backend, options))
}
