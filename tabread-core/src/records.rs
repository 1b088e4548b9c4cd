//! Whole-file helpers on top of [`RowSource`](crate::RowSource)

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use log::warn;

use crate::config::ReaderOptions;
use crate::error::Result;
use crate::source::{Row, RowSource, open, open_stream};

/// Read rows keyed by their zero-based row number, skipping empty rows.
///
/// Rows before `offset` are numbered but not returned; at most `limit`
/// rows are returned.
pub fn read_rows<P: AsRef<Path>>(
    path: P,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Result<BTreeMap<usize, Row>> {
    let options = ReaderOptions::default().with_read_empty_rows(false);
    read_rows_with(path, &options, offset, limit)
}

/// Like [`read_rows`] with explicit reader options
pub fn read_rows_with<P: AsRef<Path>>(
    path: P,
    options: &ReaderOptions,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Result<BTreeMap<usize, Row>> {
    let mut source = open(path, options)?;
    let result = collect_rows(&mut source, offset, limit);
    close_quietly(&mut source);
    result
}

/// Header cells of the first non-empty row, keyed from 1
pub fn headers<P: AsRef<Path>>(path: P) -> Result<BTreeMap<usize, String>> {
    Ok(number_headers(read_rows(path, Some(0), Some(1))?))
}

/// [`read_rows`] over an uploaded or in-memory stream.
///
/// `file_name` picks the format the same way a path extension does.
pub fn read_stream_rows<R: Read + 'static>(
    reader: R,
    file_name: &str,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Result<BTreeMap<usize, Row>> {
    let options = ReaderOptions::default().with_read_empty_rows(false);
    let mut source = open_stream(reader, file_name, &options)?;
    let result = collect_rows(&mut source, offset, limit);
    close_quietly(&mut source);
    result
}

/// [`headers`] over an uploaded or in-memory stream
pub fn stream_headers<R: Read + 'static>(
    reader: R,
    file_name: &str,
) -> Result<BTreeMap<usize, String>> {
    Ok(number_headers(read_stream_rows(
        reader,
        file_name,
        Some(0),
        Some(1),
    )?))
}

fn number_headers(rows: BTreeMap<usize, Row>) -> BTreeMap<usize, String> {
    rows.into_values()
        .next()
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, name)| (index + 1, name))
        .collect()
}

/// Drain an open source into numbered rows, honoring `offset` and `limit`
pub fn collect_rows(
    source: &mut RowSource,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Result<BTreeMap<usize, Row>> {
    let offset = offset.unwrap_or(0);
    let mut rows = BTreeMap::new();
    if limit == Some(0) {
        return Ok(rows);
    }

    let mut row_number = 0;
    while source.has_next()? {
        let Some(row) = source.next_row() else {
            break;
        };
        if row_number >= offset {
            rows.insert(row_number, row);
            if limit.is_some_and(|limit| rows.len() >= limit) {
                break;
            }
        }
        row_number += 1;
    }
    Ok(rows)
}

fn close_quietly(source: &mut RowSource) {
    if let Err(e) = source.close() {
        warn!("{}: failed to close: {}", source.path().display(), e);
    }
}
