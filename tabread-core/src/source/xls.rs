//! Legacy binary workbook rows (`.xls`)
//!
//! Cells are decoded by `calamine`. Which sheet to read, and the workbook
//! date system, come from a light scan of the BIFF records in the
//! compound file's `Workbook` stream.

use std::fmt;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use calamine::{Data, Range, Reader, SheetType, Xls};
use log::{debug, warn};

use crate::error::{Anomaly, Error, Result};
use crate::resolve::{CellKind, CellResolver, DateSystem, NumberFormat};
use crate::sheet_select::select_active;

use super::SparseRow;

const FORMAT: &str = "XLS";

const RECORD_BOF_BIFF8: u16 = 0x0809;
const RECORD_BOF_BIFF5: u16 = 0x0009;
const RECORD_EOF: u16 = 0x000A;
const RECORD_BOUNDSHEET: u16 = 0x0085;
const RECORD_DATEMODE: u16 = 0x0022;
const RECORD_WINDOW2: u16 = 0x023E;

const BOF_VERSION_BIFF8: u16 = 0x0600;
const BOUNDSHEET_WORKSHEET: u8 = 0x00;
const WINDOW2_SELECTED: u16 = 0x0200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BiffVersion {
    Biff5,
    Biff8,
}

#[derive(Debug, Clone, Copy)]
struct BiffRecord<'a> {
    offset: usize,
    record_id: u16,
    data: &'a [u8],
}

/// Physical records from `offset`; stops quietly at a truncated record
fn records(stream: &[u8], offset: usize) -> impl Iterator<Item = BiffRecord<'_>> {
    let mut offset = offset;
    std::iter::from_fn(move || {
        let header = stream.get(offset..offset.checked_add(4)?)?;
        let record_id = u16::from_le_bytes([header[0], header[1]]);
        let len = u16::from_le_bytes([header[2], header[3]]) as usize;
        let data = stream.get(offset + 4..offset + 4 + len)?;
        let record = BiffRecord {
            offset,
            record_id,
            data,
        };
        offset += 4 + len;
        Some(record)
    })
}

fn is_bof(record_id: u16) -> bool {
    record_id == RECORD_BOF_BIFF8 || record_id == RECORD_BOF_BIFF5
}

/// A `BOUNDSHEET` entry from the workbook globals
#[derive(Debug, Clone, PartialEq, Eq)]
struct BoundSheet {
    name: String,
    /// Stream offset of the sheet's BOF record
    offset: usize,
    sheet_type: u8,
}

#[derive(Debug, Default)]
struct Globals {
    sheets: Vec<BoundSheet>,
    date_system: DateSystem,
}

fn parse_globals(stream: &[u8]) -> Globals {
    let mut globals = Globals::default();
    let mut version = BiffVersion::Biff8;

    for record in records(stream, 0) {
        match record.record_id {
            id if is_bof(id) => {
                if record.offset != 0 {
                    break;
                }
                if let Some(v) = record.data.get(0..2) {
                    let v = u16::from_le_bytes([v[0], v[1]]);
                    version = if v == BOF_VERSION_BIFF8 {
                        BiffVersion::Biff8
                    } else {
                        BiffVersion::Biff5
                    };
                }
            }
            RECORD_BOUNDSHEET => match parse_boundsheet(record.data, version) {
                Some(sheet) => globals.sheets.push(sheet),
                None => warn!("skipping malformed BOUNDSHEET record at {}", record.offset),
            },
            RECORD_DATEMODE => {
                if record.data.get(0..2).map(|v| u16::from_le_bytes([v[0], v[1]])) == Some(1) {
                    globals.date_system = DateSystem::Excel1904;
                }
            }
            RECORD_EOF => break,
            _ => {}
        }
    }
    globals
}

fn parse_boundsheet(data: &[u8], version: BiffVersion) -> Option<BoundSheet> {
    let offset = u32::from_le_bytes(data.get(0..4)?.try_into().ok()?) as usize;
    let sheet_type = *data.get(5)?;
    let cch = *data.get(6)? as usize;

    let name = match version {
        BiffVersion::Biff8 => {
            let high_byte = data.get(7)? & 0x01 != 0;
            let chars = data.get(8..)?;
            if high_byte {
                let units: Vec<u16> = chars
                    .get(..cch * 2)?
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            } else {
                chars.get(..cch)?.iter().map(|&b| b as char).collect()
            }
        }
        BiffVersion::Biff5 => data.get(7..7 + cch)?.iter().map(|&b| b as char).collect(),
    };

    Some(BoundSheet {
        name,
        offset,
        sheet_type,
    })
}

/// Whether the sheet substream's `WINDOW2` has the selected flag
fn is_sheet_selected(stream: &[u8], offset: usize) -> bool {
    for record in records(stream, offset) {
        if record.offset != offset && is_bof(record.record_id) {
            break;
        }
        match record.record_id {
            RECORD_WINDOW2 => {
                return record
                    .data
                    .get(0..2)
                    .map(|g| u16::from_le_bytes([g[0], g[1]]) & WINDOW2_SELECTED != 0)
                    .unwrap_or(false);
            }
            RECORD_EOF => break,
            _ => {}
        }
    }
    false
}

fn read_workbook_stream<R: Read + Seek>(inner: R) -> Result<Vec<u8>> {
    let mut comp = cfb::CompoundFile::open(inner)?;
    for candidate in ["/Workbook", "/Book"] {
        if let Ok(mut stream) = comp.open_stream(candidate) {
            let mut bytes = Vec::new();
            stream.read_to_end(&mut bytes)?;
            return Ok(bytes);
        }
    }
    Err(Error::MissingPart("Workbook stream".to_string()))
}

pub struct XlsRows {
    path: PathBuf,
    sheet_name: String,
    range: Range<Data>,
    date_system: DateSystem,
    next: usize,
}

impl fmt::Debug for XlsRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XlsRows")
            .field("path", &self.path)
            .field("sheet_name", &self.sheet_name)
            .field("size", &self.range.get_size())
            .field("date_system", &self.date_system)
            .field("next", &self.next)
            .finish()
    }
}

impl XlsRows {
    /// Decode the workbook and load the active worksheet
    pub fn open(bytes: Vec<u8>, path: &Path) -> Result<Self> {
        let malformed = |e: Error| Error::malformed(path, FORMAT, e);

        let stream = read_workbook_stream(Cursor::new(bytes.as_slice())).map_err(malformed)?;
        let globals = parse_globals(&stream);

        let worksheets: Vec<(usize, &BoundSheet)> = globals
            .sheets
            .iter()
            .filter(|sheet| sheet.sheet_type == BOUNDSHEET_WORKSHEET)
            .enumerate()
            .collect();
        let selected = select_active(worksheets, |(_, sheet)| {
            Ok(is_sheet_selected(&stream, sheet.offset))
        })?;

        let mut workbook =
            Xls::new(Cursor::new(bytes)).map_err(|e| Error::malformed(path, FORMAT, e))?;

        // Decoded names may differ from calamine's for legacy code pages, so
        // match by position among worksheets
        let names: Vec<String> = workbook
            .sheets_metadata()
            .iter()
            .filter(|sheet| sheet.typ == SheetType::WorkSheet)
            .map(|sheet| sheet.name.clone())
            .collect();
        let sheet_name = match selected {
            Some((index, sheet)) => names.get(index).cloned().unwrap_or_else(|| sheet.name.clone()),
            None => names
                .first()
                .cloned()
                .ok_or_else(|| Error::malformed(path, FORMAT, "workbook has no worksheets"))?,
        };
        debug!("{}: reading sheet '{}'", path.display(), sheet_name);

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| Error::malformed(path, FORMAT, format!("{sheet_name}: {e}")))?;

        Ok(Self::from_range(path, sheet_name, range, globals.date_system))
    }

    fn from_range(
        path: &Path,
        sheet_name: String,
        range: Range<Data>,
        date_system: DateSystem,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            sheet_name,
            range,
            date_system,
            next: 0,
        }
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn date_system(&self) -> DateSystem {
        self.date_system
    }

    pub fn next_cells(&mut self, anomalies: &mut Vec<Anomaly>) -> Option<SparseRow> {
        let (height, width) = self.range.get_size();
        if self.next >= height {
            return None;
        }
        let row = self.next;
        self.next += 1;

        let first_column = self.range.start().map_or(0, |(_, column)| column);
        let resolver = CellResolver::new(&[], self.date_system);
        let date_format = NumberFormat::builtin(14);

        let mut cells = Vec::new();
        for offset in 0..width {
            let Some(data) = self.range.get((row, offset)) else {
                continue;
            };
            let Some((kind, raw, dated)) = cell_payload(data) else {
                continue;
            };
            let column = first_column + offset as u32;
            let format = dated.then_some(&date_format);

            let value = match resolver.resolve(&kind, &raw, format) {
                Ok(value) => value,
                Err(anomaly) => {
                    warn!(
                        "{}: row {} column {}: {}",
                        self.path.display(),
                        row,
                        column,
                        anomaly
                    );
                    let fallback = anomaly.fallback();
                    anomalies.push(Anomaly {
                        row,
                        column,
                        kind: anomaly,
                    });
                    fallback
                }
            };
            cells.push((column, value));
        }
        Some(cells)
    }

    pub fn skip_rows(&mut self, count: usize) -> usize {
        let (height, _) = self.range.get_size();
        let skipped = count.min(height.saturating_sub(self.next));
        self.next += skipped;
        skipped
    }
}

/// Kind, raw text and whether a date format applies; `None` for empty cells
fn cell_payload(data: &Data) -> Option<(CellKind, String, bool)> {
    let payload = match data {
        Data::Empty => return None,
        Data::Int(v) => (CellKind::Number, v.to_string(), false),
        Data::Float(v) => (CellKind::Number, v.to_string(), false),
        Data::DateTime(v) => (CellKind::Number, v.as_f64().to_string(), v.is_datetime()),
        Data::String(v) | Data::DurationIso(v) => (CellKind::InlineString, v.clone(), false),
        Data::DateTimeIso(v) => (CellKind::Date, v.clone(), false),
        Data::Bool(v) => (CellKind::Boolean, if *v { "1" } else { "0" }.to_string(), false),
        Data::Error(e) => (CellKind::Error, e.to_string(), false),
    };
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;

    fn record(id: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + payload.len());
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn boundsheet(offset: u32, sheet_type: u8, name: &str) -> Vec<u8> {
        let mut payload = offset.to_le_bytes().to_vec();
        payload.push(0); // visible
        payload.push(sheet_type);
        payload.push(name.len() as u8);
        payload.push(0); // compressed latin-1
        payload.extend_from_slice(name.as_bytes());
        record(RECORD_BOUNDSHEET, &payload)
    }

    fn substream(window2_flags: Option<u16>) -> Vec<u8> {
        let mut out = record(RECORD_BOF_BIFF8, &[0x00, 0x06, 0x10, 0x00]);
        if let Some(flags) = window2_flags {
            let mut payload = flags.to_le_bytes().to_vec();
            payload.extend_from_slice(&[0; 16]);
            out.extend(record(RECORD_WINDOW2, &payload));
        }
        out.extend(record(RECORD_EOF, &[]));
        out
    }

    /// Globals plus one substream per sheet, with BOUNDSHEET offsets patched in
    fn workbook_stream(sheets: &[(&str, u8, Option<u16>)], date1904: bool) -> Vec<u8> {
        let bof = record(RECORD_BOF_BIFF8, &[0x00, 0x06, 0x05, 0x00]);
        let datemode = record(RECORD_DATEMODE, &[date1904 as u8, 0]);
        let eof = record(RECORD_EOF, &[]);

        let globals_len = bof.len()
            + datemode.len()
            + sheets
                .iter()
                .map(|(name, ..)| boundsheet(0, 0, name).len())
                .sum::<usize>()
            + eof.len();

        let mut offset = globals_len;
        let mut globals = bof;
        globals.extend(datemode);
        let mut bodies = Vec::new();
        for (name, sheet_type, flags) in sheets {
            let body = substream(*flags);
            globals.extend(boundsheet(offset as u32, *sheet_type, name));
            offset += body.len();
            bodies.push(body);
        }
        globals.extend(eof);
        assert_eq!(globals.len(), globals_len);
        for body in bodies {
            globals.extend(body);
        }
        globals
    }

    #[test]
    fn test_parse_globals() {
        let stream = workbook_stream(&[("First", 0, None), ("Chart", 2, None)], true);
        let globals = parse_globals(&stream);
        assert_eq!(globals.sheets.len(), 2);
        assert_eq!(globals.sheets[0].name, "First");
        assert_eq!(globals.sheets[1].sheet_type, 2);
        assert_eq!(globals.date_system, DateSystem::Excel1904);
    }

    #[test]
    fn test_selected_flag_from_window2() {
        let stream = workbook_stream(
            &[
                ("One", 0, Some(0x04B6)),
                ("Two", 0, Some(0x04B6 | WINDOW2_SELECTED)),
                ("Three", 0, None),
            ],
            false,
        );
        let globals = parse_globals(&stream);
        let flags: Vec<bool> = globals
            .sheets
            .iter()
            .map(|sheet| is_sheet_selected(&stream, sheet.offset))
            .collect();
        assert_eq!(flags, vec![false, true, false]);
        assert_eq!(globals.date_system, DateSystem::Excel1900);
    }

    #[test]
    fn test_boundsheet_utf16_name() {
        let mut payload = 100u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&[0, 0, 2, 1]);
        for unit in "Ñu".encode_utf16() {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
        let sheet = parse_boundsheet(&payload, BiffVersion::Biff8).unwrap();
        assert_eq!(sheet.name, "Ñu");
        assert_eq!(sheet.offset, 100);
    }

    #[test]
    fn test_truncated_records_stop_iteration() {
        let mut stream = record(RECORD_BOF_BIFF8, &[0x00, 0x06, 0x05, 0x00]);
        stream.extend_from_slice(&[0x85, 0x00, 0x40]);
        assert_eq!(records(&stream, 0).count(), 1);
        assert!(parse_globals(&stream).sheets.is_empty());
    }

    #[test]
    fn test_rows_from_range() {
        let mut range = Range::new((0, 1), (2, 3));
        range.set_value((0, 1), Data::String("name".to_string()));
        range.set_value((0, 2), Data::String("qty".to_string()));
        range.set_value((0, 3), Data::String("ok".to_string()));
        range.set_value((1, 1), Data::String("apple".to_string()));
        range.set_value((1, 2), Data::Float(3.0));
        range.set_value((1, 3), Data::Bool(true));
        range.set_value((2, 2), Data::Float(0.5));
        range.set_value((2, 3), Data::Error(CellErrorType::Div0));

        let mut rows = XlsRows::from_range(
            Path::new("book.xls"),
            "Sheet1".to_string(),
            range,
            DateSystem::Excel1900,
        );
        let mut anomalies = Vec::new();
        assert_eq!(
            rows.next_cells(&mut anomalies),
            Some(vec![
                (1, "name".to_string()),
                (2, "qty".to_string()),
                (3, "ok".to_string())
            ])
        );
        assert_eq!(
            rows.next_cells(&mut anomalies),
            Some(vec![
                (1, "apple".to_string()),
                (2, "3".to_string()),
                (3, "TRUE".to_string())
            ])
        );
        assert_eq!(
            rows.next_cells(&mut anomalies),
            Some(vec![(2, "0.5".to_string()), (3, "#DIV/0!".to_string())])
        );
        assert_eq!(rows.next_cells(&mut anomalies), None);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_iso_datetime_cells_are_canonical() {
        let mut range = Range::new((0, 0), (0, 1));
        range.set_value((0, 0), Data::DateTimeIso("2023-08-01T10:00:00".to_string()));
        range.set_value((0, 1), Data::DurationIso("PT1H".to_string()));
        let mut rows =
            XlsRows::from_range(Path::new("b.xls"), "S".to_string(), range, DateSystem::Excel1900);
        assert_eq!(
            rows.next_cells(&mut Vec::new()),
            Some(vec![(0, "08/01/2023".to_string()), (1, "PT1H".to_string())])
        );
    }

    #[test]
    fn test_skip_rows_is_bounded() {
        let mut range = Range::new((0, 0), (1, 0));
        range.set_value((0, 0), Data::Int(1));
        range.set_value((1, 0), Data::Int(2));
        let mut rows =
            XlsRows::from_range(Path::new("b.xls"), "S".to_string(), range, DateSystem::Excel1900);
        assert_eq!(rows.skip_rows(5), 2);
        assert_eq!(rows.next_cells(&mut Vec::new()), None);
    }

    #[test]
    fn test_not_a_compound_file() {
        let result = XlsRows::open(b"plainly not a workbook".to_vec(), Path::new("fake.xls"));
        match result {
            Err(Error::Malformed { format, path, .. }) => {
                assert_eq!(format, "XLS");
                assert_eq!(path, PathBuf::from("fake.xls"));
            }
            other => panic!("expected a malformed error, got {other:?}"),
        }
    }
}
