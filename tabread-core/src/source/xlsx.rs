//! Zipped XML workbook rows (`.xlsx`)
//!
//! Opening reads the workbook part, its relationships, the shared-string
//! table and the cell formats, then picks one worksheet. Rows of that
//! worksheet are pulled from its XML one `<row>` at a time.

use std::collections::HashMap;
use std::fmt;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use zip::ZipArchive;

use crate::error::{Anomaly, Error, Result};
use crate::resolve::number_format::builtin_format_code;
use crate::resolve::{CellKind, CellResolver, DateSystem, NumberFormat};
use crate::sheet_select::select_active;

use super::SparseRow;

const FORMAT: &str = "XLSX";

/// A worksheet listed in `xl/workbook.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
struct SheetEntry {
    name: String,
    rel_id: String,
}

#[derive(Debug, Default)]
struct WorkbookInfo {
    sheets: Vec<SheetEntry>,
    date_system: DateSystem,
}

pub struct XlsxRows {
    path: PathBuf,
    sheet_name: String,
    reader: Reader<Cursor<Vec<u8>>>,
    buf: Vec<u8>,
    shared_strings: Vec<String>,
    formats: Vec<NumberFormat>,
    date_system: DateSystem,
    rows_read: usize,
    done: bool,
}

impl fmt::Debug for XlsxRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XlsxRows")
            .field("path", &self.path)
            .field("sheet_name", &self.sheet_name)
            .field("shared_strings", &self.shared_strings.len())
            .field("formats", &self.formats.len())
            .field("date_system", &self.date_system)
            .field("rows_read", &self.rows_read)
            .finish_non_exhaustive()
    }
}

impl XlsxRows {
    /// Open the archive and position on the active worksheet
    pub fn open<R: Read + Seek>(reader: R, path: &Path) -> Result<Self> {
        let malformed = |e: Error| Error::malformed(path, FORMAT, e);

        let mut archive =
            ZipArchive::new(reader).map_err(|e| Error::malformed(path, FORMAT, e))?;

        let workbook = read_workbook(&mut archive).map_err(malformed)?;
        let targets = read_relationships(&mut archive).map_err(malformed)?;
        let shared_strings = read_shared_strings(&mut archive).map_err(malformed)?;
        let formats = read_cell_formats(&mut archive).map_err(malformed)?;

        let candidates: Vec<(String, String)> = workbook
            .sheets
            .into_iter()
            .filter_map(|sheet| match targets.get(&sheet.rel_id) {
                Some(part) => Some((sheet.name, part.clone())),
                None => {
                    warn!(
                        "{}: sheet '{}' has no relationship '{}'",
                        path.display(),
                        sheet.name,
                        sheet.rel_id
                    );
                    None
                }
            })
            .collect();

        let selected = select_active(candidates, |(_, part)| {
            is_tab_selected(&mut archive, part)
        })
        .map_err(malformed)?;
        let Some((sheet_name, part)) = selected else {
            return Err(Error::malformed(path, FORMAT, "workbook has no worksheets"));
        };
        debug!("{}: reading sheet '{}' from {}", path.display(), sheet_name, part);

        let mut sheet_xml = Vec::new();
        archive
            .by_name(&part)
            .map_err(|e| Error::malformed(path, FORMAT, format!("{part}: {e}")))?
            .read_to_end(&mut sheet_xml)?;

        Ok(Self {
            path: path.to_path_buf(),
            sheet_name,
            reader: Reader::from_reader(Cursor::new(sheet_xml)),
            buf: Vec::new(),
            shared_strings,
            formats,
            date_system: workbook.date_system,
            rows_read: 0,
            done: false,
        })
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn date_system(&self) -> DateSystem {
        self.date_system
    }

    /// Cells of the next `<row>`; `None` once `</sheetData>` is reached
    pub fn next_cells(&mut self, anomalies: &mut Vec<Anomaly>) -> Result<Option<SparseRow>> {
        enum Step {
            Row,
            EmptyRow,
            End,
            Other,
        }

        while !self.done {
            let step = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) if e.local_name().as_ref() == b"row" => Step::Row,
                Event::Empty(e) if e.local_name().as_ref() == b"row" => Step::EmptyRow,
                Event::End(e) if e.local_name().as_ref() == b"sheetData" => Step::End,
                Event::Eof => Step::End,
                _ => Step::Other,
            };
            self.buf.clear();

            match step {
                Step::Row => {
                    let resolver = CellResolver::new(&self.shared_strings, self.date_system);
                    let mut context = RowContext {
                        path: &self.path,
                        resolver,
                        formats: &self.formats,
                        row: self.rows_read,
                        anomalies: &mut *anomalies,
                    };
                    let cells = read_row(&mut self.reader, &mut context)?;
                    self.rows_read += 1;
                    return Ok(Some(cells));
                }
                Step::EmptyRow => {
                    self.rows_read += 1;
                    return Ok(Some(Vec::new()));
                }
                Step::End => self.done = true,
                Step::Other => {}
            }
        }
        Ok(None)
    }

    /// Discard up to `count` rows without keeping their anomalies
    pub fn skip_rows(&mut self, count: usize) -> Result<usize> {
        let mut scratch = Vec::new();
        let mut skipped = 0;
        while skipped < count && self.next_cells(&mut scratch)?.is_some() {
            skipped += 1;
        }
        Ok(skipped)
    }
}

struct RowContext<'a> {
    path: &'a Path,
    resolver: CellResolver<'a>,
    formats: &'a [NumberFormat],
    row: usize,
    anomalies: &'a mut Vec<Anomaly>,
}

/// Cell being read between `<c>` and `</c>`
#[derive(Debug, Default)]
struct PendingCell {
    column: u32,
    cell_type: Option<String>,
    style: Option<usize>,
    has_formula: bool,
    value: Option<String>,
}

impl PendingCell {
    fn from_start(e: &BytesStart<'_>, next_column: u32) -> Result<Self> {
        let mut cell = PendingCell {
            column: next_column,
            ..Default::default()
        };
        for attr in e.attributes().flatten() {
            match attr.key.as_ref() {
                b"r" => {
                    if let Some(column) = column_index(&attr.unescape_value()?) {
                        cell.column = column;
                    }
                }
                b"t" => cell.cell_type = Some(attr.unescape_value()?.to_string()),
                b"s" => cell.style = attr.unescape_value()?.trim().parse::<usize>().ok(),
                _ => {}
            }
        }
        Ok(cell)
    }
}

/// Read from just after `<row>` through `</row>`
fn read_row<R: std::io::BufRead>(
    reader: &mut Reader<R>,
    context: &mut RowContext<'_>,
) -> Result<SparseRow> {
    let mut cells = Vec::new();
    let mut buf = Vec::new();
    let mut next_column = 0u32;
    let mut cell: Option<PendingCell> = None;
    let mut inline: Option<String> = None;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    let pending = PendingCell::from_start(&e, next_column)?;
                    next_column = pending.column.saturating_add(1);
                    cell = Some(pending);
                }
                b"v" => {
                    let text = read_text(reader)?;
                    if let Some(cell) = cell.as_mut() {
                        cell.value = Some(text);
                    }
                }
                b"f" => {
                    if let Some(cell) = cell.as_mut() {
                        cell.has_formula = true;
                    }
                    read_text(reader)?;
                }
                b"is" => inline = Some(String::new()),
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => {
                    let text = read_text(reader)?;
                    if let Some(inline) = inline.as_mut() {
                        inline.push_str(&text);
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                // A cell with no content produces no event
                b"c" => {
                    let pending = PendingCell::from_start(&e, next_column)?;
                    next_column = pending.column.saturating_add(1);
                }
                b"f" => {
                    if let Some(cell) = cell.as_mut() {
                        cell.has_formula = true;
                    }
                }
                b"v" => {
                    if let Some(cell) = cell.as_mut() {
                        cell.value = Some(String::new());
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"is" => {
                    if let (Some(cell), Some(text)) = (cell.as_mut(), inline.take()) {
                        cell.value = Some(text);
                    }
                }
                b"c" => {
                    if let Some(done) = cell.take() {
                        emit_cell(done, context, &mut cells);
                    }
                }
                b"row" => break,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(cells)
}

fn emit_cell(cell: PendingCell, context: &mut RowContext<'_>, cells: &mut SparseRow) {
    let Some(raw) = cell.value else {
        return;
    };
    let kind = CellKind::from_xlsx_type(cell.cell_type.as_deref(), cell.has_formula);
    let format = context.formats.get(cell.style.unwrap_or(0));

    let value = match context.resolver.resolve(&kind, &raw, format) {
        Ok(value) => value,
        Err(anomaly) => {
            warn!(
                "{}: row {} column {}: {}",
                context.path.display(),
                context.row,
                cell.column,
                anomaly
            );
            let fallback = anomaly.fallback();
            context.anomalies.push(Anomaly {
                row: context.row,
                column: cell.column,
                kind: anomaly,
            });
            fallback
        }
    };
    cells.push((cell.column, value));
}

/// Text content up to the matching end tag
fn read_text<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) | Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// Zero-based column of a cell reference like `"AB12"`
fn column_index(cell_ref: &str) -> Option<u32> {
    let mut column = 0u32;
    let mut letters = 0;
    for ch in cell_ref.chars() {
        if ch.is_ascii_alphabetic() {
            let digit = ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
            column = column.checked_mul(26)?.checked_add(digit)?;
            letters += 1;
        } else {
            break;
        }
    }
    if letters == 0 {
        return None;
    }
    Some(column - 1)
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn read_workbook<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<WorkbookInfo> {
    let workbook_xml = archive
        .by_name("xl/workbook.xml")
        .map_err(|_| Error::MissingPart("xl/workbook.xml".to_string()))?;
    let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
    reader.config_mut().trim_text(true);

    let mut info = WorkbookInfo::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let mut name = String::new();
                    let mut rel_id = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"name" => name = attr.unescape_value()?.to_string(),
                            b"id" => rel_id = attr.unescape_value()?.to_string(),
                            _ => {}
                        }
                    }
                    info.sheets.push(SheetEntry { name, rel_id });
                }
                b"workbookPr" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"date1904" && is_truthy(&attr.unescape_value()?) {
                            info.date_system = DateSystem::Excel1904;
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(info)
}

/// Relationship id to archive part name
fn read_relationships<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<HashMap<String, String>> {
    let rels_xml = archive
        .by_name("xl/_rels/workbook.xml.rels")
        .map_err(|_| Error::MissingPart("xl/_rels/workbook.xml.rels".to_string()))?;
    let mut reader = Reader::from_reader(BufReader::new(rels_xml));
    reader.config_mut().trim_text(true);

    let mut targets = HashMap::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = String::new();
                let mut target = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = attr.unescape_value()?.to_string(),
                        b"Target" => target = attr.unescape_value()?.to_string(),
                        _ => {}
                    }
                }
                targets.insert(id, resolve_target(&target));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(targets)
}

/// Targets are relative to `xl/` unless absolute
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

fn read_shared_strings<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let ss_xml = match archive.by_name("xl/sharedStrings.xml") {
        Ok(file) => file,
        Err(_) => return Ok(strings),
    };

    let mut reader = Reader::from_reader(BufReader::new(ss_xml));
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => current.push_str(&read_text(&mut reader)?),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Number format per cell style (`cellXfs` index)
fn read_cell_formats<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<NumberFormat>> {
    let styles_xml = match archive.by_name("xl/styles.xml") {
        Ok(file) => file,
        Err(_) => return Ok(Vec::new()),
    };

    let mut reader = Reader::from_reader(BufReader::new(styles_xml));
    reader.config_mut().trim_text(true);

    let mut custom: HashMap<u32, String> = HashMap::new();
    let mut formats = Vec::new();
    let mut in_cell_xfs = false;
    let mut buf = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"numFmt" => {
                    let mut id = None;
                    let mut code = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"numFmtId" => id = attr.unescape_value()?.parse::<u32>().ok(),
                            b"formatCode" => code = attr.unescape_value()?.to_string(),
                            _ => {}
                        }
                    }
                    if let Some(id) = id {
                        custom.insert(id, code);
                    }
                }
                b"cellXfs" => in_cell_xfs = matches!(event, Event::Start(_)),
                b"xf" if in_cell_xfs => {
                    let mut id = 0u32;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"numFmtId"
                            && let Ok(value) = attr.unescape_value()?.parse::<u32>()
                        {
                            id = value;
                        }
                    }
                    let code = custom
                        .get(&id)
                        .map(String::as_str)
                        .or_else(|| builtin_format_code(id))
                        .unwrap_or("General");
                    formats.push(NumberFormat::new(id, code));
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(formats)
}

/// Whether the worksheet's first `sheetView` is the selected tab
fn is_tab_selected<R: Read + Seek>(archive: &mut ZipArchive<R>, part: &str) -> Result<bool> {
    let sheet_xml = match archive.by_name(part) {
        Ok(file) => file,
        Err(_) => return Ok(false),
    };
    let mut reader = Reader::from_reader(BufReader::new(sheet_xml));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheetView" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"tabSelected" {
                            return Ok(is_truthy(&attr.unescape_value()?));
                        }
                    }
                    return Ok(false);
                }
                b"sheetData" => return Ok(false),
                _ => {}
            },
            Event::Eof => return Ok(false),
            _ => {}
        }
        buf.clear();
    }
}
