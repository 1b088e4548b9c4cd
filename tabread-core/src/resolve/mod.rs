//! Cell value resolution: typed cell payloads to canonical strings

pub mod number_format;

pub use number_format::{DateSystem, NumberFormat};

use crate::error::CellAnomaly;

/// Declared type of a cell as found in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKind {
    Boolean,
    Error,
    /// Formula cell; only its last cached result is surfaced
    Formula(CachedResult),
    InlineString,
    /// ISO 8601 date text
    Date,
    /// Index into the shared-string table
    SharedString,
    Number,
    /// A type tag this reader does not know; rendered literally
    Unknown(String),
}

/// Type of a formula's cached result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedResult {
    Number,
    Text,
    Boolean,
    Error,
}

impl CellKind {
    /// Map an XLSX `t` attribute (absent means number)
    pub fn from_xlsx_type(t: Option<&str>, has_formula: bool) -> CellKind {
        let kind = match t {
            None | Some("n") => CellKind::Number,
            Some("b") => CellKind::Boolean,
            Some("e") => CellKind::Error,
            Some("s") => CellKind::SharedString,
            Some("inlineStr") => CellKind::InlineString,
            Some("str") => CellKind::Formula(CachedResult::Text),
            Some("d") => CellKind::Date,
            Some(other) => CellKind::Unknown(other.to_string()),
        };
        if !has_formula {
            return kind;
        }
        match kind {
            CellKind::Number => CellKind::Formula(CachedResult::Number),
            CellKind::Boolean => CellKind::Formula(CachedResult::Boolean),
            CellKind::Error => CellKind::Formula(CachedResult::Error),
            CellKind::InlineString => CellKind::Formula(CachedResult::Text),
            other => other,
        }
    }
}

/// Resolves cell payloads against immutable workbook context.
///
/// Resolution depends only on `(kind, raw, format)` plus the shared-string
/// table and date system fixed at open time; no row state is involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellResolver<'a> {
    shared_strings: &'a [String],
    date_system: DateSystem,
}

impl<'a> CellResolver<'a> {
    pub fn new(shared_strings: &'a [String], date_system: DateSystem) -> Self {
        Self {
            shared_strings,
            date_system,
        }
    }

    pub fn resolve(
        &self,
        kind: &CellKind,
        raw: &str,
        format: Option<&NumberFormat>,
    ) -> Result<String, CellAnomaly> {
        match kind {
            CellKind::Boolean => Ok(resolve_boolean(raw)),
            CellKind::Error => Ok(raw.to_string()),
            CellKind::Formula(cached) => match cached {
                CachedResult::Number => self.resolve_number(raw, format),
                CachedResult::Text => Ok(raw.to_string()),
                CachedResult::Boolean => Ok(resolve_boolean(raw)),
                CachedResult::Error => Ok(raw.to_string()),
            },
            CellKind::InlineString => Ok(raw.to_string()),
            CellKind::Date => number_format::format_iso_date(raw)
                .ok_or_else(|| CellAnomaly::BadDate(raw.to_string())),
            CellKind::SharedString => self.resolve_shared_string(raw),
            CellKind::Number => self.resolve_number(raw, format),
            CellKind::Unknown(tag) => Err(CellAnomaly::UnknownType {
                kind: tag.clone(),
                raw: raw.to_string(),
            }),
        }
    }

    fn resolve_shared_string(&self, raw: &str) -> Result<String, CellAnomaly> {
        let index = raw
            .trim()
            .parse::<usize>()
            .map_err(|_| CellAnomaly::BadSharedStringIndex(raw.to_string()))?;
        self.shared_strings
            .get(index)
            .cloned()
            .ok_or(CellAnomaly::SharedStringOutOfRange {
                index,
                len: self.shared_strings.len(),
            })
    }

    fn resolve_number(
        &self,
        raw: &str,
        format: Option<&NumberFormat>,
    ) -> Result<String, CellAnomaly> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(String::new());
        }
        let value = trimmed
            .parse::<f64>()
            .map_err(|_| CellAnomaly::BadNumber(raw.to_string()))?;

        let Some(format) = format else {
            return Ok(number_format::format_plain(value));
        };
        if format.is_date() {
            // Out-of-range serials keep their numeric rendering
            return Ok(number_format::format_date(value, self.date_system)
                .unwrap_or_else(|| number_format::format_plain(value)));
        }
        Ok(number_format::format_decimal(value, &format.code))
    }
}

fn resolve_boolean(raw: &str) -> String {
    let token = raw.trim();
    let falsy = token.is_empty() || token == "0" || token.eq_ignore_ascii_case("false");
    let text = if falsy { "FALSE" } else { "TRUE" };
    text.to_string()
}
