//! Error types for opening and iterating row sources

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Failures that stop a read.
///
/// Per-cell problems never show up here; they are [`CellAnomaly`] values
/// absorbed by the row sources.
#[derive(Debug, Error)]
pub enum Error {
    /// The input file does not exist or is not a regular file
    #[error("Not found or not a file: {}", .0.display())]
    NotFound(PathBuf),

    /// The container could not be opened as the expected format
    #[error("Failed to open {} as {format}: {reason}", .path.display())]
    Malformed {
        path: PathBuf,
        format: &'static str,
        reason: String,
    },

    /// A part the container requires is absent
    #[error("missing {0}")]
    MissingPart(String),

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Error {
    pub(crate) fn malformed(
        path: impl Into<PathBuf>,
        format: &'static str,
        reason: impl ToString,
    ) -> Self {
        Error::Malformed {
            path: path.into(),
            format,
            reason: reason.to_string(),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(e.into())
    }
}

/// A recoverable problem with a single cell.
///
/// The cell degrades to [`CellAnomaly::fallback`] and the row continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellAnomaly {
    #[error("failed to parse shared string index '{0}'")]
    BadSharedStringIndex(String),

    #[error("shared string index {index} is out of range (table has {len} entries)")]
    SharedStringOutOfRange { index: usize, len: usize },

    #[error("unparseable numeric literal '{0}'")]
    BadNumber(String),

    #[error("unparseable ISO 8601 date '{0}'")]
    BadDate(String),

    #[error("unknown cell type '{kind}'")]
    UnknownType { kind: String, raw: String },
}

impl CellAnomaly {
    /// The string the cell is rendered as instead
    pub fn fallback(&self) -> String {
        match self {
            CellAnomaly::BadSharedStringIndex(_) | CellAnomaly::SharedStringOutOfRange { .. } => {
                String::new()
            }
            CellAnomaly::BadNumber(raw) | CellAnomaly::BadDate(raw) => raw.clone(),
            CellAnomaly::UnknownType { raw, .. } => raw.clone(),
        }
    }
}

/// An anomaly together with where it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    /// Zero-based ordinal of the row among rows read from the source
    pub row: usize,
    /// Zero-based column index
    pub column: u32,
    pub kind: CellAnomaly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallbacks() {
        assert_eq!(
            CellAnomaly::SharedStringOutOfRange { index: 9, len: 2 }.fallback(),
            ""
        );
        assert_eq!(CellAnomaly::BadNumber("1,5".to_string()).fallback(), "1,5");
        assert_eq!(CellAnomaly::BadDate("soon".to_string()).fallback(), "soon");
        assert_eq!(
            CellAnomaly::UnknownType {
                kind: "q".to_string(),
                raw: "abc".to_string()
            }
            .fallback(),
            "abc"
        );
    }

    #[test]
    fn test_malformed_message_names_path() {
        let err = Error::malformed("/tmp/book.xlsx", "XLSX", "missing xl/workbook.xml");
        let msg = err.to_string();
        assert!(msg.contains("/tmp/book.xlsx"));
        assert!(msg.contains("missing xl/workbook.xml"));
    }
}
