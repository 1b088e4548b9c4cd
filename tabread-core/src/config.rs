//! Reader options and CSV dialect configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default field separator
pub const DEFAULT_SEPARATOR: char = ',';
/// Default quote character
pub const DEFAULT_QUOTE: char = '"';
/// Default escape character
pub const DEFAULT_ESCAPE: char = '\\';

/// Options accepted by [`crate::open`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Leading physical lines (CSV) or rows (spreadsheets) dropped before the first row
    pub skip_lines: usize,
    /// When false, rows whose cells are all empty or whitespace are skipped
    pub read_empty_rows: bool,
    pub csv: CsvDialect,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            skip_lines: 0,
            read_empty_rows: true,
            csv: CsvDialect::default(),
        }
    }
}

impl ReaderOptions {
    /// Load options from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse options from a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let options: ReaderOptions =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        options.csv.validate()?;
        Ok(options)
    }

    pub fn with_skip_lines(mut self, skip_lines: usize) -> Self {
        self.skip_lines = skip_lines;
        self
    }

    pub fn with_read_empty_rows(mut self, read_empty_rows: bool) -> Self {
        self.read_empty_rows = read_empty_rows;
        self
    }
}

/// Delimiter, quoting and escaping rules for text sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvDialect {
    pub separator: char,
    pub quote: char,
    pub escape: char,
    /// Drop characters that appear outside a quote pair
    pub strict_quotes: bool,
    /// Skip spaces/tabs between a separator and an opening quote
    pub ignore_leading_whitespace: bool,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            quote: DEFAULT_QUOTE,
            escape: DEFAULT_ESCAPE,
            strict_quotes: false,
            ignore_leading_whitespace: true,
        }
    }
}

impl CsvDialect {
    /// The separator must differ from both quote and escape
    pub fn validate(&self) -> Result<()> {
        if self.separator == self.quote || self.separator == self.escape {
            return Err(Error::Config(format!(
                "separator '{}' must differ from quote '{}' and escape '{}'",
                self.separator, self.quote, self.escape
            )));
        }
        Ok(())
    }
}
