//! Lazy, uniform row reading for CSV, XLS and XLSX files.
//!
//! Every supported file is exposed as a [`RowSource`]: a pull-based sequence
//! of rows, each a `Vec<String>`. Spreadsheet cells are resolved to strings
//! (booleans as `TRUE`/`FALSE`, dates as `MM/dd/yyyy`, numbers through
//! their number format) and sparse rows are filled out to the header width.
//!
//! ```no_run
//! use tabread_core::{ReaderOptions, open};
//!
//! let mut source = open("people.xlsx", &ReaderOptions::default())?;
//! while source.has_next()? {
//!     if let Some(row) = source.next_row() {
//!         println!("{}", row.join(" | "));
//!     }
//! }
//! source.close()?;
//! # Ok::<(), tabread_core::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod reconstruct;
pub mod records;
pub mod resolve;
pub mod sheet_select;
pub mod source;
pub mod tokenizer;

pub use config::{CsvDialect, ReaderOptions};
pub use error::{Anomaly, CellAnomaly, Error, Result};
pub use reconstruct::{RowBuilder, is_empty_row};
pub use resolve::{CachedResult, CellKind, CellResolver, DateSystem, NumberFormat};
pub use source::{Backend, Row, RowSource, open, open_stream};
pub use tokenizer::{Tokenizer, Tokens};
