//! Delimited text rows

use std::fmt;
use std::io::BufRead;

use crate::config::CsvDialect;
use crate::error::Result;
use crate::tokenizer::Tokenizer;

use super::SparseRow;

pub struct TextRows {
    reader: Box<dyn BufRead>,
    tokenizer: Tokenizer,
    line: Vec<u8>,
    lines_read: usize,
    eof: bool,
}

impl fmt::Debug for TextRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextRows")
            .field("dialect", self.tokenizer.dialect())
            .field("lines_read", &self.lines_read)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl TextRows {
    pub fn new(reader: Box<dyn BufRead>, dialect: CsvDialect) -> Self {
        Self {
            reader,
            tokenizer: Tokenizer::new(dialect),
            line: Vec::new(),
            lines_read: 0,
            eof: false,
        }
    }

    /// Read one physical line without its terminator; `None` at end of input
    fn read_line(&mut self) -> Result<Option<String>> {
        if self.eof {
            return Ok(None);
        }
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line)? == 0 {
            self.eof = true;
            return Ok(None);
        }
        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        }
        self.lines_read += 1;
        Ok(Some(String::from_utf8_lossy(&self.line).into_owned()))
    }

    /// Drop physical lines, ignoring quoting
    pub fn skip_lines(&mut self, count: usize) -> Result<usize> {
        let mut skipped = 0;
        while skipped < count && self.read_line()?.is_some() {
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Next logical record, joining lines while a quoted field is open
    pub fn next_cells(&mut self) -> Result<Option<SparseRow>> {
        let mut fields = Vec::new();
        loop {
            match self.read_line()? {
                Some(line) => {
                    let tokens = self.tokenizer.tokenize(&line);
                    fields.extend(tokens.fields);
                    if !tokens.pending {
                        break;
                    }
                }
                None => {
                    if let Some(field) = self.tokenizer.finish() {
                        fields.push(field);
                        break;
                    }
                    if fields.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
            }
        }

        Ok(Some(
            fields
                .into_iter()
                .enumerate()
                .map(|(column, value)| (column as u32, value))
                .collect(),
        ))
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn rows(content: &str) -> TextRows {
        TextRows::new(
            Box::new(Cursor::new(content.as_bytes().to_vec())),
            CsvDialect::default(),
        )
    }

    fn values(cells: SparseRow) -> Vec<String> {
        cells.into_iter().map(|(_, v)| v).collect()
    }

    #[test]
    fn test_reads_records() {
        let mut r = rows("a,b\r\n1,2\n");
        assert_eq!(values(r.next_cells().unwrap().unwrap()), vec!["a", "b"]);
        assert_eq!(values(r.next_cells().unwrap().unwrap()), vec!["1", "2"]);
        assert!(r.next_cells().unwrap().is_none());
        assert!(r.next_cells().unwrap().is_none());
    }

    #[test]
    fn test_multi_line_record_counts_lines() {
        let mut r = rows("id,note\n1,\"two\nlines\"\n");
        r.next_cells().unwrap();
        let cells = r.next_cells().unwrap().unwrap();
        assert_eq!(cells, vec![(0, "1".to_string()), (1, "two\nlines".to_string())]);
        assert_eq!(r.lines_read(), 3);
    }

    #[test]
    fn test_unterminated_quote_at_eof() {
        let mut r = rows("a,\"open");
        assert_eq!(values(r.next_cells().unwrap().unwrap()), vec!["a", "open"]);
        assert!(r.next_cells().unwrap().is_none());
    }

    #[test]
    fn test_blank_line_is_an_empty_record() {
        let mut r = rows("a\n\nb");
        r.next_cells().unwrap();
        assert_eq!(r.next_cells().unwrap(), Some(Vec::new()));
        assert_eq!(values(r.next_cells().unwrap().unwrap()), vec!["b"]);
    }

    #[test]
    fn test_skip_lines_ignores_quotes() {
        let mut r = rows("\"junk\nh\nx\n");
        assert_eq!(r.skip_lines(1).unwrap(), 1);
        assert_eq!(values(r.next_cells().unwrap().unwrap()), vec!["h"]);
        assert_eq!(r.skip_lines(10).unwrap(), 1);
        assert!(r.next_cells().unwrap().is_none());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut r = TextRows::new(
            Box::new(Cursor::new(vec![b'a', 0xFF, b',', b'b'])),
            CsvDialect::default(),
        );
        assert_eq!(
            values(r.next_cells().unwrap().unwrap()),
            vec!["a\u{FFFD}", "b"]
        );
    }
}
