//! Delimited-text field tokenizer
//!
//! Turns physical lines into fields. A quoted field that is still open when
//! its line ends leaves the tokenizer *pending*: the next call to
//! [`Tokenizer::tokenize`] continues that field after a `\n`.

use crate::config::CsvDialect;

/// Output of one [`Tokenizer::tokenize`] call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tokens {
    /// Fields completed by this line
    pub fields: Vec<String>,
    /// True when a quoted field is still open and more lines are needed
    pub pending: bool,
}

/// Stateful line tokenizer for one text source
#[derive(Debug, Clone)]
pub struct Tokenizer {
    dialect: CsvDialect,
    pending: Option<String>,
}

impl Tokenizer {
    pub fn new(dialect: CsvDialect) -> Self {
        Self {
            dialect,
            pending: None,
        }
    }

    pub fn dialect(&self) -> &CsvDialect {
        &self.dialect
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Tokenize one physical line (without its line terminator)
    pub fn tokenize(&mut self, line: &str) -> Tokens {
        let chars: Vec<char> = line.chars().collect();
        let continuing = self.pending.is_some();

        // A blank line is "no row", not a row with one empty field
        if chars.is_empty() && !continuing {
            return Tokens::default();
        }

        let separator = self.dialect.separator;
        let quote = self.dialect.quote;
        let escape = self.dialect.escape;
        let strict = self.dialect.strict_quotes;

        let mut fields = Vec::new();
        let mut field = self.pending.take().unwrap_or_default();
        let mut in_quotes = continuing;

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if c == quote {
                if in_quotes && next == Some(quote) {
                    // Doubled quote (also covers escape == quote)
                    field.push(quote);
                    i += 1;
                } else {
                    if !strict && is_embedded_quote(&chars, i, separator) {
                        if self.dialect.ignore_leading_whitespace
                            && !in_quotes
                            && !field.is_empty()
                            && is_blank(&field)
                        {
                            field.clear();
                        } else {
                            field.push(quote);
                        }
                    }
                    in_quotes = !in_quotes;
                }
            } else if c == escape
                && next.is_some_and(|n| n == quote || n == escape || n == separator)
            {
                if let Some(n) = next {
                    field.push(n);
                }
                i += 1;
            } else if c == separator && !in_quotes {
                fields.push(std::mem::take(&mut field));
            } else if !strict || in_quotes {
                field.push(c);
            }
            i += 1;
        }

        if in_quotes {
            field.push('\n');
            self.pending = Some(field);
            Tokens {
                fields,
                pending: true,
            }
        } else {
            fields.push(field);
            Tokens {
                fields,
                pending: false,
            }
        }
    }

    /// Flush a field left open at end of input.
    ///
    /// The continuation newline appended by the last line is dropped.
    pub fn finish(&mut self) -> Option<String> {
        self.pending.take().map(|mut field| {
            if field.ends_with('\n') {
                field.pop();
            }
            field
        })
    }
}

/// A quote that neither starts nor ends a field, e.g. `a,bc"d"ef,g`
fn is_embedded_quote(chars: &[char], i: usize, separator: char) -> bool {
    i > 0
        && chars[i - 1] != separator
        && chars.get(i + 1).is_some_and(|&n| n != separator)
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t')
}
