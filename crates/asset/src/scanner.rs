//! Line tokenizer shared by the OBJ and MTL parsers.
//!
//! Words are maximal runs of non-delimiter characters. Delimiters are tab,
//! space, `(`, `)` and `"`.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("unexpected end of line")]
    EndOfLine,
    #[error("malformed number '{word}'")]
    Malformed { word: String },
}

/// Document text without a leading UTF-8 byte-order mark.
pub fn strip_bom(src: &str) -> &str {
    src.strip_prefix('\u{FEFF}').unwrap_or(src)
}

#[inline]
fn is_delimiter(c: char) -> bool {
    matches!(c, '\t' | ' ' | '(' | ')' | '"')
}

/// Cursor over a single line of text.
#[derive(Clone, Debug)]
pub struct Scanner<'a> {
    line: &'a str,
    cursor: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(line: &'a str) -> Self {
        Self { line, cursor: 0 }
    }

    /// Next word, or `None` at end of line. The cursor ends up past the word
    /// and the single delimiter that follows it.
    pub fn next_word(&mut self) -> Option<&'a str> {
        let rest = self.line.get(self.cursor..)?;
        let start = self.cursor + rest.find(|c: char| !is_delimiter(c))?;

        let tail = &self.line[start..];
        let len = tail.find(is_delimiter).unwrap_or(tail.len());
        let word = &tail[..len];

        // Step over one trailing delimiter (all delimiters are single-byte).
        self.cursor = (start + len + 1).min(self.line.len());
        Some(word)
    }

    pub fn next_int(&mut self) -> Result<i64, ScanError> {
        let word = self.next_word().ok_or(ScanError::EndOfLine)?;
        word.parse::<i64>().map_err(|_| ScanError::Malformed {
            word: word.to_owned(),
        })
    }

    /// Non-finite values (`nan`, `inf`, overflow) count as malformed.
    pub fn next_float(&mut self) -> Result<f32, ScanError> {
        let word = self.next_word().ok_or(ScanError::EndOfLine)?;
        match word.parse::<f32>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(ScanError::Malformed {
                word: word.to_owned(),
            }),
        }
    }
}
