//! Reader for the parenthesized DTA metadata format.
//!
//! Nodes look like `(name value value (child ...))`. Entering a node finds its matching
//! closing parenthesis up front, so a missing one is reported before any content is read.
//! Text is Latin-1 unless the file starts with a UTF-8 byte order mark or the node being
//! read declares `(encoding utf8)`.

use crate::parser::primitive_parser::make_string;
use crate::parser::text_cursor::{is_whitespace, text_to_string, TextCursor, TextGrammar};
use crate::ScanError;
use std::borrow::Cow;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

pub struct DtaGrammar;

impl TextGrammar for DtaGrammar {
    fn skip_whitespace(data: &[u8], mut position: usize, next: usize) -> usize {
        while position < next {
            match data[position] {
                b';' => {
                    while position < next && data[position] != b'\n' {
                        position += 1;
                    }
                }
                b if is_whitespace(b) => position += 1,
                _ => break,
            }
        }
        position
    }
}

pub struct DtaReader<'a> {
    cursor: TextCursor<'a, DtaGrammar>,
    /// `next` of every enclosing node
    node_ends: Vec<usize>,
    file_is_utf8: bool,
    utf8: bool,
}

impl<'a> DtaReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let (data, file_is_utf8) = match data.strip_prefix(UTF8_BOM) {
            Some(rest) => (rest, true),
            None => (data, false),
        };
        let mut cursor = TextCursor::new(Cow::Borrowed(data));
        cursor.skip_whitespace();
        Self {
            cursor,
            node_ends: Vec::new(),
            file_is_utf8,
            utf8: file_is_utf8,
        }
    }

    pub const fn depth(&self) -> usize {
        self.node_ends.len()
    }

    pub const fn is_utf8(&self) -> bool {
        self.utf8
    }

    pub fn set_utf8(&mut self, utf8: bool) {
        self.utf8 = utf8;
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor.peek().is_none()
    }

    /// Enters the node at the cursor. `Ok(false)` when the cursor is not on a `(`.
    pub fn start_node(&mut self) -> Result<bool, ScanError> {
        self.cursor.skip_whitespace();
        if self.cursor.peek() != Some(b'(') {
            return Ok(false);
        }
        let open = self.cursor.position();
        let close = matching_paren(self.cursor.data(), open, self.cursor.next())?;
        self.node_ends.push(self.cursor.next());
        self.cursor.position = open + 1;
        self.cursor.next = close;
        if self.depth() == 1 {
            self.utf8 = self.file_is_utf8 || self.declares_utf8()?;
        }
        self.cursor.skip_whitespace();
        Ok(true)
    }

    /// True when a direct child of the node at the cursor is `(encoding utf8)`.
    fn declares_utf8(&self) -> Result<bool, ScanError> {
        let data = self.cursor.data();
        let end = self.cursor.next();
        let mut position = self.cursor.position();
        while position < end {
            position = DtaGrammar::skip_whitespace(data, position, end);
            if position >= end {
                break;
            }
            match data[position] {
                b'(' => {
                    let close = matching_paren(data, position, end)?;
                    if is_utf8_encoding(&data[position + 1..close]) {
                        return Ok(true);
                    }
                    position = close + 1;
                }
                quote @ (b'"' | b'\'') => {
                    position = find_byte(data, position + 1, end, quote).map_or(end, |p| p + 1);
                }
                b'{' => {
                    position = find_closing_brace(data, position, end).map_or(end, |p| p + 1);
                }
                _ => position += 1,
            }
        }
        Ok(false)
    }

    /// Leaves the current node, skipping whatever was not read.
    pub fn end_node(&mut self) -> Result<(), ScanError> {
        let Some(parent_end) = self.node_ends.pop() else {
            return Err(ScanError::parsing("DTA end_node without a matching start_node"));
        };
        self.cursor.position = self.cursor.next() + 1;
        self.cursor.next = parent_end;
        self.cursor.skip_whitespace();
        if self.node_ends.is_empty() {
            self.utf8 = self.file_is_utf8;
        }
        Ok(())
    }

    /// First token of the node: bare or single quoted.
    pub fn node_name(&mut self) -> String {
        self.cursor.skip_whitespace();
        let name = if self.cursor.peek() == Some(b'\'') {
            self.cursor.position += 1;
            let name = self.cursor.take_token(b"'()");
            let name = String::from_utf8_lossy(name).into_owned();
            if self.cursor.peek() == Some(b'\'') {
                self.cursor.position += 1;
            }
            name
        } else {
            String::from_utf8_lossy(self.cursor.take_token(b"()")).into_owned()
        };
        self.cursor.skip_whitespace();
        name
    }

    fn decode(&self, bytes: &[u8]) -> String {
        if self.utf8 {
            text_to_string(bytes)
        } else {
            make_string(bytes)
        }
    }

    /// Text in any of the four styles.
    ///
    /// `"..."` and `'...'` end at the next matching quote, `{...}` at the matching brace and
    /// may contain quotes, bare text ends at whitespace or a parenthesis.
    pub fn extract_text(&mut self) -> Result<String, ScanError> {
        self.cursor.skip_whitespace();
        let start = self.cursor.position();
        let end = self.cursor.next();
        let (text_start, text_end, resume) = match self.cursor.peek() {
            None | Some(b')') => {
                return Err(ScanError::parsing(format!("Missing DTA text at {start}")));
            }
            Some(quote @ (b'"' | b'\'')) => {
                let close = find_byte(self.cursor.data(), start + 1, end, quote).ok_or_else(|| {
                    ScanError::parsing(format!("Unterminated DTA text starting at {start}"))
                })?;
                (start + 1, close, close + 1)
            }
            Some(b'{') => {
                let close = find_closing_brace(self.cursor.data(), start, end).ok_or_else(|| {
                    ScanError::parsing(format!("Unterminated DTA braces starting at {start}"))
                })?;
                (start + 1, close, close + 1)
            }
            Some(_) => {
                let token_end = start + self.cursor.take_token(b"()").len();
                (start, token_end, token_end)
            }
        };
        let text = self.decode(self.cursor.slice(text_start, text_end));
        self.cursor.position = resume;
        self.cursor.skip_whitespace();
        Ok(text)
    }

    fn expected(&self, what: &str) -> ScanError {
        ScanError::parsing(format!(
            "Expected DTA {what} at {}",
            self.cursor.position()
        ))
    }

    pub fn extract_i32(&mut self) -> Result<i32, ScanError> {
        self.cursor.extract_i32().ok_or_else(|| self.expected("integer"))
    }

    pub fn extract_u32(&mut self) -> Result<u32, ScanError> {
        self.cursor.extract_u32().ok_or_else(|| self.expected("integer"))
    }

    pub fn extract_i64(&mut self) -> Result<i64, ScanError> {
        self.cursor.extract_i64().ok_or_else(|| self.expected("integer"))
    }

    pub fn extract_f32(&mut self) -> Result<f32, ScanError> {
        self.cursor.extract_f32().ok_or_else(|| self.expected("number"))
    }

    pub fn extract_bool(&mut self) -> bool {
        self.cursor.extract_bool()
    }

    /// Every remaining integer of the node, in order.
    pub fn extract_list_i32(&mut self) -> Result<Vec<i32>, ScanError> {
        let mut values = Vec::new();
        while self.cursor.peek().is_some_and(|b| b != b')') {
            values.push(self.extract_i32()?);
        }
        Ok(values)
    }

    /// Every remaining text value of the node, in order.
    pub fn extract_list_text(&mut self) -> Result<Vec<String>, ScanError> {
        let mut values = Vec::new();
        while self.cursor.peek().is_some_and(|b| b != b')' && b != b'(') {
            values.push(self.extract_text()?);
        }
        Ok(values)
    }
}

/// Index of the `)` matching the `(` at `open`, searching up to `end`.
fn matching_paren(data: &[u8], open: usize, end: usize) -> Result<usize, ScanError> {
    let mut depth = 0usize;
    let mut position = open;
    while position < end {
        match data[position] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(position);
                }
            }
            quote @ (b'"' | b'\'') => {
                position = find_byte(data, position + 1, end, quote).ok_or_else(|| {
                    ScanError::parsing(format!("Unterminated DTA text starting at {position}"))
                })?;
            }
            b'{' => {
                position = find_closing_brace(data, position, end).ok_or_else(|| {
                    ScanError::parsing(format!(
                        "Unterminated DTA braces starting at {position}"
                    ))
                })?;
            }
            b';' => {
                while position < end && data[position] != b'\n' {
                    position += 1;
                }
                continue;
            }
            _ => {}
        }
        position += 1;
    }
    Err(ScanError::parsing(format!(
        "Unbalanced DTA node starting at {open}"
    )))
}

/// `body` is the inside of an `(encoding utf8)` node, the value optionally quoted.
fn is_utf8_encoding(body: &[u8]) -> bool {
    let mut tokens = body
        .split(|&b| is_whitespace(b))
        .filter(|token| !token.is_empty())
        .map(unquote);
    tokens
        .next()
        .is_some_and(|name| name.eq_ignore_ascii_case(b"encoding"))
        && tokens
            .next()
            .is_some_and(|value| value.eq_ignore_ascii_case(b"utf8"))
}

fn unquote(token: &[u8]) -> &[u8] {
    match token {
        [first, inner @ .., last] if first == last && matches!(first, b'"' | b'\'') => inner,
        _ => token,
    }
}

fn find_byte(data: &[u8], from: usize, end: usize, byte: u8) -> Option<usize> {
    data[from.min(end)..end]
        .iter()
        .position(|&b| b == byte)
        .map(|offset| from + offset)
}

fn find_closing_brace(data: &[u8], open: usize, end: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (position, &byte) in data.iter().enumerate().take(end).skip(open) {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(position);
                }
            }
            _ => {}
        }
    }
    None
}
