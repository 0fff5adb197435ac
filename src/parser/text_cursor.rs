//! Cursor shared by the `.chart`, `.ini` and `.dta` readers.
//!
//! The cursor tracks `position` and `next`, the end of the current logical unit (a line for
//! `.chart` and `.ini`, a parenthesized node for `.dta`). Numbers are parsed straight off
//! the ASCII bytes, saturating to the target type's bounds instead of wrapping.

use crate::parser::primitive_parser::make_string;
use encoding_rs::{UTF_16BE, UTF_16LE};
use std::borrow::Cow;
use std::marker::PhantomData;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Strips a UTF-8 byte order mark and transcodes UTF-16 input to UTF-8.
pub fn decode_text(data: &[u8]) -> Cow<'_, [u8]> {
    if let Some(rest) = data.strip_prefix(UTF8_BOM) {
        return Cow::Borrowed(rest);
    }
    let encoding = if data.starts_with(UTF16_LE_BOM) {
        UTF_16LE
    } else if data.starts_with(UTF16_BE_BOM) {
        UTF_16BE
    } else {
        return Cow::Borrowed(data);
    };
    log::debug!("Transcoding {} text to UTF-8", encoding.name());
    let (text, _) = encoding.decode_with_bom_removal(data);
    Cow::Owned(text.into_owned().into_bytes())
}

/// UTF-8 when valid, Windows-1252 otherwise.
pub fn text_to_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => make_string(bytes),
    }
}

/// Whitespace and comment rules of one text format.
pub trait TextGrammar {
    /// First position at or after `position` that is not whitespace, capped at `next`.
    fn skip_whitespace(data: &[u8], position: usize, next: usize) -> usize;
}

/// Bytes up to and including the space character count as whitespace.
pub const fn is_whitespace(byte: u8) -> bool {
    byte <= b' '
}

/// Integer types that can be parsed with saturation.
pub trait TextInteger: Copy {
    const SIGNED: bool;
    /// Largest magnitude of a positive value
    const MAX_MAGNITUDE: u64;
    /// Largest magnitude of a negative value
    const MIN_MAGNITUDE: u64;

    fn from_magnitude(magnitude: u64, negative: bool) -> Self;
}

macro_rules! text_unsigned {
    ($($t:ty),*) => {$(
        impl TextInteger for $t {
            const SIGNED: bool = false;
            const MAX_MAGNITUDE: u64 = <$t>::MAX as u64;
            const MIN_MAGNITUDE: u64 = 0;

            fn from_magnitude(magnitude: u64, _negative: bool) -> Self {
                magnitude as $t
            }
        }
    )*};
}

macro_rules! text_signed {
    ($($t:ty),*) => {$(
        impl TextInteger for $t {
            const SIGNED: bool = true;
            const MAX_MAGNITUDE: u64 = <$t>::MAX as u64;
            const MIN_MAGNITUDE: u64 = <$t>::MAX as u64 + 1;

            fn from_magnitude(magnitude: u64, negative: bool) -> Self {
                if !negative {
                    magnitude as $t
                } else if magnitude == Self::MIN_MAGNITUDE {
                    <$t>::MIN
                } else {
                    -(magnitude as $t)
                }
            }
        }
    )*};
}

text_unsigned!(u8, u16, u32, u64);
text_signed!(i16, i32, i64);

#[derive(Debug, Clone)]
pub struct TextCursor<'a, G> {
    data: Cow<'a, [u8]>,
    pub(crate) position: usize,
    pub(crate) next: usize,
    grammar: PhantomData<G>,
}

impl<'a, G: TextGrammar> TextCursor<'a, G> {
    pub fn new(data: Cow<'a, [u8]>) -> Self {
        let next = data.len();
        Self {
            data,
            position: 0,
            next,
            grammar: PhantomData,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[allow(clippy::missing_const_for_fn)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub const fn position(&self) -> usize {
        self.position
    }

    pub const fn next(&self) -> usize {
        self.next
    }

    pub fn is_at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Current byte when it lies before `next`.
    pub fn peek(&self) -> Option<u8> {
        if self.position < self.next {
            self.data.get(self.position).copied()
        } else {
            None
        }
    }

    pub fn skip_whitespace(&mut self) {
        self.position = G::skip_whitespace(&self.data, self.position, self.next);
    }

    /// Bytes between `start` and `end`.
    pub fn slice(&self, start: usize, end: usize) -> &[u8] {
        &self.data[start..end]
    }

    /// Remainder of the current unit with trailing whitespace removed, consuming it.
    pub fn take_rest(&mut self) -> &[u8] {
        let start = self.position;
        let mut end = self.next;
        while end > start && is_whitespace(self.data[end - 1]) {
            end -= 1;
        }
        self.position = self.next;
        &self.data[start..end]
    }

    /// Index of the next `\n` at or after `from`, or the end of the buffer.
    pub fn find_line_end(&self, from: usize) -> usize {
        self.data[from.min(self.data.len())..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(self.data.len(), |offset| from + offset)
    }

    /// Starts the first non-blank line at or after `position`.
    pub fn seek_line(&mut self, mut position: usize) {
        loop {
            self.position = position.min(self.data.len());
            self.next = self.find_line_end(self.position);
            self.skip_whitespace();
            if self.position < self.next || self.next >= self.data.len() {
                return;
            }
            position = self.next + 1;
        }
    }

    /// Starts the next non-blank line.
    pub fn next_line(&mut self) {
        self.seek_line(self.next + 1);
    }

    /// Bytes up to the first whitespace or one of `stops`, consuming them.
    pub fn take_token(&mut self, stops: &[u8]) -> &[u8] {
        let end = self.next.min(self.data.len());
        let start = self.position;
        let mut position = start;
        while position < end
            && !is_whitespace(self.data[position])
            && !stops.contains(&self.data[position])
        {
            position += 1;
        }
        self.position = position;
        &self.data[start..position]
    }

    /// Saturating integer parse with optional `+`/`-` sign.
    ///
    /// `None` leaves the cursor untouched when no digit is found.
    pub fn extract_integer<T: TextInteger>(&mut self) -> Option<T> {
        let end = self.next.min(self.data.len());
        let mut position = self.position;
        let mut negative = false;
        match self.data.get(position) {
            Some(b'-') if T::SIGNED => {
                negative = true;
                position += 1;
            }
            Some(b'+') => position += 1,
            _ => {}
        }
        if position >= end || !self.data[position].is_ascii_digit() {
            return None;
        }

        let limit = if negative {
            T::MIN_MAGNITUDE
        } else {
            T::MAX_MAGNITUDE
        };
        let mut magnitude = 0u64;
        while position < end && self.data[position].is_ascii_digit() {
            let digit = u64::from(self.data[position] - b'0');
            magnitude = magnitude
                .checked_mul(10)
                .and_then(|m| m.checked_add(digit))
                .map_or(limit, |m| m.min(limit));
            position += 1;
        }
        self.position = position;
        self.skip_whitespace();
        Some(T::from_magnitude(magnitude, negative))
    }

    pub fn extract_u64(&mut self) -> Option<u64> {
        self.extract_integer()
    }

    pub fn extract_u32(&mut self) -> Option<u32> {
        self.extract_integer()
    }

    pub fn extract_i64(&mut self) -> Option<i64> {
        self.extract_integer()
    }

    pub fn extract_i32(&mut self) -> Option<i32> {
        self.extract_integer()
    }

    /// `[+-]digits[.digits]`, no exponent.
    pub fn extract_f64(&mut self) -> Option<f64> {
        let end = self.next.min(self.data.len());
        let start = self.position;
        let mut position = start;
        if matches!(self.data.get(position), Some(b'-' | b'+')) {
            position += 1;
        }
        let digits_start = position;
        while position < end && self.data[position].is_ascii_digit() {
            position += 1;
        }
        let mut has_digits = position > digits_start;
        if position < end && self.data[position] == b'.' {
            position += 1;
            let fraction_start = position;
            while position < end && self.data[position].is_ascii_digit() {
                position += 1;
            }
            has_digits |= position > fraction_start;
        }
        if !has_digits {
            return None;
        }
        let text = std::str::from_utf8(&self.data[start..position]).ok()?;
        let value = text.parse::<f64>().ok()?;
        self.position = position;
        self.skip_whitespace();
        Some(value)
    }

    pub fn extract_f32(&mut self) -> Option<f32> {
        self.extract_f64().map(|v| v as f32)
    }

    /// `1` or a case-insensitive `true` are true; any other token is false.
    pub fn extract_bool(&mut self) -> bool {
        let end = self.next.min(self.data.len());
        let start = self.position;
        let mut position = start;
        while position < end && !is_whitespace(self.data[position]) {
            position += 1;
        }
        let token = &self.data[start..position];
        let value = token == b"1" || token.eq_ignore_ascii_case(b"true");
        self.position = position;
        self.skip_whitespace();
        value
    }
}
