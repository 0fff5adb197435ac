//! Forward-only read cursor over a borrowed byte buffer with nested boundaries.

use crate::ScanError;
use nom::IResult;

#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
    boundary: usize,
    saved_boundaries: Vec<usize>,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            boundary: data.len(),
            saved_boundaries: Vec::new(),
        }
    }

    pub const fn position(&self) -> usize {
        self.position
    }

    /// End of the innermost entered region.
    pub const fn boundary(&self) -> usize {
        self.boundary
    }

    pub const fn depth(&self) -> usize {
        self.saved_boundaries.len()
    }

    pub const fn is_at_boundary(&self) -> bool {
        self.position >= self.boundary
    }

    pub const fn remaining_len(&self) -> usize {
        self.boundary - self.position
    }

    /// Bytes left before the current boundary.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..self.boundary]
    }

    /// The full underlying buffer.
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn peek(&self) -> Option<u8> {
        self.remaining().first().copied()
    }

    /// Moves the cursor; the target must stay inside the current region.
    pub fn seek(&mut self, position: usize) {
        assert!(
            position <= self.boundary,
            "seek to {position} past boundary {}",
            self.boundary
        );
        self.position = position;
    }

    pub fn skip(&mut self, count: usize) -> Option<()> {
        if count > self.remaining_len() {
            return None;
        }
        self.position += count;
        Some(())
    }

    pub fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        if count > self.remaining_len() {
            return None;
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Some(slice)
    }

    /// Applies a primitive parser to the bytes before the boundary, advancing on success.
    pub fn parse<T>(&mut self, parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], T>) -> Option<T> {
        let (rest, value) = parser(self.remaining()).ok()?;
        self.position = self.boundary - rest.len();
        Some(value)
    }

    /// Like `parse` but keeps nom's error so callers can tell truncation from bad data.
    pub fn try_parse<T>(
        &mut self,
        parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], T>,
    ) -> Result<T, nom::Err<nom::error::Error<&'a [u8]>>> {
        let (rest, value) = parser(self.remaining())?;
        self.position = self.boundary - rest.len();
        Ok(value)
    }

    /// Opens a nested region of `length` bytes starting at the current position.
    pub fn enter(&mut self, length: usize) -> Result<(), ScanError> {
        if length > self.remaining_len() {
            return Err(ScanError::parsing(format!(
                "section of {length} bytes at {} overruns its parent ending at {}",
                self.position, self.boundary
            )));
        }
        self.saved_boundaries.push(self.boundary);
        self.boundary = self.position + length;
        Ok(())
    }

    /// Skips whatever is left of the innermost region and restores the parent boundary.
    ///
    /// Panics when no region was entered.
    pub fn exit(&mut self) {
        let parent = self
            .saved_boundaries
            .pop()
            .expect("exit called without a matching enter");
        self.position = self.boundary;
        self.boundary = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::primitive_parser::{parse_u16_be, parse_u32_be};

    #[test]
    fn test_nested_regions() {
        let data = [0x00, 0x01, 0xAA, 0xBB, 0xCC, 0x00, 0x02];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.parse(parse_u16_be), Some(1));
        cursor.enter(3).unwrap();
        assert_eq!(cursor.remaining(), &[0xAA, 0xBB, 0xCC]);
        // four bytes do not fit in the region
        assert_eq!(cursor.parse(parse_u32_be), None);
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.take(1), Some(&[0xAA][..]));
        cursor.exit();
        assert_eq!(cursor.position(), 5);
        assert_eq!(cursor.parse(parse_u16_be), Some(2));
        assert!(cursor.is_at_boundary());
    }

    #[test]
    fn test_enter_past_parent_fails() {
        let data = [0u8; 4];
        let mut cursor = ByteCursor::new(&data);
        cursor.enter(2).unwrap();
        assert!(cursor.enter(3).is_err());
        assert_eq!(cursor.depth(), 1);
    }

    #[test]
    #[should_panic(expected = "without a matching enter")]
    fn test_exit_without_enter() {
        let data = [0u8; 4];
        let mut cursor = ByteCursor::new(&data);
        cursor.exit();
    }
}
