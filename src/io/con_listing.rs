//! File table records of CON/LIVE/PIRS packages.

use crate::parser::primitive_parser::{
    make_nul_terminated_string, parse_i16_be, parse_u24_le, parse_u32_be, parse_u8, take_bytes,
};
use chrono::{NaiveDate, NaiveDateTime};
use nom::{IResult, Parser};

/// Size of one record in the file table
pub const LISTING_SIZE: usize = 0x40;

/// Maximum length of the embedded file name
pub const LISTING_NAME_SIZE: usize = 0x28;

pub const FLAG_DIRECTORY: u8 = 0x80;
pub const FLAG_CONTIGUOUS: u8 = 0x40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConListing {
    /// Full path, parent directories joined with `/`
    pub filename: String,
    pub flags: u8,
    pub block_count: u32,
    pub first_block: u32,
    /// Index of the parent directory in the archive's listing table, `None` for the root
    pub path_index: Option<usize>,
    pub size: u32,
    /// DOS encoded timestamp: date in the high 16 bits, time in the low 16 bits
    pub last_write: u32,
}

impl ConListing {
    pub const fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    pub const fn is_contiguous(&self) -> bool {
        self.flags & FLAG_CONTIGUOUS != 0
    }

    /// Decoded `last_write`, `None` when the stored fields are out of range.
    pub fn last_write_time(&self) -> Option<NaiveDateTime> {
        dos_datetime(self.last_write)
    }
}

pub fn dos_datetime(raw: u32) -> Option<NaiveDateTime> {
    let date = raw >> 16;
    let time = raw & 0xFFFF;
    let year = 1980 + (date >> 9) as i32;
    let month = (date >> 5) & 0x0F;
    let day = date & 0x1F;
    let hour = time >> 11;
    let minute = (time >> 5) & 0x3F;
    let second = (time & 0x1F) * 2;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

/// Raw record before path resolution
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RawListing {
    pub name: String,
    pub flags: u8,
    pub block_count: u32,
    pub first_block: u32,
    pub path_index: i16,
    pub size: u32,
    pub last_write: u32,
}

/// Parse one 64-byte record
///
/// ```text
/// 0x00 name (NUL padded)   0x28 flags            0x29 block count (u24 le)
/// 0x2C block count copy    0x2F first block      0x32 path index (i16 be)
/// 0x34 size (u32 be)       0x38 last write       0x3C last access
/// ```
pub(crate) fn parse_raw_listing(i: &[u8]) -> IResult<&[u8], RawListing> {
    let (i, name) = take_bytes(LISTING_NAME_SIZE)(i)?;
    let (i, (flags, block_count, _block_count_copy, first_block)) =
        (parse_u8, parse_u24_le, parse_u24_le, parse_u24_le).parse(i)?;
    let (i, (path_index, size, last_write, _last_access)) =
        (parse_i16_be, parse_u32_be, parse_u32_be, parse_u32_be).parse(i)?;
    Ok((
        i,
        RawListing {
            name: make_nul_terminated_string(name),
            flags,
            block_count,
            first_block,
            path_index,
            size,
            last_write,
        },
    ))
}

/// Parses records until one with an empty name, resolving parent paths on the way.
///
/// Parents always precede their children in the table, so `path_index` only ever points
/// at an entry already pushed to `listings`.
pub(crate) fn parse_listings(table: &[u8]) -> Vec<ConListing> {
    let mut listings: Vec<ConListing> = Vec::new();
    for record in table.chunks_exact(LISTING_SIZE) {
        let Ok((_, raw)) = parse_raw_listing(record) else {
            break;
        };
        if raw.name.is_empty() {
            break;
        }
        let path_index = usize::try_from(raw.path_index).ok();
        let filename = match path_index {
            Some(parent) if parent < listings.len() => {
                format!("{}/{}", listings[parent].filename, raw.name)
            }
            Some(parent) => {
                log::warn!(
                    "Listing {} references parent {parent} which is not parsed yet",
                    raw.name
                );
                raw.name
            }
            None => raw.name,
        };
        listings.push(ConListing {
            filename,
            flags: raw.flags,
            block_count: raw.block_count,
            first_block: raw.first_block,
            path_index,
            size: raw.size,
            last_write: raw.last_write,
        });
    }
    log::debug!("Parsed {} file listings", listings.len());
    listings
}

#[cfg(test)]
pub(crate) fn encode_listing(
    name: &str,
    flags: u8,
    block_count: u32,
    first_block: u32,
    path_index: i16,
    size: u32,
) -> [u8; LISTING_SIZE] {
    let mut record = [0u8; LISTING_SIZE];
    record[..name.len()].copy_from_slice(name.as_bytes());
    record[0x28] = flags | (name.len() as u8 & 0x3F);
    record[0x29..0x2C].copy_from_slice(&block_count.to_le_bytes()[..3]);
    record[0x2C..0x2F].copy_from_slice(&block_count.to_le_bytes()[..3]);
    record[0x2F..0x32].copy_from_slice(&first_block.to_le_bytes()[..3]);
    record[0x32..0x34].copy_from_slice(&path_index.to_be_bytes());
    record[0x34..0x38].copy_from_slice(&size.to_be_bytes());
    // 2011-03-14 09:30:20
    record[0x38..0x3C].copy_from_slice(&0x3E6E_4BCAu32.to_be_bytes());
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_listing() {
        let record = encode_listing("songs.dta", FLAG_CONTIGUOUS, 2, 0x01_0203, 0, 5000);
        let (rest, raw) = parse_raw_listing(&record).unwrap();
        assert!(rest.is_empty());
        assert_eq!(raw.name, "songs.dta");
        assert_eq!(raw.flags & FLAG_CONTIGUOUS, FLAG_CONTIGUOUS);
        assert_eq!(raw.block_count, 2);
        assert_eq!(raw.first_block, 0x01_0203);
        assert_eq!(raw.path_index, 0);
        assert_eq!(raw.size, 5000);
    }

    #[test]
    fn test_parse_listings_resolves_paths() {
        let mut table = Vec::new();
        table.extend_from_slice(&encode_listing("songs", FLAG_DIRECTORY, 0, 0, -1, 0));
        table.extend_from_slice(&encode_listing("mysong", FLAG_DIRECTORY, 0, 0, 0, 0));
        table.extend_from_slice(&encode_listing("mysong.mid", FLAG_CONTIGUOUS, 1, 3, 1, 10));
        table.extend_from_slice(&encode_listing("songs.dta", FLAG_CONTIGUOUS, 1, 4, 0, 10));
        table.extend_from_slice(&[0u8; LISTING_SIZE]);
        // garbage after the terminator is ignored
        table.extend_from_slice(&encode_listing("ghost", 0, 1, 9, -1, 1));

        let listings = parse_listings(&table);
        let names: Vec<&str> = listings.iter().map(|l| l.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["songs", "songs/mysong", "songs/mysong/mysong.mid", "songs/songs.dta"]
        );
        assert!(listings[0].is_directory());
        assert_eq!(listings[0].path_index, None);
        assert_eq!(listings[2].path_index, Some(1));
        assert!(listings[2].is_contiguous());
    }

    #[test]
    fn test_dos_datetime() {
        let time = dos_datetime(0x3E6E_4BCA).unwrap();
        assert_eq!(time.to_string(), "2011-03-14 09:30:20");
        assert!(dos_datetime(0).is_none());
    }
}
