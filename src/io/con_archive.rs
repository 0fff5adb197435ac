//! Reader for Xbox 360 STFS packages (`CON `, `LIVE` and `PIRS` magic).
//!
//! Data blocks are 4 KiB. Every 170 data blocks the package inserts a level 0 hash block
//! holding the SHA-1 and the next-block pointer of each data block in that section, and
//! every 170² data blocks a level 1 hash block. Packages built with two hash table copies
//! double every hash block, which is what the `shift` bit accounts for.

use crate::io::con_listing::{parse_listings, ConListing};
use crate::parser::primitive_parser::{parse_u16_le, parse_u24_be, parse_u24_le, parse_u32_be};
use crate::ScanError;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

pub const CON_TAG: [u8; 4] = *b"CON ";
pub const LIVE_TAG: [u8; 4] = *b"LIVE";
pub const PIRS_TAG: [u8; 4] = *b"PIRS";

/// Header size field, used to tell the two hash table layouts apart
pub const METADATA_POSITION: u64 = 0x340;
pub const FILE_TABLE_BLOCK_COUNT_POSITION: u64 = 0x37C;
pub const FILE_TABLE_FIRST_BLOCK_POSITION: u64 = 0x37E;

pub const DATA_START: u64 = 0xC000;
pub const BLOCK_SIZE: u64 = 0x1000;
pub const BLOCKS_PER_SECTION: u32 = 170;
pub const BLOCKS_PER_SUPER_SECTION: u32 = BLOCKS_PER_SECTION * BLOCKS_PER_SECTION;
pub const SECTION_SIZE: u64 = BLOCK_SIZE * BLOCKS_PER_SECTION as u64;

/// Bytes per entry in a level 0 hash block: SHA-1, status byte, next block (u24 be)
pub const HASH_ENTRY_SIZE: u64 = 0x18;
pub const HASH_ENTRY_NEXT_BLOCK_OFFSET: u64 = 0x15;

/// Absolute byte offset of data block `block`.
pub const fn block_location(block: u32, shift: u32) -> u64 {
    let mut adjust = 0;
    if block >= BLOCKS_PER_SECTION {
        adjust += ((block / BLOCKS_PER_SECTION) + 1) << shift;
        if block >= BLOCKS_PER_SUPER_SECTION {
            adjust += ((block / BLOCKS_PER_SUPER_SECTION) + 1) << shift;
        }
    }
    DATA_START + (block as u64 + adjust as u64) * BLOCK_SIZE
}

/// Absolute byte offset of the next-block pointer stored for `block` in the level 0 hash
/// block that precedes its section.
pub const fn hash_entry_location(block: u32, shift: u32) -> u64 {
    let index_in_section = (block % BLOCKS_PER_SECTION) as u64;
    let section_start = block_location(block, shift) - index_in_section * BLOCK_SIZE;
    let hash_block = section_start - (BLOCK_SIZE << shift);
    hash_block + index_in_section * HASH_ENTRY_SIZE + HASH_ENTRY_NEXT_BLOCK_OFFSET
}

/// Number of hash block widths between the end of the section before `block` and `block`,
/// where `block` is the first block of a section.
pub const fn hash_gap(block: u32) -> u64 {
    if block == BLOCKS_PER_SECTION {
        // level 1 and level 0 blocks
        2
    } else if block % BLOCKS_PER_SUPER_SECTION == 0 {
        if block == BLOCKS_PER_SUPER_SECTION {
            // level 2, level 1 and level 0 blocks
            3
        } else {
            2
        }
    } else {
        1
    }
}

/// Shift bit derived from the header size: one hash table copy when the header rounds up
/// to 0xB000, two copies otherwise.
pub const fn shift_for_entry_id(entry_id: u32) -> u32 {
    if (entry_id.wrapping_add(0xFFF) & 0xF000) >> 12 == 0xB {
        0
    } else {
        1
    }
}

pub struct ConArchive<R> {
    name: String,
    shift: u32,
    listings: Vec<ConListing>,
    stream: Mutex<R>,
}

impl<R> std::fmt::Debug for ConArchive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConArchive")
            .field("name", &self.name)
            .field("shift", &self.shift)
            .field("listings", &self.listings.len())
            .finish()
    }
}

impl ConArchive<BufReader<File>> {
    /// Opens a package from disk. `Ok(None)` when the file is not a package.
    pub fn open(path: &Path) -> Result<Option<Self>, ScanError> {
        let file = File::open(path)
            .map_err(|e| ScanError::IoError(format!("{}: {e}", path.display())))?;
        let name = path.display().to_string();
        Self::from_reader(&name, BufReader::new(file))
    }
}

impl<R: Read + Seek> ConArchive<R> {
    /// Validates the header and loads the file table. `Ok(None)` when the magic tag does
    /// not match one of the package types.
    pub fn from_reader(name: &str, mut stream: R) -> Result<Option<Self>, ScanError> {
        let mut tag = [0u8; 4];
        if let Err(e) = stream.read_exact(&mut tag) {
            log::debug!("{name} is too short to be a package: {e}");
            return Ok(None);
        }
        if tag != CON_TAG && tag != LIVE_TAG && tag != PIRS_TAG {
            return Ok(None);
        }

        let Some(entry_id) = read_at(&mut stream, METADATA_POSITION, 4, parse_u32_be) else {
            return Ok(None);
        };
        let shift = shift_for_entry_id(entry_id);

        let Some(table_blocks) =
            read_at(&mut stream, FILE_TABLE_BLOCK_COUNT_POSITION, 2, parse_u16_le)
        else {
            return Ok(None);
        };
        let Some(table_first_block) =
            read_at(&mut stream, FILE_TABLE_FIRST_BLOCK_POSITION, 3, parse_u24_le)
        else {
            return Ok(None);
        };
        log::debug!(
            "{name}: shift {shift}, {table_blocks} file table blocks from block {table_first_block}"
        );

        let table_size = u32::from(table_blocks) * BLOCK_SIZE as u32;
        let table = read_split(&mut stream, table_first_block, table_size, shift)
            .map_err(|e| ScanError::archive(name, e))?;
        let listings = parse_listings(&table);

        Ok(Some(Self {
            name: name.to_string(),
            shift,
            listings,
            stream: Mutex::new(stream),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn shift(&self) -> u32 {
        self.shift
    }

    pub fn listings(&self) -> &[ConListing] {
        &self.listings
    }

    pub fn listing(&self, index: usize) -> Option<&ConListing> {
        self.listings.get(index)
    }

    pub fn find_index(&self, filename: &str) -> Option<usize> {
        self.listings.iter().position(|l| l.filename == filename)
    }

    pub fn find_listing(&self, filename: &str) -> Option<&ConListing> {
        self.find_index(filename).map(|index| &self.listings[index])
    }

    /// Reads the whole content of `listing`. Reads against the shared stream are serialized.
    pub fn load_file(&self, listing: &ConListing) -> Result<Vec<u8>, ScanError> {
        if listing.is_directory() {
            return Err(ScanError::parsing(format!(
                "{} in {} is a directory",
                listing.filename, self.name
            )));
        }
        let mut stream = self
            .stream
            .lock()
            .map_err(|_| ScanError::IoError(format!("{}: stream lock poisoned", self.name)))?;
        let result = if listing.is_contiguous() {
            read_contiguous(&mut *stream, listing.first_block, listing.size, self.shift)
        } else {
            read_split(&mut *stream, listing.first_block, listing.size, self.shift)
        };
        result.map_err(|e| ScanError::archive(&self.name, e))
    }

    /// `Ok(None)` when no listing has that path.
    pub fn load_file_by_path(&self, filename: &str) -> Result<Option<Vec<u8>>, ScanError> {
        match self.find_listing(filename) {
            Some(listing) => self.load_file(listing).map(Some),
            None => Ok(None),
        }
    }
}

fn read_at<R: Read + Seek, T>(
    stream: &mut R,
    position: u64,
    len: usize,
    parser: impl Fn(&[u8]) -> nom::IResult<&[u8], T>,
) -> Option<T> {
    let mut buffer = [0u8; 4];
    stream.seek(SeekFrom::Start(position)).ok()?;
    stream.read_exact(&mut buffer[..len]).ok()?;
    parser(&buffer[..len]).ok().map(|(_, value)| value)
}

/// Blocks laid out back to back, interrupted only by hash blocks between sections.
fn read_contiguous<R: Read + Seek>(
    stream: &mut R,
    first_block: u32,
    size: u32,
    shift: u32,
) -> std::io::Result<Vec<u8>> {
    let size = size as usize;
    let mut data = vec![0u8; size];
    let mut block = first_block;
    let mut offset = 0;
    stream.seek(SeekFrom::Start(block_location(block, shift)))?;
    loop {
        let run_blocks = BLOCKS_PER_SECTION - block % BLOCKS_PER_SECTION;
        let run_size = (run_blocks as usize * BLOCK_SIZE as usize).min(size - offset);
        stream.read_exact(&mut data[offset..offset + run_size])?;
        offset += run_size;
        if offset == size {
            break;
        }
        block += run_blocks;
        let gap = (hash_gap(block) * BLOCK_SIZE) << shift;
        stream.seek(SeekFrom::Current(gap as i64))?;
    }
    Ok(data)
}

/// Blocks chained through the next-block pointers of the hash tables.
fn read_split<R: Read + Seek>(
    stream: &mut R,
    first_block: u32,
    size: u32,
    shift: u32,
) -> std::io::Result<Vec<u8>> {
    let size = size as usize;
    let mut data = vec![0u8; size];
    let mut block = first_block;
    let mut offset = 0;
    while offset < size {
        stream.seek(SeekFrom::Start(block_location(block, shift)))?;
        let read_size = (BLOCK_SIZE as usize).min(size - offset);
        stream.read_exact(&mut data[offset..offset + read_size])?;
        offset += read_size;
        if offset == size {
            break;
        }
        stream.seek(SeekFrom::Start(hash_entry_location(block, shift)))?;
        let mut next = [0u8; 3];
        stream.read_exact(&mut next)?;
        block = parse_u24_be(&next)
            .map(|(_, next)| next)
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidData))?;
    }
    Ok(data)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::con_listing::{encode_listing, FLAG_CONTIGUOUS, FLAG_DIRECTORY};
    use std::io::Cursor;

    /// In-memory package with one hash table copy (`shift` 0).
    pub(crate) struct PackageBuilder {
        pub data: Vec<u8>,
        table: Vec<u8>,
    }

    impl PackageBuilder {
        pub(crate) fn new(tag: &[u8; 4], blocks: u32) -> Self {
            let mut data = vec![0u8; (block_location(blocks, 0)) as usize];
            data[..4].copy_from_slice(tag);
            data[0x340..0x344].copy_from_slice(&0xAD0Eu32.to_be_bytes());
            // file table: one block at block 0
            data[0x37C..0x37E].copy_from_slice(&1u16.to_le_bytes());
            data[0x37E..0x381].copy_from_slice(&[0, 0, 0]);
            Self {
                data,
                table: Vec::new(),
            }
        }

        pub(crate) fn add_listing(&mut self, record: [u8; 64]) {
            self.table.extend_from_slice(&record);
        }

        pub(crate) fn write_block(&mut self, physical: u64, bytes: &[u8]) {
            let start = physical as usize;
            self.data[start..start + bytes.len()].copy_from_slice(bytes);
        }

        pub(crate) fn set_next_block(&mut self, physical: u64, next: u32) {
            let start = physical as usize;
            self.data[start..start + 3].copy_from_slice(&next.to_be_bytes()[1..]);
        }

        pub(crate) fn build(mut self) -> Vec<u8> {
            let table = std::mem::take(&mut self.table);
            self.write_block(DATA_START, &table);
            self.data
        }
    }

    fn open(data: Vec<u8>) -> ConArchive<Cursor<Vec<u8>>> {
        ConArchive::from_reader("test.con", Cursor::new(data))
            .unwrap()
            .expect("package should be accepted")
    }

    #[test]
    fn test_block_location() {
        assert_eq!(block_location(0, 0), DATA_START);
        assert_eq!(block_location(1, 0), DATA_START + BLOCK_SIZE);
        assert_eq!(block_location(169, 0), DATA_START + 169 * BLOCK_SIZE);
        // level 1 and level 0 hash blocks precede the second section
        assert_eq!(block_location(170, 0), DATA_START + 172 * BLOCK_SIZE);
        assert_eq!(block_location(340, 0), DATA_START + 343 * BLOCK_SIZE);
        assert_eq!(block_location(28_900, 0), DATA_START + (28_900 + 173) * BLOCK_SIZE);
        // two copies of every hash block
        assert_eq!(block_location(0, 1), DATA_START);
        assert_eq!(block_location(170, 1), DATA_START + 174 * BLOCK_SIZE);
        assert_eq!(block_location(28_900, 1), DATA_START + (28_900 + 346) * BLOCK_SIZE);
    }

    #[test]
    fn test_hash_gap_matches_block_location() {
        for shift in [0, 1] {
            let mut block = BLOCKS_PER_SECTION;
            while block <= BLOCKS_PER_SUPER_SECTION * 3 {
                let end_of_previous = block_location(block - 1, shift) + BLOCK_SIZE;
                let expected = (hash_gap(block) * BLOCK_SIZE) << shift;
                assert_eq!(
                    block_location(block, shift) - end_of_previous,
                    expected,
                    "block {block} shift {shift}"
                );
                block += BLOCKS_PER_SECTION;
            }
        }
    }

    #[test]
    fn test_hash_entry_location() {
        // first level 0 hash block sits right before the data
        assert_eq!(hash_entry_location(0, 0), 0xB000 + 0x15);
        assert_eq!(hash_entry_location(2, 0), 0xB000 + 2 * 0x18 + 0x15);
        assert_eq!(hash_entry_location(0, 1), 0xA000 + 0x15);
        assert_eq!(
            hash_entry_location(171, 0),
            DATA_START + 171 * BLOCK_SIZE + 0x18 + 0x15
        );
    }

    #[test]
    fn test_shift_for_entry_id() {
        assert_eq!(shift_for_entry_id(0xAD0E), 0);
        assert_eq!(shift_for_entry_id(0x971A), 1);
    }

    #[test]
    fn test_rejects_unknown_magic() {
        let mut data = PackageBuilder::new(b"CON ", 2).build();
        data[..4].copy_from_slice(b"RIFF");
        let result = ConArchive::from_reader("x", Cursor::new(data)).unwrap();
        assert!(result.is_none());

        let result = ConArchive::from_reader("x", Cursor::new(vec![b'C', b'O'])).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_accepts_all_tags() {
        for tag in [b"CON ", b"LIVE", b"PIRS"] {
            let mut builder = PackageBuilder::new(tag, 2);
            builder.add_listing(encode_listing("a.txt", FLAG_CONTIGUOUS, 1, 1, -1, 1));
            let archive = open(builder.build());
            assert_eq!(archive.listings().len(), 1);
        }
    }

    #[test]
    fn test_read_single_block_file() {
        let content = b"(song (name \"songs/test/test\"))";
        let mut builder = PackageBuilder::new(b"CON ", 2);
        builder.add_listing(encode_listing(
            "songs.dta",
            FLAG_CONTIGUOUS,
            1,
            1,
            -1,
            content.len() as u32,
        ));
        builder.write_block(block_location(1, 0), content);
        let archive = open(builder.build());

        assert_eq!(archive.shift(), 0);
        let listing = archive.find_listing("songs.dta").unwrap();
        assert_eq!(archive.load_file(listing).unwrap(), content);
        assert!(archive.load_file_by_path("missing").unwrap().is_none());
    }

    #[test]
    fn test_read_split_file_follows_chain() {
        let first: Vec<u8> = (0..BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
        let second = b"tail bytes";
        let mut builder = PackageBuilder::new(b"LIVE", 6);
        builder.add_listing(encode_listing("dir", FLAG_DIRECTORY, 0, 0, -1, 0));
        builder.add_listing(encode_listing(
            "file.bin",
            0,
            2,
            2,
            0,
            (first.len() + second.len()) as u32,
        ));
        // chain 2 -> 5
        builder.write_block(block_location(2, 0), &first);
        builder.write_block(block_location(5, 0), second);
        builder.set_next_block(hash_entry_location(2, 0), 5);
        let archive = open(builder.build());

        let data = archive.load_file_by_path("dir/file.bin").unwrap().unwrap();
        assert_eq!(&data[..first.len()], &first[..]);
        assert_eq!(&data[first.len()..], second);
    }

    #[test]
    fn test_read_contiguous_across_section() {
        // blocks 168..=171 straddle the first hash block gap
        let mut builder = PackageBuilder::new(b"CON ", 172);
        let size = 3 * BLOCK_SIZE as u32 + 100;
        builder.add_listing(encode_listing("big.mogg", FLAG_CONTIGUOUS, 4, 168, -1, size));
        for block in 168..172u32 {
            let fill = vec![block as u8; BLOCK_SIZE as usize];
            builder.write_block(block_location(block, 0), &fill);
        }
        // the hash blocks must not leak into the file
        builder.write_block(DATA_START + 170 * BLOCK_SIZE, &[0xEE; 2 * BLOCK_SIZE as usize]);
        let archive = open(builder.build());

        let data = archive.load_file_by_path("big.mogg").unwrap().unwrap();
        assert_eq!(data.len(), size as usize);
        for (i, chunk) in data.chunks(BLOCK_SIZE as usize).enumerate() {
            assert!(chunk.iter().all(|&b| b == 168 + i as u8), "block {i}");
        }
    }

    #[test]
    fn test_concurrent_reads_share_one_stream() {
        let mut builder = PackageBuilder::new(b"CON ", 172);
        let small = b"small file in block one".to_vec();
        let big_size = 3 * BLOCK_SIZE as u32 + 100;
        builder.add_listing(encode_listing(
            "small.dta",
            FLAG_CONTIGUOUS,
            1,
            1,
            -1,
            small.len() as u32,
        ));
        builder.add_listing(encode_listing("big.mogg", FLAG_CONTIGUOUS, 4, 168, -1, big_size));
        builder.write_block(block_location(1, 0), &small);
        for block in 168..172u32 {
            let fill = vec![block as u8; BLOCK_SIZE as usize];
            builder.write_block(block_location(block, 0), &fill);
        }
        let archive = open(builder.build());

        std::thread::scope(|scope| {
            for thread in 0..8 {
                let archive = &archive;
                let small = &small;
                scope.spawn(move || {
                    for round in 0..200 {
                        if (thread + round) % 2 == 0 {
                            let data = archive.load_file_by_path("small.dta").unwrap().unwrap();
                            assert_eq!(&data, small);
                        } else {
                            let data = archive.load_file_by_path("big.mogg").unwrap().unwrap();
                            assert_eq!(data.len(), big_size as usize);
                            for (i, chunk) in data.chunks(BLOCK_SIZE as usize).enumerate() {
                                assert!(chunk.iter().all(|&b| b == 168 + i as u8));
                            }
                        }
                    }
                });
            }
        });
    }

    #[test]
    fn test_truncated_archive_reports_name() {
        let mut builder = PackageBuilder::new(b"CON ", 2);
        builder.add_listing(encode_listing("big", FLAG_CONTIGUOUS, 9, 1, -1, 9 * 4096));
        let archive = open(builder.build());
        let err = archive.load_file_by_path("big").unwrap_err();
        assert!(matches!(
            err,
            ScanError::ArchiveError { ref archive, .. } if archive == "test.con"
        ));
    }

    #[test]
    fn test_directory_is_not_loadable() {
        let mut builder = PackageBuilder::new(b"CON ", 2);
        builder.add_listing(encode_listing("songs", FLAG_DIRECTORY, 0, 0, -1, 0));
        let archive = open(builder.build());
        assert!(archive.load_file_by_path("songs").is_err());
    }
}
