use crate::io::con_archive::ConArchive;
use crate::song::dta_entry::DtaSongEntry;
use crate::song::midi_loader::load_midi;
use crate::song::track::SongChart;
use crate::ScanError;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

pub const SONGS_DTA_PATH: &str = "songs/songs.dta";

/// A package together with the song entries of its `songs/songs.dta`.
#[derive(Debug)]
pub struct ConSongPack<R> {
    archive: ConArchive<R>,
    entries: Vec<DtaSongEntry>,
}

impl ConSongPack<BufReader<File>> {
    /// `Ok(None)` when the file is not a package or holds no `songs.dta`.
    pub fn open(path: &Path) -> Result<Option<Self>, ScanError> {
        match ConArchive::open(path)? {
            Some(archive) => Self::from_archive(archive),
            None => Ok(None),
        }
    }
}

impl<R: Read + Seek> ConSongPack<R> {
    pub fn from_archive(archive: ConArchive<R>) -> Result<Option<Self>, ScanError> {
        let Some(dta) = archive.load_file_by_path(SONGS_DTA_PATH)? else {
            log::debug!("{} has no {SONGS_DTA_PATH}", archive.name());
            return Ok(None);
        };
        let entries = DtaSongEntry::parse_all(&dta)?;
        log::debug!("{} holds {} songs", archive.name(), entries.len());
        Ok(Some(Self { archive, entries }))
    }

    pub const fn archive(&self) -> &ConArchive<R> {
        &self.archive
    }

    pub fn entries(&self) -> &[DtaSongEntry] {
        &self.entries
    }

    /// Chart of `entry`, `Ok(None)` when its MIDI file is missing from the package.
    pub fn load_chart(&self, entry: &DtaSongEntry) -> Result<Option<SongChart>, ScanError> {
        let path = entry.midi_path();
        let Some(data) = self.archive.load_file_by_path(&path)? else {
            log::warn!("{}: {path} is missing", self.archive.name());
            return Ok(None);
        };
        load_midi(&data).map(Some)
    }

    /// Loads every entry, pairing each with its own result.
    pub fn load_all(&self) -> Vec<(&DtaSongEntry, Result<Option<SongChart>, ScanError>)> {
        self.entries
            .iter()
            .map(|entry| (entry, self.load_chart(entry)))
            .collect()
    }
}
