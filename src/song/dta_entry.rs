use crate::parser::dta_reader::DtaReader;
use crate::ScanError;

/// Metadata of one song node of a `songs.dta`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DtaSongEntry {
    pub shortname: String,
    pub name: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_track: Option<i32>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    /// Milliseconds
    pub song_length: Option<u32>,
    /// Path of the song files without extension, e.g. `songs/shortname/shortname`
    pub song_path: Option<String>,
    /// Instrument to difficulty rank
    pub ranks: Vec<(String, i32)>,
    pub utf8: bool,
}

impl DtaSongEntry {
    /// Every top-level song node of `data`.
    pub fn parse_all(data: &[u8]) -> Result<Vec<Self>, ScanError> {
        let mut reader = DtaReader::new(data);
        let mut entries = Vec::new();
        while reader.start_node()? {
            let entry = Self::parse_node(&mut reader)?;
            reader.end_node()?;
            log::debug!("DTA entry {}", entry.shortname);
            entries.push(entry);
        }
        if !reader.is_at_end() {
            log::warn!("Trailing content after the last DTA node");
        }
        Ok(entries)
    }

    fn parse_node(reader: &mut DtaReader<'_>) -> Result<Self, ScanError> {
        let mut entry = Self {
            shortname: reader.node_name(),
            utf8: reader.is_utf8(),
            ..Self::default()
        };
        while reader.start_node()? {
            match reader.node_name().as_str() {
                "name" => entry.name = Some(reader.extract_text()?),
                "artist" => entry.artist = Some(reader.extract_text()?),
                "album_name" => entry.album = Some(reader.extract_text()?),
                "album_track_number" => entry.album_track = Some(reader.extract_i32()?),
                "genre" => entry.genre = Some(reader.extract_text()?),
                "year_released" => entry.year = Some(reader.extract_i32()?),
                "song_length" => entry.song_length = Some(reader.extract_u32()?),
                "song" => entry.song_path = Self::parse_song_path(reader)?,
                "rank" => entry.ranks = Self::parse_ranks(reader)?,
                _ => {}
            }
            reader.end_node()?;
        }
        Ok(entry)
    }

    fn parse_song_path(reader: &mut DtaReader<'_>) -> Result<Option<String>, ScanError> {
        let mut path = None;
        while reader.start_node()? {
            if reader.node_name() == "name" {
                path = Some(reader.extract_text()?);
            }
            reader.end_node()?;
        }
        Ok(path)
    }

    fn parse_ranks(reader: &mut DtaReader<'_>) -> Result<Vec<(String, i32)>, ScanError> {
        let mut ranks = Vec::new();
        while reader.start_node()? {
            let instrument = reader.node_name();
            ranks.push((instrument, reader.extract_i32()?));
            reader.end_node()?;
        }
        Ok(ranks)
    }

    /// Path of the MIDI file inside a package.
    pub fn midi_path(&self) -> String {
        match &self.song_path {
            Some(path) => format!("{path}.mid"),
            None => format!("songs/{0}/{0}.mid", self.shortname),
        }
    }

    pub fn rank(&self, instrument: &str) -> Option<i32> {
        self.ranks
            .iter()
            .find(|(name, _)| name == instrument)
            .map(|(_, rank)| *rank)
    }
}
