use crate::parser::ini_reader::{read_ini, IniSection};
use crate::parser::modifier::SONG_INI_OUTLINE;

/// Values of the `[song]` section of a `song.ini`, empty when the section is missing.
pub fn read_song_ini(data: &[u8]) -> IniSection {
    read_ini(data, &[("song", SONG_INI_OUTLINE)])
        .remove("song")
        .unwrap_or_default()
}

/// First string stored under `key`.
pub fn ini_string<'a>(section: &'a IniSection, key: &str) -> Option<&'a str> {
    section.get(key)?.first()?.as_str()
}
