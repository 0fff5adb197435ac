//! Typed values attached to keys of `song.ini` and the `.chart` `[Song]` section.

use crate::parser::text_cursor::{text_to_string, TextCursor, TextGrammar};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Modifier {
    String(String),
    UInt64(u64),
    Int64(i64),
    UInt32(u32),
    Int32(i32),
    UInt16(u16),
    Int16(i16),
    Bool(bool),
    Float(f32),
    Double(f64),
    Int64Pair(i64, i64),
}

/// Kind a value is parsed as, looked up by key in an outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    String,
    /// String with the surrounding quotes removed when present
    StringChart,
    UInt64,
    Int64,
    UInt32,
    Int32,
    UInt16,
    Int16,
    Bool,
    Float,
    Double,
    Int64Pair,
}

/// Key to (output name, kind) table. Keys are matched case-insensitively.
pub type ModifierOutline = &'static [(&'static str, &'static str, ModifierKind)];

pub fn find_outline(outline: ModifierOutline, key: &str) -> Option<(&'static str, ModifierKind)> {
    outline
        .iter()
        .find(|(k, _, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, name, kind)| (*name, *kind))
}

impl Modifier {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any integer variant widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::UInt64(v) => i64::try_from(v).ok(),
            Self::Int64(v) => Some(v),
            Self::UInt32(v) => Some(i64::from(v)),
            Self::Int32(v) => Some(i64::from(v)),
            Self::UInt16(v) => Some(i64::from(v)),
            Self::Int16(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(f64::from(v)),
            Self::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Int64Pair(a, b) => write!(f, "{a} {b}"),
        }
    }
}

impl<G: TextGrammar> TextCursor<'_, G> {
    /// Parses the rest of the current unit as `kind`. `None` when no value can be read.
    pub fn extract_modifier(&mut self, kind: ModifierKind) -> Option<Modifier> {
        let modifier = match kind {
            ModifierKind::String => Modifier::String(text_to_string(self.take_rest())),
            ModifierKind::StringChart => {
                let rest = self.take_rest();
                let unquoted = match rest {
                    [b'"', inner @ .., b'"'] => inner,
                    _ => rest,
                };
                Modifier::String(text_to_string(unquoted))
            }
            ModifierKind::UInt64 => Modifier::UInt64(self.extract_integer()?),
            ModifierKind::Int64 => Modifier::Int64(self.extract_integer()?),
            ModifierKind::UInt32 => Modifier::UInt32(self.extract_integer()?),
            ModifierKind::Int32 => Modifier::Int32(self.extract_integer()?),
            ModifierKind::UInt16 => Modifier::UInt16(self.extract_integer()?),
            ModifierKind::Int16 => Modifier::Int16(self.extract_integer()?),
            ModifierKind::Bool => Modifier::Bool(self.extract_bool()),
            ModifierKind::Float => Modifier::Float(self.extract_f32()?),
            ModifierKind::Double => Modifier::Double(self.extract_f64()?),
            ModifierKind::Int64Pair => {
                let first = self.extract_i64()?;
                let second = self.extract_i64()?;
                Modifier::Int64Pair(first, second)
            }
        };
        Some(modifier)
    }
}

/// Keys of the `[song]` section of `song.ini`
pub const SONG_INI_OUTLINE: ModifierOutline = &[
    ("album", "album", ModifierKind::String),
    ("album_track", "album_track", ModifierKind::UInt32),
    ("artist", "artist", ModifierKind::String),
    ("charter", "charter", ModifierKind::String),
    ("frets", "frets", ModifierKind::String),
    ("delay", "delay", ModifierKind::Int64),
    ("diff_band", "diff_band", ModifierKind::Int32),
    ("diff_bass", "diff_bass", ModifierKind::Int32),
    ("diff_drums", "diff_drums", ModifierKind::Int32),
    ("diff_guitar", "diff_guitar", ModifierKind::Int32),
    ("diff_keys", "diff_keys", ModifierKind::Int32),
    ("diff_rhythm", "diff_rhythm", ModifierKind::Int32),
    ("diff_vocals", "diff_vocals", ModifierKind::Int32),
    ("five_lane_drums", "five_lane_drums", ModifierKind::Bool),
    ("genre", "genre", ModifierKind::String),
    ("hopo_frequency", "hopo_frequency", ModifierKind::Int64),
    ("icon", "icon", ModifierKind::String),
    ("loading_phrase", "loading_phrase", ModifierKind::String),
    ("modchart", "modchart", ModifierKind::Bool),
    ("multiplier_note", "multiplier_note", ModifierKind::Int32),
    ("name", "name", ModifierKind::String),
    ("playlist", "playlist", ModifierKind::String),
    ("playlist_track", "playlist_track", ModifierKind::UInt32),
    ("preview", "preview", ModifierKind::Int64Pair),
    ("preview_end_time", "preview_end_time", ModifierKind::Int64),
    ("preview_start_time", "preview_start_time", ModifierKind::Int64),
    ("pro_drums", "pro_drums", ModifierKind::Bool),
    ("song_length", "song_length", ModifierKind::UInt64),
    ("sustain_cutoff_threshold", "sustain_cutoff_threshold", ModifierKind::Int64),
    ("track", "album_track", ModifierKind::UInt32),
    ("video_start_time", "video_start_time", ModifierKind::Int64),
    ("year", "year", ModifierKind::String),
];

/// Keys of the `.chart` `[Song]` section, renamed to their `song.ini` equivalents
pub const CHART_SONG_OUTLINE: ModifierOutline = &[
    ("Album", "album", ModifierKind::StringChart),
    ("Artist", "artist", ModifierKind::StringChart),
    ("Charter", "charter", ModifierKind::StringChart),
    ("Difficulty", "diff_band", ModifierKind::Int32),
    ("Genre", "genre", ModifierKind::StringChart),
    ("Name", "name", ModifierKind::StringChart),
    ("Offset", "delay", ModifierKind::Double),
    ("PreviewEnd", "preview_end_time", ModifierKind::Double),
    ("PreviewStart", "preview_start_time", ModifierKind::Double),
    ("Resolution", "resolution", ModifierKind::UInt16),
    ("Year", "year", ModifierKind::StringChart),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_outline_ignores_case() {
        assert_eq!(
            find_outline(SONG_INI_OUTLINE, "ARTIST"),
            Some(("artist", ModifierKind::String))
        );
        assert_eq!(
            find_outline(SONG_INI_OUTLINE, "track"),
            Some(("album_track", ModifierKind::UInt32))
        );
        assert_eq!(find_outline(CHART_SONG_OUTLINE, "resolution").map(|o| o.0), Some("resolution"));
        assert_eq!(find_outline(SONG_INI_OUTLINE, "unknown"), None);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Modifier::UInt32(7).as_i64(), Some(7));
        assert_eq!(Modifier::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Modifier::Float(0.5).as_f64(), Some(0.5));
        assert_eq!(Modifier::Int16(-3).as_f64(), Some(-3.0));
        assert_eq!(Modifier::String("x".into()).as_str(), Some("x"));
        assert_eq!(Modifier::Bool(true).as_bool(), Some(true));
        assert_eq!(Modifier::Int64Pair(1, 2).to_string(), "1 2");
    }
}
