//! Reader for the line based `.chart` format.
//!
//! ```text
//! [Song]
//! {
//!   Resolution = 192
//! }
//! [ExpertSingle]
//! {
//!   768 = N 0 0
//! }
//! ```

use crate::parser::modifier::{find_outline, Modifier, ModifierOutline};
use crate::parser::text_cursor::{
    decode_text, is_whitespace, text_to_string, TextCursor, TextGrammar,
};
use crate::song::track::{Difficulty, Instrument};
use crate::ScanError;

pub struct ChartGrammar;

impl TextGrammar for ChartGrammar {
    fn skip_whitespace(data: &[u8], mut position: usize, next: usize) -> usize {
        while position < next && is_whitespace(data[position]) {
            position += 1;
        }
        position
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartTrack {
    Song,
    SyncTrack,
    Events,
    Difficulty(Difficulty, Instrument),
    Unknown(String),
}

impl ChartTrack {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Song" => return Self::Song,
            "SyncTrack" => return Self::SyncTrack,
            "Events" => return Self::Events,
            _ => {}
        }
        for difficulty in Difficulty::ALL {
            if let Some(suffix) = name.strip_prefix(difficulty.chart_prefix()) {
                if let Some(instrument) = Instrument::from_chart_suffix(suffix) {
                    return Self::Difficulty(difficulty, instrument);
                }
            }
        }
        Self::Unknown(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartEventKind {
    /// `B`: tempo in thousandths of a beat per minute
    Tempo,
    /// `TS`: numerator and optional power of two denominator
    TimeSignature,
    /// `A`: tempo anchor in microseconds
    Anchor,
    /// `E`: free text
    Text,
    /// `N`: lane and sustain
    Note,
    /// `S`: phrase type and length
    Special,
    Unknown(String),
}

impl ChartEventKind {
    fn from_token(token: &[u8]) -> Self {
        match token {
            b"B" => Self::Tempo,
            b"TS" => Self::TimeSignature,
            b"A" => Self::Anchor,
            b"E" => Self::Text,
            b"N" => Self::Note,
            b"S" => Self::Special,
            other => Self::Unknown(String::from_utf8_lossy(other).into_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartEvent {
    pub position: u64,
    pub kind: ChartEventKind,
}

pub struct ChartReader<'a> {
    cursor: TextCursor<'a, ChartGrammar>,
    last_position: u64,
    /// The current line was handed out by `try_parse_event`
    line_consumed: bool,
}

impl<'a> ChartReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut cursor = TextCursor::new(decode_text(data));
        cursor.seek_line(0);
        Self {
            cursor,
            last_position: 0,
            line_consumed: false,
        }
    }

    fn finish_line(&mut self) {
        if self.line_consumed {
            self.cursor.next_line();
            self.line_consumed = false;
        }
    }

    /// Next `[Name]` header followed by its opening brace, `None` at the end of the file.
    pub fn read_track_header(&mut self) -> Result<Option<ChartTrack>, ScanError> {
        self.finish_line();
        if self.cursor.is_at_end() {
            return Ok(None);
        }
        let line_start = self.cursor.position();
        let line = self.cursor.take_rest();
        let Some(name) = line.strip_prefix(b"[").and_then(|l| l.strip_suffix(b"]")) else {
            return Err(ScanError::parsing(format!(
                "Invalid chart track header at {line_start}: {}",
                String::from_utf8_lossy(line)
            )));
        };
        let name = String::from_utf8_lossy(name).into_owned();
        self.cursor.next_line();
        if self.cursor.peek() != Some(b'{') {
            return Err(ScanError::parsing(format!(
                "Chart track [{name}] is missing its opening brace"
            )));
        }
        self.cursor.next_line();
        self.last_position = 0;
        log::debug!("Chart track [{name}]");
        Ok(Some(ChartTrack::from_name(&name)))
    }

    /// `false` once the closing brace of the current track is consumed.
    pub fn is_still_current_track(&mut self) -> bool {
        self.finish_line();
        if self.cursor.is_at_end() {
            return false;
        }
        if self.cursor.peek() == Some(b'}') {
            self.cursor.next_line();
            return false;
        }
        true
    }

    /// Parses `tick = TYPE` and leaves the cursor on the event's parameters.
    pub fn try_parse_event(&mut self) -> Result<ChartEvent, ScanError> {
        let line_start = self.cursor.position();
        self.line_consumed = true;
        let position = self.cursor.extract_u64().ok_or_else(|| {
            ScanError::parsing(format!("Chart event without a tick at {line_start}"))
        })?;
        if self.cursor.peek() != Some(b'=') {
            return Err(ScanError::parsing(format!(
                "Chart event at tick {position} is missing '='"
            )));
        }
        self.cursor.position += 1;
        self.cursor.skip_whitespace();
        let kind = ChartEventKind::from_token(self.cursor.take_token(&[]));
        self.cursor.skip_whitespace();

        if position < self.last_position {
            return Err(ScanError::parsing(format!(
                "Chart event at tick {position} comes after tick {}",
                self.last_position
            )));
        }
        self.last_position = position;
        Ok(ChartEvent { position, kind })
    }

    fn missing(&self, what: &str) -> ScanError {
        ScanError::parsing(format!(
            "Chart event at tick {} is missing its {what}",
            self.last_position
        ))
    }

    pub fn extract_tempo(&mut self) -> Result<u32, ScanError> {
        self.cursor
            .extract_u32()
            .ok_or_else(|| self.missing("tempo"))
    }

    /// (numerator, denominator exponent); the exponent defaults to 2 (quarter notes).
    pub fn extract_time_signature(&mut self) -> Result<(u32, u32), ScanError> {
        let numerator = self
            .cursor
            .extract_u32()
            .ok_or_else(|| self.missing("numerator"))?;
        let exponent = self.cursor.extract_u32().unwrap_or(2);
        Ok((numerator, exponent))
    }

    pub fn extract_anchor(&mut self) -> Result<u64, ScanError> {
        self.cursor
            .extract_u64()
            .ok_or_else(|| self.missing("anchor"))
    }

    /// (lane, length) of `N` and `S` events.
    pub fn extract_lane_and_duration(&mut self) -> Result<(u32, u64), ScanError> {
        let lane = self
            .cursor
            .extract_u32()
            .ok_or_else(|| self.missing("lane"))?;
        let duration = self
            .cursor
            .extract_u64()
            .ok_or_else(|| self.missing("duration"))?;
        Ok((lane, duration))
    }

    /// Rest of the line without surrounding quotes.
    pub fn extract_text(&mut self) -> String {
        let rest = self.cursor.take_rest();
        let text = match rest {
            [b'"', inner @ .., b'"'] => inner,
            [b'"', inner @ ..] => inner,
            _ => rest,
        };
        text_to_string(text)
    }

    /// Reads every `key = value` line of the current track that `outline` knows.
    pub fn extract_modifiers(&mut self, outline: ModifierOutline) -> Vec<(&'static str, Modifier)> {
        let mut modifiers = Vec::new();
        while self.is_still_current_track() {
            self.line_consumed = true;
            let key = String::from_utf8_lossy(self.cursor.take_token(b"=")).into_owned();
            self.cursor.skip_whitespace();
            if self.cursor.peek() == Some(b'=') {
                self.cursor.position += 1;
                self.cursor.skip_whitespace();
            }
            let Some((name, kind)) = find_outline(outline, &key) else {
                log::debug!("Skipping chart modifier {key}");
                continue;
            };
            match self.cursor.extract_modifier(kind) {
                Some(modifier) => modifiers.push((name, modifier)),
                None => log::warn!("Invalid value for chart modifier {key}"),
            }
        }
        modifiers
    }

    /// Skips to the line after the brace closing the current track.
    pub fn skip_track(&mut self) {
        self.finish_line();
        let mut depth = 1usize;
        while !self.cursor.is_at_end() {
            match self.cursor.peek() {
                Some(b'{') => depth += 1,
                Some(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        self.cursor.next_line();
                        return;
                    }
                }
                _ => {}
            }
            self.cursor.next_line();
        }
        log::warn!("Chart track is missing its closing brace");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::modifier::CHART_SONG_OUTLINE;

    #[test]
    fn test_track_names() {
        assert_eq!(ChartTrack::from_name("Song"), ChartTrack::Song);
        assert_eq!(
            ChartTrack::from_name("ExpertSingle"),
            ChartTrack::Difficulty(Difficulty::Expert, Instrument::Guitar)
        );
        assert_eq!(
            ChartTrack::from_name("EasyDoubleBass"),
            ChartTrack::Difficulty(Difficulty::Easy, Instrument::Bass)
        );
        assert_eq!(
            ChartTrack::from_name("HardDrums"),
            ChartTrack::Difficulty(Difficulty::Hard, Instrument::Drums)
        );
        assert_eq!(
            ChartTrack::from_name("ExpertVenue"),
            ChartTrack::Unknown("ExpertVenue".to_string())
        );
    }

    #[test]
    fn test_read_events() {
        let data = b"[ExpertSingle]\r\n{\r\n  100 = N 0 150\r\n  200 = N 1 0\r\n  200 = S 2 480\r\n  300 = E solo\r\n}\r\n";
        let mut reader = ChartReader::new(data);
        assert_eq!(
            reader.read_track_header().unwrap(),
            Some(ChartTrack::Difficulty(Difficulty::Expert, Instrument::Guitar))
        );

        assert!(reader.is_still_current_track());
        let event = reader.try_parse_event().unwrap();
        assert_eq!(event, ChartEvent { position: 100, kind: ChartEventKind::Note });
        assert_eq!(reader.extract_lane_and_duration().unwrap(), (0, 150));

        assert!(reader.is_still_current_track());
        assert_eq!(reader.try_parse_event().unwrap().position, 200);
        // parameters left unread are skipped with the line

        assert!(reader.is_still_current_track());
        let event = reader.try_parse_event().unwrap();
        assert_eq!(event.kind, ChartEventKind::Special);
        assert_eq!(reader.extract_lane_and_duration().unwrap(), (2, 480));

        assert!(reader.is_still_current_track());
        assert_eq!(reader.try_parse_event().unwrap().kind, ChartEventKind::Text);
        assert_eq!(reader.extract_text(), "solo");

        assert!(!reader.is_still_current_track());
        assert_eq!(reader.read_track_header().unwrap(), None);
    }

    #[test]
    fn test_decreasing_tick_is_an_error() {
        let data = b"[ExpertSingle]\n{\n200 = N 0 0\n100 = N 1 0\n}\n";
        let mut reader = ChartReader::new(data);
        reader.read_track_header().unwrap();
        assert!(reader.is_still_current_track());
        reader.try_parse_event().unwrap();
        assert!(reader.is_still_current_track());
        let err = reader.try_parse_event().unwrap_err();
        assert!(err.to_string().contains("tick 100"));
    }

    #[test]
    fn test_tick_order_resets_per_track() {
        let data = b"[ExpertSingle]\n{\n200 = N 0 0\n}\n[HardSingle]\n{\n100 = N 0 0\n}";
        let mut reader = ChartReader::new(data);
        reader.read_track_header().unwrap();
        assert!(reader.is_still_current_track());
        reader.try_parse_event().unwrap();
        assert!(!reader.is_still_current_track());
        reader.read_track_header().unwrap();
        assert!(reader.is_still_current_track());
        assert_eq!(reader.try_parse_event().unwrap().position, 100);
    }

    #[test]
    fn test_missing_equals() {
        let data = b"[Events]\n{\n200 E section\n}\n";
        let mut reader = ChartReader::new(data);
        reader.read_track_header().unwrap();
        assert!(reader.is_still_current_track());
        assert!(reader.try_parse_event().is_err());
    }

    #[test]
    fn test_time_signature_default_exponent() {
        let data = b"[SyncTrack]\n{\n0 = TS 4\n0 = TS 6 3\n0 = B 120000\n}\n";
        let mut reader = ChartReader::new(data);
        assert_eq!(reader.read_track_header().unwrap(), Some(ChartTrack::SyncTrack));
        assert!(reader.is_still_current_track());
        reader.try_parse_event().unwrap();
        assert_eq!(reader.extract_time_signature().unwrap(), (4, 2));
        assert!(reader.is_still_current_track());
        reader.try_parse_event().unwrap();
        assert_eq!(reader.extract_time_signature().unwrap(), (6, 3));
        assert!(reader.is_still_current_track());
        assert_eq!(reader.try_parse_event().unwrap().kind, ChartEventKind::Tempo);
        assert_eq!(reader.extract_tempo().unwrap(), 120_000);
    }

    #[test]
    fn test_song_modifiers() {
        let data = "[Song]\n{\n  Name = \"Through the Fire\"\n  Resolution = 480\n  Offset = 0.25\n  MusicStream = \"song.ogg\"\n}\n";
        let mut reader = ChartReader::new(data.as_bytes());
        assert_eq!(reader.read_track_header().unwrap(), Some(ChartTrack::Song));
        let modifiers = reader.extract_modifiers(CHART_SONG_OUTLINE);
        assert_eq!(
            modifiers,
            vec![
                ("name", Modifier::String("Through the Fire".to_string())),
                ("resolution", Modifier::UInt16(480)),
                ("delay", Modifier::Double(0.25)),
            ]
        );
        assert_eq!(reader.read_track_header().unwrap(), None);
    }

    #[test]
    fn test_skip_track() {
        let data = b"[ExpertVenue]\n{\n0 = E lighting\n{\n}\n}\n[Events]\n{\n0 = E \"section Intro\"\n}\n";
        let mut reader = ChartReader::new(data);
        assert!(matches!(reader.read_track_header().unwrap(), Some(ChartTrack::Unknown(_))));
        reader.skip_track();
        assert_eq!(reader.read_track_header().unwrap(), Some(ChartTrack::Events));
        assert!(reader.is_still_current_track());
        reader.try_parse_event().unwrap();
        assert_eq!(reader.extract_text(), "section Intro");
    }

    #[test]
    fn test_skip_track_without_trailing_newline() {
        let data = b"[ExpertVenue]\n{\n0 = E lighting\n}";
        let mut reader = ChartReader::new(data);
        reader.read_track_header().unwrap();
        reader.skip_track();
        assert_eq!(reader.read_track_header().unwrap(), None);

        // last line is content, the closing brace never comes
        let data = b"[ExpertVenue]\n{\n0 = E lighting";
        let mut reader = ChartReader::new(data);
        reader.read_track_header().unwrap();
        reader.skip_track();
        assert_eq!(reader.read_track_header().unwrap(), None);
    }

    #[test]
    fn test_bom_and_bad_header() {
        let data = b"\xEF\xBB\xBF[Song]\n{\n}\nSong\n";
        let mut reader = ChartReader::new(data);
        assert_eq!(reader.read_track_header().unwrap(), Some(ChartTrack::Song));
        assert!(!reader.is_still_current_track());
        assert!(reader.read_track_header().is_err());
    }
}
