/// Event currently under the track reader's cursor.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MidiEvent {
    /// Absolute tick of the event. Note-ons close to the previous note-on are snapped to it.
    pub position: u64,
    /// The type of the event.
    pub event: MidiEventType,
    /// Channel of channel-voice events, 0 otherwise.
    pub channel: u8,
    /// Payload length in bytes.
    pub length: usize,
}

impl MidiEvent {
    pub const fn is_note_on(&self) -> bool {
        matches!(self.event, MidiEventType::NoteOn)
    }

    pub const fn is_note_off(&self) -> bool {
        matches!(self.event, MidiEventType::NoteOff)
    }

    pub const fn is_text_event(&self) -> bool {
        self.event.is_text()
    }
}

impl Default for MidiEvent {
    fn default() -> Self {
        Self {
            position: 0,
            event: MidiEventType::Reset,
            channel: 0,
            length: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MidiEventType {
    // channel voice
    NoteOff,
    NoteOn,
    KeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchWheel,
    // system exclusive
    SysEx,
    SysExEnd,
    // meta
    SequenceNumber,
    Text,
    Copyright,
    TrackName,
    InstrumentName,
    Lyric,
    Marker,
    CuePoint,
    /// Meta types 0x08-0x0F, used as free text by some charting tools
    TextReserved(u8),
    ChannelPrefix,
    PortPrefix,
    EndOfTrack,
    Tempo,
    SmpteOffset,
    TimeSignature,
    KeySignature,
    SequencerSpecific,
    UnknownMeta(u8),
    /// Escape byte 0xFF outside a file, never produced while parsing a track
    Reset,
}

impl MidiEventType {
    /// Channel voice type from the high nibble of a status byte and its parameter length.
    pub const fn from_status(status: u8) -> Option<(Self, usize)> {
        let event = match status & 0xF0 {
            0x80 => (Self::NoteOff, 2),
            0x90 => (Self::NoteOn, 2),
            0xA0 => (Self::KeyPressure, 2),
            0xB0 => (Self::ControlChange, 2),
            0xC0 => (Self::ProgramChange, 1),
            0xD0 => (Self::ChannelPressure, 1),
            0xE0 => (Self::PitchWheel, 2),
            _ => return None,
        };
        Some(event)
    }

    pub const fn from_meta(meta_type: u8) -> Self {
        match meta_type {
            0x00 => Self::SequenceNumber,
            0x01 => Self::Text,
            0x02 => Self::Copyright,
            0x03 => Self::TrackName,
            0x04 => Self::InstrumentName,
            0x05 => Self::Lyric,
            0x06 => Self::Marker,
            0x07 => Self::CuePoint,
            0x08..=0x0F => Self::TextReserved(meta_type),
            0x20 => Self::ChannelPrefix,
            0x21 => Self::PortPrefix,
            0x2F => Self::EndOfTrack,
            0x51 => Self::Tempo,
            0x54 => Self::SmpteOffset,
            0x58 => Self::TimeSignature,
            0x59 => Self::KeySignature,
            0x7F => Self::SequencerSpecific,
            other => Self::UnknownMeta(other),
        }
    }

    pub const fn is_text(&self) -> bool {
        matches!(
            self,
            Self::Text
                | Self::Copyright
                | Self::TrackName
                | Self::InstrumentName
                | Self::Lyric
                | Self::Marker
                | Self::CuePoint
                | Self::TextReserved(_)
        )
    }

    pub const fn is_sysex(&self) -> bool {
        matches!(self, Self::SysEx | Self::SysExEnd)
    }
}
