//! Streaming reader for Standard MIDI Files.
//!
//! `MidiFile` walks the chunk structure, `MidiTrackReader` decodes one `MTrk` chunk event by
//! event. Nothing is collected: the caller inspects the current event and pulls its payload
//! with the matching `extract_*` call.

use crate::io::byte_cursor::ByteCursor;
use crate::parser::midi_event::{MidiEvent, MidiEventType};
use crate::parser::primitive_parser::{
    make_string, parse_tag, parse_u16_be, parse_u32_be, parse_u8, parse_vlq,
};
use crate::ScanError;

pub const MTHD_TAG: [u8; 4] = *b"MThd";
pub const MTRK_TAG: [u8; 4] = *b"MTrk";

/// Note-ons closer than this many ticks to the previous note-on share its position.
pub const NOTE_SNAP_WINDOW: u64 = 16;

const HEADER_LENGTH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiHeader {
    pub format: u16,
    pub num_tracks: u16,
    /// Ticks per quarter note
    pub tick_rate: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiNote {
    pub value: u8,
    pub velocity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiTimeSignature {
    pub numerator: u8,
    /// Power of two of the denominator
    pub denominator: u8,
    pub metronome: u8,
    pub num_32nds: u8,
}

pub struct MidiFile<'a> {
    cursor: ByteCursor<'a>,
    header: MidiHeader,
    tracks_read: u16,
}

impl<'a> MidiFile<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, ScanError> {
        let mut cursor = ByteCursor::new(data);
        let tag = cursor
            .parse(parse_tag)
            .ok_or_else(|| ScanError::parsing("Midi file too short for a header"))?;
        if tag != MTHD_TAG {
            return Err(ScanError::parsing(format!(
                "Midi header tag mismatch: {:?}",
                String::from_utf8_lossy(&tag)
            )));
        }
        let length = cursor
            .parse(parse_u32_be)
            .ok_or_else(|| ScanError::parsing("Midi header length missing"))?
            as usize;
        if length < HEADER_LENGTH {
            return Err(ScanError::parsing(format!(
                "Midi header length {length} is too short"
            )));
        }
        cursor.enter(length)?;
        let (Some(format), Some(num_tracks), Some(tick_rate)) = (
            cursor.parse(parse_u16_be),
            cursor.parse(parse_u16_be),
            cursor.parse(parse_u16_be),
        ) else {
            return Err(ScanError::parsing("Midi header truncated"));
        };
        cursor.exit();
        let header = MidiHeader {
            format,
            num_tracks,
            tick_rate,
        };
        log::debug!("Midi header: {header:?}");
        Ok(Self {
            cursor,
            header,
            tracks_read: 0,
        })
    }

    pub const fn header(&self) -> &MidiHeader {
        &self.header
    }

    pub const fn tracks_read(&self) -> u16 {
        self.tracks_read
    }

    /// Next `MTrk` chunk, `None` once every announced track was handed out.
    pub fn next_track(&mut self) -> Result<Option<MidiTrackReader<'a>>, ScanError> {
        if self.tracks_read == self.header.num_tracks || self.cursor.is_at_boundary() {
            return Ok(None);
        }
        let start = self.cursor.position();
        let tag = self
            .cursor
            .parse(parse_tag)
            .ok_or_else(|| ScanError::parsing(format!("Midi track header truncated at {start}")))?;
        if tag != MTRK_TAG {
            return Err(ScanError::parsing(format!(
                "Midi track tag mismatch at {start}: {:?}",
                String::from_utf8_lossy(&tag)
            )));
        }
        let length = self
            .cursor
            .parse(parse_u32_be)
            .ok_or_else(|| ScanError::parsing(format!("Midi track length missing at {start}")))?
            as usize;
        let data = self.cursor.take(length).ok_or_else(|| {
            ScanError::parsing(format!(
                "Midi track {} of {length} bytes runs past the end of the file",
                self.tracks_read
            ))
        })?;
        self.tracks_read += 1;
        Ok(Some(MidiTrackReader::new(data)))
    }
}

#[derive(Debug, Clone)]
pub struct MidiTrackReader<'a> {
    cursor: ByteCursor<'a>,
    event: MidiEvent,
    payload_start: usize,
    tick_position: u64,
    running_status: Option<u8>,
    note_anchor: Option<u64>,
}

impl<'a> MidiTrackReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: ByteCursor::new(data),
            event: MidiEvent::default(),
            payload_start: 0,
            tick_position: 0,
            running_status: None,
            note_anchor: None,
        }
    }

    pub const fn event(&self) -> &MidiEvent {
        &self.event
    }

    /// Name carried by a track name event at tick 0, consumed when present.
    ///
    /// Only meaningful before the first `parse_event`; the reader is rewound when the
    /// first event is anything else.
    pub fn track_name(&mut self) -> Result<Option<String>, ScanError> {
        let saved = self.clone();
        if self.parse_event()?
            && self.event.event == MidiEventType::TrackName
            && self.event.position == 0
        {
            return Ok(Some(make_string(self.extract_payload())));
        }
        *self = saved;
        Ok(None)
    }

    fn read_vlq(&mut self) -> Result<u32, ScanError> {
        let position = self.cursor.position();
        self.cursor.try_parse(parse_vlq).map_err(|err| match err {
            nom::Err::Failure(_) => {
                ScanError::parsing(format!("Invalid variable length quantity at {position}"))
            }
            _ => ScanError::parsing(format!(
                "Variable length quantity truncated at {position}"
            )),
        })
    }

    /// Moves to the next event. `false` at the end of the track.
    pub fn parse_event(&mut self) -> Result<bool, ScanError> {
        if self.event.event == MidiEventType::EndOfTrack {
            return Ok(false);
        }
        // skip whatever the caller did not extract
        self.cursor.seek(self.payload_start + self.event.length);
        if self.cursor.is_at_boundary() {
            log::debug!("Midi track ended without an end of track event");
            return Ok(false);
        }

        let delta = self.read_vlq()?;
        self.tick_position += u64::from(delta);

        let status_position = self.cursor.position();
        let status = self.cursor.peek().ok_or_else(|| {
            ScanError::parsing(format!("Midi event truncated at {status_position}"))
        })?;

        let (event, channel, length) = if status < 0xF0 {
            let status = if status & 0x80 != 0 {
                self.cursor.skip(1);
                self.running_status = Some(status);
                status
            } else {
                self.running_status.ok_or_else(|| {
                    ScanError::parsing(format!(
                        "Running status used before any status byte at {status_position}"
                    ))
                })?
            };
            let (event, length) = MidiEventType::from_status(status).ok_or_else(|| {
                ScanError::parsing(format!("Invalid midi status {status:#04X}"))
            })?;
            (event, status & 0x0F, length)
        } else {
            self.cursor.skip(1);
            let event = match status {
                0xFF => {
                    let meta_type = self.cursor.parse(parse_u8).ok_or_else(|| {
                        ScanError::parsing(format!("Meta event truncated at {status_position}"))
                    })?;
                    MidiEventType::from_meta(meta_type)
                }
                0xF0 => MidiEventType::SysEx,
                0xF7 => MidiEventType::SysExEnd,
                other => {
                    return Err(ScanError::parsing(format!(
                        "Invalid midi status {other:#04X} at {status_position}"
                    )))
                }
            };
            let length = self.read_vlq()? as usize;
            (event, 0, length)
        };

        self.payload_start = self.cursor.position();
        if length > self.cursor.remaining_len() {
            return Err(ScanError::parsing(format!(
                "Midi event at {status_position} needs {length} bytes past the end of the track"
            )));
        }

        // a note-on with zero velocity is a note-off
        let zero_velocity =
            event == MidiEventType::NoteOn && self.cursor.data()[self.payload_start + 1] == 0;
        let event = if zero_velocity {
            MidiEventType::NoteOff
        } else {
            event
        };

        let position = if event == MidiEventType::NoteOn {
            match self.note_anchor {
                Some(anchor) if self.tick_position < anchor + NOTE_SNAP_WINDOW => anchor,
                _ => {
                    self.note_anchor = Some(self.tick_position);
                    self.tick_position
                }
            }
        } else {
            self.tick_position
        };

        self.event = MidiEvent {
            position,
            event,
            channel,
            length,
        };
        Ok(event != MidiEventType::EndOfTrack)
    }

    pub fn extract_note(&self) -> MidiNote {
        assert!(
            matches!(
                self.event.event,
                MidiEventType::NoteOn | MidiEventType::NoteOff | MidiEventType::KeyPressure
            ),
            "extract_note on {:?}",
            self.event.event
        );
        let payload = self.extract_payload();
        MidiNote {
            value: payload[0],
            velocity: payload[1],
        }
    }

    /// (controller, value)
    pub fn extract_control_change(&self) -> (u8, u8) {
        assert_eq!(self.event.event, MidiEventType::ControlChange);
        let payload = self.extract_payload();
        (payload[0], payload[1])
    }

    pub fn extract_program_change(&self) -> u8 {
        assert_eq!(self.event.event, MidiEventType::ProgramChange);
        self.extract_payload()[0]
    }

    /// 14-bit pitch wheel value, 0x2000 is centered.
    pub fn extract_pitch_wheel(&self) -> u16 {
        assert_eq!(self.event.event, MidiEventType::PitchWheel);
        let payload = self.extract_payload();
        u16::from(payload[1] & 0x7F) << 7 | u16::from(payload[0] & 0x7F)
    }

    pub fn extract_tempo_micros_per_quarter(&self) -> Result<u32, ScanError> {
        assert_eq!(self.event.event, MidiEventType::Tempo);
        let payload = self.extract_payload();
        if payload.len() < 3 {
            return Err(ScanError::parsing(format!(
                "Tempo event at tick {} carries {} bytes",
                self.event.position,
                payload.len()
            )));
        }
        Ok(u32::from(payload[0]) << 16 | u32::from(payload[1]) << 8 | u32::from(payload[2]))
    }

    pub fn extract_time_signature(&self) -> Result<MidiTimeSignature, ScanError> {
        assert_eq!(self.event.event, MidiEventType::TimeSignature);
        let payload = self.extract_payload();
        if payload.len() < 2 {
            return Err(ScanError::parsing(format!(
                "Time signature event at tick {} carries {} bytes",
                self.event.position,
                payload.len()
            )));
        }
        Ok(MidiTimeSignature {
            numerator: payload[0],
            denominator: payload[1],
            metronome: payload.get(2).copied().unwrap_or(24),
            num_32nds: payload.get(3).copied().unwrap_or(8),
        })
    }

    /// Raw payload of the current event: text of text meta events, body of sysex events.
    pub fn extract_payload(&self) -> &'a [u8] {
        let data = self.cursor.data();
        &data[self.payload_start..self.payload_start + self.event.length]
    }

    pub fn extract_text(&self) -> String {
        assert!(
            self.event.event.is_text(),
            "extract_text on {:?}",
            self.event.event
        );
        make_string(self.extract_payload())
    }
}
