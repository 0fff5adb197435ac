//! Builds a `SongChart` from a Rock Band style MIDI file.
//!
//! Track 0 carries the tempo map, every other track is identified by its name. Gems of the
//! four difficulties sit on note ranges starting at 60, 72, 84 and 96; phrases use fixed
//! notes shared by all difficulties.

use crate::parser::midi_event::MidiEventType;
use crate::parser::midi_reader::{MidiFile, MidiTrackReader};
use crate::song::track::{
    entry_at, Difficulty, Instrument, InstrumentTrack, SongChart, SyncTrack, TimeSignature,
};
use crate::ScanError;

pub const SOLO_NOTE: u8 = 103;
pub const VOCAL_PHRASE_NOTE: u8 = 105;
pub const VOCAL_PHRASE_NOTE_2: u8 = 106;
pub const STAR_POWER_NOTE: u8 = 116;

pub const EVENTS_TRACK: &str = "EVENTS";
pub const VOCALS_TRACK: &str = "PART VOCALS";

pub fn load_midi(data: &[u8]) -> Result<SongChart, ScanError> {
    let mut file = MidiFile::new(data)?;
    let tick_rate = file.header().tick_rate;
    if tick_rate & 0x8000 != 0 || tick_rate == 0 {
        return Err(ScanError::parsing(format!(
            "Unsupported midi division {tick_rate:#06X}"
        )));
    }
    let mut chart = SongChart {
        resolution: tick_rate,
        ..SongChart::default()
    };

    while let Some(mut track) = file.next_track()? {
        if file.tracks_read() == 1 {
            read_sync_track(&mut track, &mut chart.sync)?;
            continue;
        }
        let Some(name) = track.track_name()? else {
            log::debug!("Skipping unnamed midi track {}", file.tracks_read() - 1);
            continue;
        };
        if name == EVENTS_TRACK {
            read_events(&mut track, &mut chart)?;
        } else if name == VOCALS_TRACK {
            read_vocals(&mut track, &mut chart)?;
        } else if let Some(instrument) = Instrument::from_midi_track_name(&name) {
            read_instrument(&mut track, chart.track_mut(instrument))?;
        } else {
            log::debug!("Skipping midi track {name}");
        }
    }

    chart.sync.finish();
    chart.remove_empty_tracks();
    log::debug!(
        "Loaded midi with {} tracks, {} instrument tracks",
        file.tracks_read(),
        chart.tracks.len()
    );
    Ok(chart)
}

fn read_sync_track(track: &mut MidiTrackReader<'_>, sync: &mut SyncTrack) -> Result<(), ScanError> {
    while track.parse_event()? {
        let position = track.event().position;
        match track.event().event {
            MidiEventType::Tempo => {
                sync.add_tempo(position, track.extract_tempo_micros_per_quarter()?);
            }
            MidiEventType::TimeSignature => {
                let time_signature = track.extract_time_signature()?;
                let denominator = 1u32
                    .checked_shl(u32::from(time_signature.denominator))
                    .ok_or_else(|| {
                        ScanError::parsing(format!(
                            "Time signature denominator 2^{} at tick {position} is too large",
                            time_signature.denominator
                        ))
                    })?;
                sync.add_time_signature(
                    position,
                    TimeSignature {
                        numerator: u32::from(time_signature.numerator),
                        denominator,
                    },
                );
            }
            _ => {}
        }
    }
    Ok(())
}

/// `[section name]` and `[prc_name]` become sections, any other text a global event.
fn read_events(track: &mut MidiTrackReader<'_>, chart: &mut SongChart) -> Result<(), ScanError> {
    while track.parse_event()? {
        if !track.event().is_text_event() {
            continue;
        }
        let position = track.event().position;
        let text = track.extract_text();
        let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
        if let Some(name) = inner.strip_prefix("section ").or_else(|| inner.strip_prefix("prc_")) {
            chart.sections.insert(position, name.to_string());
        } else {
            entry_at(&mut chart.events, position).push(inner.to_string());
        }
    }
    Ok(())
}

fn read_vocals(track: &mut MidiTrackReader<'_>, chart: &mut SongChart) -> Result<(), ScanError> {
    let mut phrase_start: Option<u64> = None;
    while track.parse_event()? {
        let event = *track.event();
        match event.event {
            MidiEventType::Lyric | MidiEventType::Text => {
                let text = track.extract_text();
                // bracketed text is an animation or stage cue
                if !text.starts_with('[') {
                    chart.lyrics.insert(event.position, text);
                }
            }
            MidiEventType::NoteOn | MidiEventType::NoteOff => {
                let note = track.extract_note();
                if note.value != VOCAL_PHRASE_NOTE && note.value != VOCAL_PHRASE_NOTE_2 {
                    continue;
                }
                if event.is_note_on() {
                    phrase_start = Some(event.position);
                } else if let Some(start) = phrase_start.take() {
                    chart.vocal_phrases.insert(start, event.position - start);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn read_instrument(
    track: &mut MidiTrackReader<'_>,
    instrument: &mut InstrumentTrack,
) -> Result<(), ScanError> {
    let lanes = instrument.instrument.midi_lanes();
    let mut star_power_start: Option<u64> = None;
    let mut solo_start: Option<u64> = None;

    while track.parse_event()? {
        let event = *track.event();
        if event.is_text_event() {
            let text = track.extract_text();
            for difficulty in &mut instrument.difficulties {
                difficulty.add_event(event.position, text.clone());
            }
            continue;
        }
        if !event.is_note_on() && !event.is_note_off() {
            continue;
        }
        let note = track.extract_note();
        let position = event.position;

        let phrase = match note.value {
            STAR_POWER_NOTE => Some((&mut star_power_start, true)),
            SOLO_NOTE => Some((&mut solo_start, false)),
            _ => None,
        };
        if let Some((start, is_star_power)) = phrase {
            if event.is_note_on() {
                *start = Some(position);
            } else if let Some(start) = start.take() {
                for difficulty in &mut instrument.difficulties {
                    let phrases = if is_star_power {
                        &mut difficulty.star_power
                    } else {
                        &mut difficulty.solos
                    };
                    phrases.insert(start, position - start);
                }
            }
            continue;
        }

        let Some(difficulty) = Difficulty::ALL.into_iter().find(|d| {
            (d.midi_base_note()..d.midi_base_note() + lanes).contains(&note.value)
        }) else {
            continue;
        };
        let lane = usize::from(note.value - difficulty.midi_base_note());
        let notes = instrument.difficulty_mut(difficulty);
        if event.is_note_on() {
            notes.open_note(position, lane);
        } else if !notes.close_note(position, lane) {
            log::warn!(
                "Note off for {} lane {lane} at tick {position} without a note on",
                instrument.instrument
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::midi_reader::tests::{end_of_track, meta, midi_file, vlq};

    fn note(delta: u32, status: u8, value: u8, velocity: u8) -> Vec<u8> {
        let mut bytes = vlq(delta);
        bytes.extend_from_slice(&[status, value, velocity]);
        bytes
    }

    fn tempo_track() -> Vec<u8> {
        let mut track = meta(0, 0x51, &[0x06, 0x1A, 0x80]);
        track.extend(meta(0, 0x58, &[6, 3, 24, 8]));
        track.extend(end_of_track());
        track
    }

    #[test]
    fn test_guitar_notes_and_phrases() {
        let mut guitar = meta(0, 0x03, b"PART GUITAR");
        guitar.extend(note(0, 0x90, STAR_POWER_NOTE, 100));
        guitar.extend(note(100, 0x90, 96, 100));
        guitar.extend(note(100, 0x90, 97, 100));
        guitar.extend(note(50, 0x80, 96, 0));
        guitar.extend(note(10, 0x90, 97, 0));
        guitar.extend(note(0, 0x80, STAR_POWER_NOTE, 0));
        guitar.extend(note(0, 0x90, 60, 100));
        guitar.extend(note(30, 0x80, 60, 0));
        guitar.extend(end_of_track());
        let data = midi_file(480, &[tempo_track(), guitar]);

        let chart = load_midi(&data).unwrap();
        assert_eq!(chart.resolution, 480);
        assert_eq!(chart.sync.tempos.get(&0), Some(&400_000));
        assert_eq!(
            chart.sync.time_signatures.get(&0),
            Some(&TimeSignature {
                numerator: 6,
                denominator: 8
            })
        );

        let guitar = chart.track(Instrument::Guitar).unwrap();
        let expert = guitar.difficulty(Difficulty::Expert);
        assert_eq!(expert.notes.len(), 2);
        assert_eq!(expert.notes.get(&100).unwrap().sustain(0), Some(150));
        assert_eq!(expert.notes.get(&200).unwrap().sustain(1), Some(60));
        assert_eq!(expert.star_power.get(&0), Some(&260));

        let easy = guitar.difficulty(Difficulty::Easy);
        assert_eq!(easy.notes.get(&260).unwrap().sustain(0), Some(30));
        assert_eq!(easy.star_power.get(&0), Some(&260));
        assert!(guitar.difficulty(Difficulty::Hard).is_empty());
    }

    #[test]
    fn test_events_and_vocals() {
        let mut events = meta(0, 0x03, b"EVENTS");
        events.extend(meta(0, 0x01, b"[section intro]"));
        events.extend(meta(480, 0x01, b"[prc_verse_1]"));
        events.extend(meta(480, 0x01, b"[music_start]"));
        events.extend(end_of_track());

        let mut vocals = meta(0, 0x03, b"PART VOCALS");
        vocals.extend(note(100, 0x90, VOCAL_PHRASE_NOTE, 100));
        vocals.extend(meta(0, 0x05, b"Hel-"));
        vocals.extend(meta(20, 0x05, b"lo"));
        vocals.extend(meta(0, 0x01, b"[idle]"));
        vocals.extend(note(180, 0x80, VOCAL_PHRASE_NOTE, 0));
        vocals.extend(end_of_track());

        let data = midi_file(480, &[tempo_track(), events, vocals]);
        let chart = load_midi(&data).unwrap();
        assert_eq!(chart.sections.get(&0).map(String::as_str), Some("intro"));
        assert_eq!(chart.sections.get(&480).map(String::as_str), Some("verse_1"));
        assert_eq!(chart.events.get(&960).unwrap(), &vec!["music_start".to_string()]);
        assert_eq!(chart.lyrics.len(), 2);
        assert_eq!(chart.lyrics.get(&120).map(String::as_str), Some("lo"));
        assert_eq!(chart.vocal_phrases.get(&100), Some(&200));
        assert!(chart.tracks.is_empty());
    }

    #[test]
    fn test_unknown_and_unnamed_tracks_are_skipped() {
        let mut venue = meta(0, 0x03, b"VENUE");
        venue.extend(note(0, 0x90, 96, 100));
        venue.extend(end_of_track());
        let mut unnamed = note(0, 0x90, 96, 100);
        unnamed.extend(end_of_track());
        let data = midi_file(480, &[tempo_track(), venue, unnamed]);
        let chart = load_midi(&data).unwrap();
        assert!(chart.tracks.is_empty());
    }

    #[test]
    fn test_smpte_division_is_rejected() {
        let data = midi_file(0xE728, &[tempo_track()]);
        assert!(load_midi(&data).is_err());
    }

    #[test]
    fn test_malformed_track_fails() {
        let mut guitar = meta(0, 0x03, b"PART GUITAR");
        guitar.extend_from_slice(&[0x00, 60, 100]);
        let data = midi_file(480, &[tempo_track(), guitar]);
        assert!(load_midi(&data).is_err());
    }
}
