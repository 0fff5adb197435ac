use crate::parser::chart_reader::{ChartEventKind, ChartReader, ChartTrack};
use crate::parser::modifier::CHART_SONG_OUTLINE;
use crate::song::track::{entry_at, DifficultyTrack, SongChart, SyncTrack, TimeSignature};
use crate::ScanError;

/// `S` phrase types
const SPECIAL_STAR_POWER: u32 = 2;

/// Builds a chart from `.chart` text.
pub fn load_chart(data: &[u8]) -> Result<SongChart, ScanError> {
    let mut reader = ChartReader::new(data);
    let mut chart = SongChart::default();

    while let Some(track) = reader.read_track_header()? {
        match track {
            ChartTrack::Song => {
                chart.modifiers = reader.extract_modifiers(CHART_SONG_OUTLINE);
                if let Some(resolution) = chart.modifier("resolution").and_then(|m| m.as_i64()) {
                    chart.resolution = u16::try_from(resolution)
                        .ok()
                        .filter(|r| *r > 0)
                        .ok_or_else(|| {
                            ScanError::parsing(format!("Invalid chart resolution {resolution}"))
                        })?;
                }
            }
            ChartTrack::SyncTrack => read_sync_track(&mut reader, &mut chart.sync)?,
            ChartTrack::Events => read_global_events(&mut reader, &mut chart)?,
            ChartTrack::Difficulty(difficulty, instrument) => {
                let track = chart.track_mut(instrument).difficulty_mut(difficulty);
                if !track.is_empty() {
                    log::warn!("Duplicate chart track for {instrument} {difficulty:?}");
                }
                read_difficulty(&mut reader, track)?;
            }
            ChartTrack::Unknown(name) => {
                log::debug!("Skipping chart track [{name}]");
                reader.skip_track();
            }
        }
    }

    chart.sync.finish();
    chart.remove_empty_tracks();
    log::debug!(
        "Loaded chart with resolution {} and {} instrument tracks",
        chart.resolution,
        chart.tracks.len()
    );
    Ok(chart)
}

fn read_sync_track(reader: &mut ChartReader<'_>, sync: &mut SyncTrack) -> Result<(), ScanError> {
    while reader.is_still_current_track() {
        let event = reader.try_parse_event()?;
        match event.kind {
            ChartEventKind::Tempo => {
                let bpm_milli = reader.extract_tempo()?;
                if bpm_milli == 0 {
                    log::warn!("Ignoring zero tempo at tick {}", event.position);
                    continue;
                }
                let micros = 60_000_000_000u64 / u64::from(bpm_milli);
                sync.add_tempo(event.position, u32::try_from(micros).unwrap_or(u32::MAX));
            }
            ChartEventKind::TimeSignature => {
                let (numerator, exponent) = reader.extract_time_signature()?;
                let denominator = 1u32.checked_shl(exponent).ok_or_else(|| {
                    ScanError::parsing(format!(
                        "Time signature exponent {exponent} at tick {} is too large",
                        event.position
                    ))
                })?;
                sync.add_time_signature(
                    event.position,
                    TimeSignature {
                        numerator,
                        denominator,
                    },
                );
            }
            ChartEventKind::Anchor => {
                let anchor = reader.extract_anchor()?;
                *entry_at(&mut sync.anchors, event.position) = anchor;
            }
            other => log::debug!("Ignoring {other:?} in [SyncTrack]"),
        }
    }
    Ok(())
}

fn read_global_events(
    reader: &mut ChartReader<'_>,
    chart: &mut SongChart,
) -> Result<(), ScanError> {
    let mut phrase_start: Option<u64> = None;
    while reader.is_still_current_track() {
        let event = reader.try_parse_event()?;
        if event.kind != ChartEventKind::Text {
            continue;
        }
        let position = event.position;
        let text = reader.extract_text();
        let text = text.trim_start_matches('[').trim_end_matches(']');
        if let Some(name) = text.strip_prefix("section ") {
            chart.sections.insert(position, name.to_string());
        } else if let Some(lyric) = text.strip_prefix("lyric ") {
            chart.lyrics.insert(position, lyric.to_string());
        } else if text == "phrase_start" {
            if let Some(start) = phrase_start.replace(position) {
                chart.vocal_phrases.insert(start, position - start);
            }
        } else if text == "phrase_end" {
            match phrase_start.take() {
                Some(start) => {
                    chart.vocal_phrases.insert(start, position - start);
                }
                None => log::debug!("phrase_end without phrase_start at tick {position}"),
            }
        } else {
            entry_at(&mut chart.events, position).push(text.to_string());
        }
    }
    Ok(())
}

fn read_difficulty(
    reader: &mut ChartReader<'_>,
    track: &mut DifficultyTrack,
) -> Result<(), ScanError> {
    let mut solo_start: Option<u64> = None;
    while reader.is_still_current_track() {
        let event = reader.try_parse_event()?;
        let position = event.position;
        match event.kind {
            ChartEventKind::Note => {
                let (lane, sustain) = reader.extract_lane_and_duration()?;
                if !track.add_note(position, lane as usize, sustain) {
                    log::debug!("Ignoring chart lane {lane} at tick {position}");
                }
            }
            ChartEventKind::Special => {
                let (phrase, length) = reader.extract_lane_and_duration()?;
                if phrase == SPECIAL_STAR_POWER {
                    track.star_power.insert(position, length);
                } else {
                    log::debug!("Ignoring special phrase {phrase} at tick {position}");
                }
            }
            ChartEventKind::Text => {
                let text = reader.extract_text();
                match text.as_str() {
                    "solo" => solo_start = Some(position),
                    "soloend" => match solo_start.take() {
                        Some(start) => {
                            track.solos.insert(start, position - start);
                        }
                        None => log::warn!("soloend without solo at tick {position}"),
                    },
                    _ => track.add_event(position, text),
                }
            }
            other => log::debug!("Ignoring {other:?} at tick {position}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::track::{Difficulty, Instrument, DEFAULT_MICROS_PER_QUARTER};

    #[test]
    fn test_notes_with_sustain() {
        let data = b"[ExpertSingle]\n{\n100 = N 0 150\n200 = N 1 0\n200 = N 2 0\n}\n";
        let chart = load_chart(data).unwrap();
        let track = chart
            .track(Instrument::Guitar)
            .unwrap()
            .difficulty(Difficulty::Expert);
        assert_eq!(track.notes.len(), 2);
        assert_eq!(track.notes.get(&100).unwrap().sustain(0), Some(150));
        assert_eq!(track.notes.get(&200).unwrap().lane_count(), 2);
        assert_eq!(chart.resolution, 192);
    }

    #[test]
    fn test_sync_track() {
        let data = b"[Song]\n{\nResolution = 480\n}\n[SyncTrack]\n{\n0 = TS 3 3\n0 = B 150000\n960 = A 1000000\n960 = B 60000\n}\n";
        let chart = load_chart(data).unwrap();
        assert_eq!(chart.resolution, 480);
        assert_eq!(chart.sync.tempos.get(&0), Some(&400_000));
        assert_eq!(chart.sync.tempos.get(&960), Some(&1_000_000));
        assert_eq!(chart.sync.anchors.get(&960), Some(&1_000_000));
        assert_eq!(
            chart.sync.time_signatures.get(&0),
            Some(&TimeSignature {
                numerator: 3,
                denominator: 8
            })
        );
    }

    #[test]
    fn test_default_tempo() {
        let chart = load_chart(b"[SyncTrack]\n{\n}\n").unwrap();
        assert_eq!(chart.sync.tempos.get(&0), Some(&DEFAULT_MICROS_PER_QUARTER));
        assert!(chart.tracks.is_empty());
    }

    #[test]
    fn test_events() {
        let data = b"[Events]\n{\n0 = E \"section Intro\"\n100 = E \"phrase_start\"\n110 = E \"lyric Hel-\"\n150 = E \"phrase_end\"\n300 = E \"[section Verse 1]\"\n400 = E \"crowd_clap\"\n}\n";
        let chart = load_chart(data).unwrap();
        assert_eq!(chart.sections.get(&0).map(String::as_str), Some("Intro"));
        assert_eq!(chart.sections.get(&300).map(String::as_str), Some("Verse 1"));
        assert_eq!(chart.lyrics.get(&110).map(String::as_str), Some("Hel-"));
        assert_eq!(chart.vocal_phrases.get(&100), Some(&50));
        assert_eq!(chart.events.get(&400).unwrap(), &vec!["crowd_clap".to_string()]);
    }

    #[test]
    fn test_star_power_and_solo() {
        let data = b"[HardDrums]\n{\n0 = S 2 768\n0 = N 0 0\n10 = E solo\n20 = N 1 0\n500 = E soloend\n600 = S 64 10\n}\n";
        let chart = load_chart(data).unwrap();
        let track = chart.track(Instrument::Drums).unwrap().difficulty(Difficulty::Hard);
        assert_eq!(track.star_power.get(&0), Some(&768));
        assert_eq!(track.solos.get(&10), Some(&490));
        assert_eq!(track.star_power.len(), 1);
    }

    #[test]
    fn test_unknown_tracks_are_skipped() {
        let data = b"[ExpertVenue]\n{\n0 = E lights\n}\n[EasyDoubleBass]\n{\n0 = N 4 0\n}";
        let chart = load_chart(data).unwrap();
        assert_eq!(chart.tracks.len(), 1);
        assert_eq!(chart.tracks[0].instrument, Instrument::Bass);
    }

    #[test]
    fn test_out_of_order_fails() {
        let data = b"[ExpertSingle]\n{\n200 = N 0 0\n100 = N 0 0\n}\n";
        assert!(load_chart(data).is_err());
    }
}
