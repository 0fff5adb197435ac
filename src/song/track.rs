//! Owners of the timed event maps built by the chart loaders.
//!
//! Every map is keyed by tick. Notes are grouped per tick into a `Chord` holding one
//! optional sustain per lane.

use crate::collections::FlatMap;
use crate::parser::modifier::Modifier;
use std::fmt;

/// Lanes a chord can hold: five frets or drum pads plus chart modifier lanes
pub const MAX_LANES: usize = 8;

/// 120 BPM
pub const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

/// Default chart resolution in ticks per quarter note
pub const DEFAULT_RESOLUTION: u16 = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    pub const ALL: [Self; 4] = [Self::Easy, Self::Medium, Self::Hard, Self::Expert];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn chart_prefix(self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
            Self::Expert => "Expert",
        }
    }

    /// Lowest MIDI note of this difficulty's gems
    pub const fn midi_base_note(self) -> u8 {
        match self {
            Self::Easy => 60,
            Self::Medium => 72,
            Self::Hard => 84,
            Self::Expert => 96,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Instrument {
    Guitar,
    GuitarCoop,
    Bass,
    Rhythm,
    Keys,
    Drums,
    GuitarGhl,
    BassGhl,
}

impl Instrument {
    pub const ALL: [Self; 8] = [
        Self::Guitar,
        Self::GuitarCoop,
        Self::Bass,
        Self::Rhythm,
        Self::Keys,
        Self::Drums,
        Self::GuitarGhl,
        Self::BassGhl,
    ];

    pub fn from_chart_suffix(suffix: &str) -> Option<Self> {
        let instrument = match suffix {
            "Single" => Self::Guitar,
            "DoubleGuitar" => Self::GuitarCoop,
            "DoubleBass" => Self::Bass,
            "DoubleRhythm" => Self::Rhythm,
            "Keyboard" => Self::Keys,
            "Drums" => Self::Drums,
            "GHLGuitar" => Self::GuitarGhl,
            "GHLBass" => Self::BassGhl,
            _ => return None,
        };
        Some(instrument)
    }

    pub const fn midi_track_name(self) -> &'static str {
        match self {
            Self::Guitar => "PART GUITAR",
            Self::GuitarCoop => "PART GUITAR COOP",
            Self::Bass => "PART BASS",
            Self::Rhythm => "PART RHYTHM",
            Self::Keys => "PART KEYS",
            Self::Drums => "PART DRUMS",
            Self::GuitarGhl => "PART GUITAR GHL",
            Self::BassGhl => "PART BASS GHL",
        }
    }

    pub fn from_midi_track_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|instrument| instrument.midi_track_name() == name)
    }

    /// Gems per difficulty in MIDI charts
    pub const fn midi_lanes(self) -> u8 {
        match self {
            Self::GuitarGhl | Self::BassGhl => 6,
            _ => 5,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.midi_track_name())
    }
}

/// Notes starting on the same tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Chord {
    lanes: [Option<u64>; MAX_LANES],
}

impl Chord {
    /// Sets `lane` with `sustain`. Returns false when the lane is out of range.
    pub fn set_lane(&mut self, lane: usize, sustain: u64) -> bool {
        match self.lanes.get_mut(lane) {
            Some(slot) => {
                *slot = Some(sustain);
                true
            }
            None => false,
        }
    }

    pub fn sustain(&self, lane: usize) -> Option<u64> {
        self.lanes.get(lane).copied().flatten()
    }

    pub fn has_lane(&self, lane: usize) -> bool {
        self.sustain(lane).is_some()
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.iter().filter(|l| l.is_some()).count()
    }

    /// (lane, sustain) of every set lane
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.lanes
            .iter()
            .enumerate()
            .filter_map(|(lane, sustain)| sustain.map(|s| (lane, s)))
    }

    pub fn longest_sustain(&self) -> u64 {
        self.iter().map(|(_, s)| s).max().unwrap_or(0)
    }
}

/// Value stored at `position`, inserting a default one when missing.
///
/// Monotonic streams hit the cheap back insertion, anything older goes through a search.
pub fn entry_at<V: Default>(map: &mut FlatMap<u64, V>, position: u64) -> &mut V {
    match map.last_key() {
        Some(&last) if position < last => map.entry_mut(position),
        _ => map.get_or_insert_back(position),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DifficultyTrack {
    pub notes: FlatMap<u64, Chord>,
    /// Start tick to length
    pub star_power: FlatMap<u64, u64>,
    /// Start tick to length
    pub solos: FlatMap<u64, u64>,
    pub events: FlatMap<u64, Vec<String>>,
    open_notes: [Option<u64>; MAX_LANES],
}

impl DifficultyTrack {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Adds a note with a known sustain.
    pub fn add_note(&mut self, position: u64, lane: usize, sustain: u64) -> bool {
        entry_at(&mut self.notes, position).set_lane(lane, sustain)
    }

    /// Starts a note whose length is only known once `close_note` is called.
    pub fn open_note(&mut self, position: u64, lane: usize) -> bool {
        if lane >= MAX_LANES {
            return false;
        }
        if let Some(previous) = self.open_notes[lane] {
            log::debug!("Lane {lane} opened at {position} while still open since {previous}");
        }
        self.open_notes[lane] = Some(position);
        self.add_note(position, lane, 0)
    }

    /// Closes the open note of `lane`, giving it the sustain `position - start`.
    ///
    /// Returns false when the lane had no open note.
    pub fn close_note(&mut self, position: u64, lane: usize) -> bool {
        let Some(start) = self.open_notes.get_mut(lane).and_then(Option::take) else {
            return false;
        };
        match self.notes.traverse_backward_until(&start) {
            Some(chord) => chord.set_lane(lane, position.saturating_sub(start)),
            None => false,
        }
    }

    pub fn add_event(&mut self, position: u64, text: String) {
        entry_at(&mut self.events, position).push(text);
    }
}

#[derive(Debug, Clone)]
pub struct InstrumentTrack {
    pub instrument: Instrument,
    pub difficulties: [DifficultyTrack; 4],
}

impl InstrumentTrack {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            difficulties: Default::default(),
        }
    }

    pub fn difficulty(&self, difficulty: Difficulty) -> &DifficultyTrack {
        &self.difficulties[difficulty.index()]
    }

    pub fn difficulty_mut(&mut self, difficulty: Difficulty) -> &mut DifficultyTrack {
        &mut self.difficulties[difficulty.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.difficulties.iter().all(DifficultyTrack::is_empty)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SyncTrack {
    /// Microseconds per quarter note
    pub tempos: FlatMap<u64, u32>,
    pub time_signatures: FlatMap<u64, TimeSignature>,
    /// Chart tempo anchors in microseconds
    pub anchors: FlatMap<u64, u64>,
}

impl SyncTrack {
    pub fn add_tempo(&mut self, position: u64, micros_per_quarter: u32) {
        *entry_at(&mut self.tempos, position) = micros_per_quarter;
    }

    pub fn add_time_signature(&mut self, position: u64, time_signature: TimeSignature) {
        *entry_at(&mut self.time_signatures, position) = time_signature;
    }

    /// Guarantees a tempo and a time signature at tick 0: 120 BPM and 4/4 unless given.
    pub fn finish(&mut self) {
        if !self.tempos.contains_key(&0) {
            let index = self.tempos.find_or_insert(0, 0);
            if let Some(tempo) = self.tempos.value_at_mut(index) {
                *tempo = DEFAULT_MICROS_PER_QUARTER;
            }
        }
        if !self.time_signatures.contains_key(&0) {
            let index = self.time_signatures.find_or_insert(0, 0);
            if let Some(time_signature) = self.time_signatures.value_at_mut(index) {
                *time_signature = TimeSignature {
                    numerator: 4,
                    denominator: 4,
                };
            }
        }
    }

    /// Tempo in effect at `position`
    pub fn tempo_at(&self, position: u64) -> u32 {
        let index = match self.tempos.binary_search(&position) {
            Ok(index) => Some(index),
            Err(0) => None,
            Err(index) => Some(index - 1),
        };
        index
            .and_then(|i| self.tempos.node(i))
            .map_or(DEFAULT_MICROS_PER_QUARTER, |node| node.value)
    }
}

#[derive(Debug, Clone)]
pub struct SongChart {
    /// Ticks per quarter note
    pub resolution: u16,
    pub sync: SyncTrack,
    pub events: FlatMap<u64, Vec<String>>,
    pub sections: FlatMap<u64, String>,
    pub lyrics: FlatMap<u64, String>,
    /// Start tick to length
    pub vocal_phrases: FlatMap<u64, u64>,
    pub tracks: Vec<InstrumentTrack>,
    /// Values of the `.chart` `[Song]` section
    pub modifiers: Vec<(&'static str, Modifier)>,
}

impl Default for SongChart {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            sync: SyncTrack::default(),
            events: FlatMap::new(),
            sections: FlatMap::new(),
            lyrics: FlatMap::new(),
            vocal_phrases: FlatMap::new(),
            tracks: Vec::new(),
            modifiers: Vec::new(),
        }
    }
}

impl SongChart {
    pub fn track(&self, instrument: Instrument) -> Option<&InstrumentTrack> {
        self.tracks.iter().find(|t| t.instrument == instrument)
    }

    /// Track of `instrument`, created on first use.
    pub fn track_mut(&mut self, instrument: Instrument) -> &mut InstrumentTrack {
        let index = match self.tracks.iter().position(|t| t.instrument == instrument) {
            Some(index) => index,
            None => {
                self.tracks.push(InstrumentTrack::new(instrument));
                self.tracks.len() - 1
            }
        };
        &mut self.tracks[index]
    }

    pub fn modifier(&self, name: &str) -> Option<&Modifier> {
        self.modifiers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, modifier)| modifier)
    }

    /// Drops instrument tracks without a single note.
    pub fn remove_empty_tracks(&mut self) {
        self.tracks.retain(|t| !t.is_empty());
    }

    /// Tick of the last note of any track.
    pub fn last_note_position(&self) -> Option<u64> {
        self.tracks
            .iter()
            .flat_map(|t| t.difficulties.iter())
            .filter_map(|d| d.notes.last().map(|node| node.key + node.value.longest_sustain()))
            .max()
    }
}
