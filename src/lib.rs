//! Chartscan - rhythm game chart scanner
//!
//! This library provides:
//! - Reading of Xbox 360 CON/LIVE/PIRS packages and the files they hold
//! - Streaming readers for MIDI, `.chart`, `song.ini` and `songs.dta` files
//! - A sorted flat map storing every timed event stream of a chart
//!
//! # Example
//!
//! ```no_run
//! use chartscan::{ConSongPack, Difficulty, Instrument};
//! use std::path::Path;
//!
//! let pack = ConSongPack::open(Path::new("songs_con")).unwrap().unwrap();
//! for (entry, chart) in pack.load_all() {
//!     let Ok(Some(chart)) = chart else { continue };
//!     if let Some(guitar) = chart.track(Instrument::Guitar) {
//!         let expert = guitar.difficulty(Difficulty::Expert);
//!         println!("{}: {} expert chords", entry.shortname, expert.notes.len());
//!     }
//! }
//! ```

pub mod collections;
pub mod error;
pub mod io;
pub mod parser;
pub mod song;

// Re-export main types for convenience
pub use collections::{FlatMap, FlatMapNode};
pub use error::ScanError;
pub use io::{
    binary_reader::BinaryReader,
    binary_writer::BinaryWriter,
    con_archive::{block_location, ConArchive},
    con_listing::ConListing,
};
pub use parser::{
    chart_reader::{ChartReader, ChartTrack},
    dta_reader::DtaReader,
    ini_reader::read_ini,
    midi_event::{MidiEvent, MidiEventType},
    midi_reader::{MidiFile, MidiTrackReader},
    modifier::{Modifier, ModifierKind},
};
pub use song::{
    chart_loader::load_chart,
    con_pack::ConSongPack,
    dta_entry::DtaSongEntry,
    midi_loader::load_midi,
    song_ini::read_song_ini,
    track::{Chord, Difficulty, DifficultyTrack, Instrument, InstrumentTrack, SongChart, SyncTrack},
};
