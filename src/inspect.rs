use std::fs;
use std::path::Path;

use chartscan::{
    load_chart, load_midi, read_song_ini, ConSongPack, Difficulty, DtaSongEntry, ScanError,
    SongChart,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Package,
    Midi,
    Chart,
    Ini,
    Dta,
}

impl FileKind {
    /// Packages carry no extension, anything else unknown is ignored.
    pub fn from_path(path: &Path) -> Option<Self> {
        let Some(extension) = path.extension() else {
            return Some(Self::Package);
        };
        match extension.to_string_lossy().to_ascii_lowercase().as_str() {
            "mid" | "midi" => Some(Self::Midi),
            "chart" => Some(Self::Chart),
            "ini" => Some(Self::Ini),
            "dta" => Some(Self::Dta),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Report {
    pub title: String,
    pub lines: Vec<String>,
}

/// Summary of a recognised file, `Ok(None)` when the file is of no known kind.
pub fn inspect_file(path: &Path) -> Result<Option<Report>, ScanError> {
    let Some(kind) = FileKind::from_path(path) else {
        return Ok(None);
    };
    let name = path.display().to_string();
    let report = match kind {
        FileKind::Package => {
            let Some(pack) = ConSongPack::open(path)? else {
                return Ok(None);
            };
            inspect_pack(&name, &pack)
        }
        FileKind::Midi => {
            let chart = load_midi(&read(path)?)?;
            chart_report(format!("{name}: midi"), &chart)
        }
        FileKind::Chart => {
            let chart = load_chart(&read(path)?)?;
            chart_report(format!("{name}: chart"), &chart)
        }
        FileKind::Ini => {
            let section = read_song_ini(&read(path)?);
            let mut lines: Vec<String> = section
                .iter()
                .map(|(key, values)| {
                    let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                    format!("{key} = {}", values.join(", "))
                })
                .collect();
            lines.sort();
            Report {
                title: format!("{name}: song.ini with {} keys", lines.len()),
                lines,
            }
        }
        FileKind::Dta => {
            let entries = DtaSongEntry::parse_all(&read(path)?)?;
            Report {
                title: format!("{name}: {} dta entries", entries.len()),
                lines: entries.iter().map(entry_line).collect(),
            }
        }
    };
    Ok(Some(report))
}

fn read(path: &Path) -> Result<Vec<u8>, ScanError> {
    fs::read(path).map_err(|e| ScanError::IoError(format!("{}: {e}", path.display())))
}

fn inspect_pack<R: std::io::Read + std::io::Seek>(name: &str, pack: &ConSongPack<R>) -> Report {
    let archive = pack.archive();
    let mut lines: Vec<String> = archive
        .listings()
        .iter()
        .map(|listing| {
            let kind = if listing.is_directory() { "dir " } else { "file" };
            let time = listing
                .last_write_time()
                .map_or_else(|| "-".to_string(), |t| t.to_string());
            format!("{kind} {:>10} {time} {}", listing.size, listing.filename)
        })
        .collect();
    for (entry, chart) in pack.load_all() {
        let status = match chart {
            Ok(Some(chart)) => format!("{} instrument tracks", chart.tracks.len()),
            Ok(None) => "no midi".to_string(),
            Err(err) => format!("failed: {err}"),
        };
        lines.push(format!("{} ({status})", entry_line(entry)));
    }
    Report {
        title: format!(
            "{name}: package with {} files and {} songs",
            archive.listings().len(),
            pack.entries().len()
        ),
        lines,
    }
}

fn entry_line(entry: &DtaSongEntry) -> String {
    format!(
        "{} - {} by {}",
        entry.shortname,
        entry.name.as_deref().unwrap_or("?"),
        entry.artist.as_deref().unwrap_or("?")
    )
}

fn chart_report(title: String, chart: &SongChart) -> Report {
    let mut lines = vec![
        format!("resolution {}", chart.resolution),
        format!(
            "{} tempo changes, {} time signatures",
            chart.sync.tempos.len(),
            chart.sync.time_signatures.len()
        ),
        format!(
            "{} sections, {} lyrics, {} vocal phrases",
            chart.sections.len(),
            chart.lyrics.len(),
            chart.vocal_phrases.len()
        ),
    ];
    for track in &chart.tracks {
        let counts: Vec<String> = Difficulty::ALL
            .iter()
            .map(|&d| format!("{d:?} {}", track.difficulty(d).notes.len()))
            .collect();
        lines.push(format!("{}: {}", track.instrument, counts.join(", ")));
    }
    Report { title, lines }
}
