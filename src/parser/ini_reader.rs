use crate::parser::modifier::{find_outline, Modifier, ModifierOutline};
use crate::parser::text_cursor::{decode_text, is_whitespace, TextCursor, TextGrammar};
use std::collections::HashMap;

pub struct IniGrammar;

impl TextGrammar for IniGrammar {
    fn skip_whitespace(data: &[u8], mut position: usize, next: usize) -> usize {
        while position < next && is_whitespace(data[position]) {
            position += 1;
        }
        position
    }
}

/// Output key to every value found for it, in file order.
pub type IniSection = HashMap<&'static str, Vec<Modifier>>;

/// Reads the sections named in `outlines` (lower case), skipping every other section.
///
/// Section names are matched case-insensitively, values are typed through the section's
/// outline and keys the outline doesn't know are dropped.
pub fn read_ini(
    data: &[u8],
    outlines: &[(&str, ModifierOutline)],
) -> HashMap<String, IniSection> {
    let mut cursor: TextCursor<'_, IniGrammar> = TextCursor::new(decode_text(data));
    let mut sections: HashMap<String, IniSection> = HashMap::new();
    cursor.seek_line(0);
    skip_section(&mut cursor);

    while !cursor.is_at_end() {
        let header = cursor.take_rest();
        let name = header
            .strip_prefix(b"[")
            .map(|h| h.strip_suffix(b"]").unwrap_or(h))
            .unwrap_or(header);
        let name = String::from_utf8_lossy(name).trim().to_lowercase();
        cursor.next_line();

        let Some((_, outline)) = outlines.iter().find(|(section, _)| *section == name) else {
            log::debug!("Skipping ini section [{name}]");
            skip_section(&mut cursor);
            continue;
        };
        let section = sections.entry(name).or_default();
        read_section(&mut cursor, outline, section);
    }
    sections
}

fn read_section(
    cursor: &mut TextCursor<'_, IniGrammar>,
    outline: ModifierOutline,
    section: &mut IniSection,
) {
    while !cursor.is_at_end() && cursor.peek() != Some(b'[') {
        if cursor.peek() != Some(b';') {
            let key = String::from_utf8_lossy(cursor.take_token(b"=")).into_owned();
            cursor.skip_whitespace();
            if cursor.peek() == Some(b'=') {
                cursor.position += 1;
                cursor.skip_whitespace();
            }
            match find_outline(outline, &key) {
                Some((name, kind)) => match cursor.extract_modifier(kind) {
                    Some(modifier) => section.entry(name).or_default().push(modifier),
                    None => log::debug!("Invalid value for ini key {key}"),
                },
                None => log::trace!("Unknown ini key {key}"),
            }
        }
        cursor.next_line();
    }
}

/// Moves to the next line starting with `[`.
fn skip_section(cursor: &mut TextCursor<'_, IniGrammar>) {
    while !cursor.is_at_end() && cursor.peek() != Some(b'[') {
        cursor.next_line();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::modifier::SONG_INI_OUTLINE;

    fn song(data: &str) -> IniSection {
        read_ini(data.as_bytes(), &[("song", SONG_INI_OUTLINE)])
            .remove("song")
            .unwrap_or_default()
    }

    #[test]
    fn test_key_value_forms() {
        let section = song("[Song]\nname = Cool Song\nartist=The Band\ndiff_guitar 4\n");
        assert_eq!(section["name"], vec![Modifier::String("Cool Song".to_string())]);
        assert_eq!(section["artist"], vec![Modifier::String("The Band".to_string())]);
        assert_eq!(section["diff_guitar"], vec![Modifier::Int32(4)]);
    }

    #[test]
    fn test_section_name_is_case_folded() {
        let section = song("  [SONG]  \r\nNAME = Loud\r\n");
        assert_eq!(section["name"], vec![Modifier::String("Loud".to_string())]);
    }

    #[test]
    fn test_other_sections_are_skipped() {
        let data = "junk before\n[other]\nname = Wrong\n; comment\n[song]\n; name = Commented\nname = Right\n[more]\nname = Also Wrong";
        let section = song(data);
        assert_eq!(section["name"], vec![Modifier::String("Right".to_string())]);
    }

    #[test]
    fn test_repeated_keys_and_types() {
        let data = "[song]\npreview = 1000 2000\npro_drums = True\nsong_length = 99999999999999999999999\ndelay = -50\ndelay = 25\nunknown = 1\nyear = \n";
        let section = song(data);
        assert_eq!(section["preview"], vec![Modifier::Int64Pair(1000, 2000)]);
        assert_eq!(section["pro_drums"], vec![Modifier::Bool(true)]);
        assert_eq!(section["song_length"], vec![Modifier::UInt64(u64::MAX)]);
        assert_eq!(section["delay"], vec![Modifier::Int64(-50), Modifier::Int64(25)]);
        assert_eq!(section["year"], vec![Modifier::String(String::new())]);
        assert!(!section.contains_key("unknown"));
    }

    #[test]
    fn test_invalid_number_is_dropped() {
        let section = song("[song]\ndiff_bass = hard\n");
        assert!(!section.contains_key("diff_bass"));
    }
}
