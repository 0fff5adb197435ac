pub mod chart_reader;
pub mod dta_reader;
pub mod ini_reader;
pub mod midi_event;
pub mod midi_reader;
pub mod modifier;
pub mod primitive_parser;
pub mod text_cursor;
