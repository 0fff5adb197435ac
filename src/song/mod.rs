pub mod chart_loader;
pub mod con_pack;
pub mod dta_entry;
pub mod midi_loader;
pub mod song_ini;
pub mod track;
