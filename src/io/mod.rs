pub mod binary_reader;
pub mod binary_writer;
pub mod byte_cursor;
pub mod con_archive;
pub mod con_listing;
