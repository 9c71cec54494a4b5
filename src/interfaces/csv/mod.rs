pub mod seed_reader;
pub mod status_writer;
