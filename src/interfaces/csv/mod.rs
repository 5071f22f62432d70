pub mod request_reader;
pub mod view_writer;
