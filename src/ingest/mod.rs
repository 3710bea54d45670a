pub mod batch;
pub mod parser;
pub mod record;
pub mod runner;
pub mod tailer;
