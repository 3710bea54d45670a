pub mod collector;
pub mod config;
pub mod ingest;
pub mod registration;
pub mod run;
