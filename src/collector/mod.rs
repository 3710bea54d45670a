pub mod client;
pub mod influx;
