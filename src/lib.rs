pub mod config;
pub mod csv_io;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod geocoder;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod tasks;
