pub mod aggregate;
pub mod config;
pub mod fpl;
pub mod http_client;
pub mod match_dataset;
pub mod understat;
