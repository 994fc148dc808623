//! Collects Hetzner storage box usage and ships it to InfluxDB.
//!
//! A run discovers every storage box of one provider, fetches the records
//! concurrently through [`http_retry::RetryingTransport`], encodes each one
//! as a line-protocol record and uploads the whole batch gzip-compressed.

pub mod app;
pub mod app_builder;
pub mod collector;
pub mod config;
pub mod encoder;
pub mod provider;
pub mod record;
pub mod shipper;
