//! Library crate for range-scan-rs exposing reusable modules.
pub mod addrs;
pub mod aggregate;
pub mod banner;
pub mod config;
pub mod error;
pub mod pool;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod server;
pub mod types;
