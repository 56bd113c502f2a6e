use std::net::IpAddr;

use thiserror::Error;

/// Invocation errors. All of them are raised before any socket is opened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid IP address `{0}`")]
    InvalidAddress(String),
    #[error("invalid address range {start}-{end}")]
    InvalidRange { start: IpAddr, end: IpAddr },
    #[error("invalid port range `{0}`")]
    InvalidPortRange(String),
}
