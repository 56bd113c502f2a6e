use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// One unit of scan work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: IpAddr,
    pub port: u16,
}

impl Target {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Outcome of a connectivity probe. Refused, filtered and timed out all map to `Closed`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
}

/// Banner, or failure description, for one open port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BannerRecord {
    pub port: u16,
    pub banner: String,
}

/// Results for one host with at least one open port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostResult {
    pub host: String,
    pub ports: Vec<u16>,
    #[serde(rename = "banner")]
    pub banners: Vec<BannerRecord>,
}

/// Full scan output, one entry per host with open ports.
pub type ScanReport = Vec<HostResult>;
