use crate::addrs::AddressRange;
use crate::error::ScanError;
use crate::ports::PortRange;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 1000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_BANNER_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_IDENTIFY_CONCURRENCY: usize = 64;

/// Scan request as given by the CLI or the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanConfig {
    /// Single IP, `start-end` range, or CIDR block.
    pub iprange: String,
    /// `start-end` port range, or a single port.
    pub ports: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_banner_timeout_ms")]
    pub banner_connect_timeout_ms: u64,
    #[serde(default = "default_banner_timeout_ms")]
    pub banner_read_timeout_ms: u64,
    #[serde(default = "default_identify_concurrency")]
    pub identify_concurrency: usize,
}

impl ScanConfig {
    pub fn new(iprange: impl Into<String>, ports: impl Into<String>) -> Self {
        Self {
            iprange: iprange.into(),
            ports: ports.into(),
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            banner_connect_timeout_ms: DEFAULT_BANNER_TIMEOUT_MS,
            banner_read_timeout_ms: DEFAULT_BANNER_TIMEOUT_MS,
            identify_concurrency: DEFAULT_IDENTIFY_CONCURRENCY,
        }
    }

    /// Parse both specs. No scan starts from an invalid config.
    pub fn validate(&self) -> Result<ScanPlan, ScanError> {
        Ok(ScanPlan {
            hosts: AddressRange::parse(&self.iprange)?,
            ports: PortRange::parse(&self.ports)?,
            concurrency: self.concurrency.max(1),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            banner_connect_timeout: Duration::from_millis(self.banner_connect_timeout_ms),
            banner_read_timeout: Duration::from_millis(self.banner_read_timeout_ms),
            identify_concurrency: self.identify_concurrency.max(1),
        })
    }
}

/// Validated scan parameters.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub hosts: AddressRange,
    pub ports: PortRange,
    pub concurrency: usize,
    pub connect_timeout: Duration,
    pub banner_connect_timeout: Duration,
    pub banner_read_timeout: Duration,
    pub identify_concurrency: usize,
}

impl ScanPlan {
    /// Number of (host, port) probes, saturating.
    pub fn total_probes(&self) -> u64 {
        self.hosts.len().saturating_mul(self.ports.len() as u64)
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_banner_timeout_ms() -> u64 {
    DEFAULT_BANNER_TIMEOUT_MS
}

fn default_identify_concurrency() -> usize {
    DEFAULT_IDENTIFY_CONCURRENCY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults_fill_missing_fields() {
        let cfg: ScanConfig =
            serde_json::from_str(r#"{"iprange":"10.0.0.1-10.0.0.4","ports":"20-25"}"#).unwrap();
        assert_eq!(cfg, ScanConfig::new("10.0.0.1-10.0.0.4", "20-25"));
        let plan = cfg.validate().unwrap();
        assert_eq!(plan.total_probes(), 24);
        assert_eq!(plan.connect_timeout, Duration::from_secs(1));
        assert_eq!(plan.banner_read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn validate_surfaces_spec_errors() {
        let err = ScanConfig::new("10.0.0.9-10.0.0.1", "80").validate().unwrap_err();
        assert!(matches!(err, ScanError::InvalidRange { .. }));
        let err = ScanConfig::new("10.0.0.1", "90-80").validate().unwrap_err();
        assert!(matches!(err, ScanError::InvalidPortRange(_)));
        let err = ScanConfig::new("10.0.0.300", "80").validate().unwrap_err();
        assert!(matches!(err, ScanError::InvalidAddress(_)));
    }
}
