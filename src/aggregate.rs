use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Open ports per host. Hosts and ports iterate in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenPortSet {
    hosts: BTreeMap<IpAddr, BTreeSet<u16>>,
}

impl OpenPortSet {
    /// Returns `true` if the port was not already recorded for the host.
    pub fn insert(&mut self, host: IpAddr, port: u16) -> bool {
        self.hosts.entry(host).or_default().insert(port)
    }

    pub fn ports(&self, host: &IpAddr) -> Option<Vec<u16>> {
        self.hosts.get(host).map(|p| p.iter().copied().collect())
    }

    pub fn hosts(&self) -> impl Iterator<Item = (IpAddr, Vec<u16>)> + '_ {
        self.hosts
            .iter()
            .filter(|(_, ports)| !ports.is_empty())
            .map(|(host, ports)| (*host, ports.iter().copied().collect()))
    }

    /// Total number of (host, port) pairs recorded.
    pub fn len(&self) -> usize {
        self.hosts.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared handle to the open port set. Every mutation goes through the one mutex.
///
/// Clones share the same set; the worker pool hands a clone to each task.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    inner: Arc<Mutex<OpenPortSet>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an open port. Recording the same pair twice leaves the set unchanged.
    pub async fn record(&self, host: IpAddr, port: u16) -> bool {
        self.inner.lock().await.insert(host, port)
    }

    /// Copy of the current set. Only meaningful after the pool's join barrier.
    pub async fn snapshot(&self) -> OpenPortSet {
        self.inner.lock().await.clone()
    }
}
