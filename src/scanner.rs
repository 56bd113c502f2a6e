use crate::aggregate::{OpenPortSet, ResultAggregator};
use crate::banner::ServiceIdentifier;
use crate::config::{ScanConfig, ScanPlan};
use crate::pool::WorkerPool;
use crate::probe::TcpConnectProbe;
use crate::types::{BannerRecord, HostResult, ScanReport};
use anyhow::Result;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Scan every host and port named by `config`, then identify each open port.
///
/// - Both specs are validated before any socket is opened.
/// - Phase 1 runs TCP connects through a [`WorkerPool`] bounded by `concurrency`.
/// - Phase 2 starts after the pool joins and grabs one banner per open port,
///   bounded by `identify_concurrency`.
pub async fn scan(config: &ScanConfig) -> Result<ScanReport> {
    let plan = config.validate()?;
    Ok(scan_plan(&plan, CancellationToken::new(), SharedProgress::new()).await)
}

/// Variant that accepts a `CancellationToken` to allow external cancellation.
pub async fn scan_with_cancel(config: &ScanConfig, cancel: CancellationToken) -> Result<ScanReport> {
    let plan = config.validate()?;
    Ok(scan_plan(&plan, cancel, SharedProgress::new()).await)
}

/// Live counters for a running scan.
#[derive(Clone, Debug)]
pub struct SharedProgress {
    pub total: Arc<AtomicU64>,
    pub scanned_done: Arc<AtomicU64>,
    pub open_count: Arc<AtomicU64>,
    pub identified: Arc<AtomicU64>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self {
            total: Arc::new(AtomicU64::new(0)),
            scanned_done: Arc::new(AtomicU64::new(0)),
            open_count: Arc::new(AtomicU64::new(0)),
            identified: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for SharedProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Run both phases of a validated plan. Never fails; a cancelled scan returns what it found.
pub async fn scan_plan(
    plan: &ScanPlan,
    cancel: CancellationToken,
    shared: SharedProgress,
) -> ScanReport {
    let started = Instant::now();
    shared.total.store(plan.total_probes(), Ordering::Relaxed);
    info!(
        hosts = plan.hosts.len(),
        ports = plan.ports.len(),
        concurrency = plan.concurrency,
        "starting connectivity phase"
    );

    let aggregator = ResultAggregator::new();
    let mut pool = WorkerPool::new(
        TcpConnectProbe::new(plan.connect_timeout),
        plan.concurrency,
        &aggregator,
    )
    .with_cancel(cancel.clone())
    .with_progress(shared.clone());
    pool.dispatch_all(&plan.hosts, &plan.ports).await;
    let dispatched = pool.join().await;

    let open = aggregator.snapshot().await;
    info!(
        probes = dispatched,
        open = open.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "connectivity phase done"
    );

    let identifier = ServiceIdentifier::new(plan.banner_connect_timeout, plan.banner_read_timeout);
    let banners = identify_all(&open, identifier, plan.identify_concurrency, &cancel, &shared).await;
    let report = build_report(&open, banners);
    info!(
        hosts = report.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "scan finished"
    );
    report
}

/// Phase 2: one banner record per open (host, port).
pub async fn identify_all(
    open: &OpenPortSet,
    identifier: ServiceIdentifier,
    concurrency: usize,
    cancel: &CancellationToken,
    shared: &SharedProgress,
) -> HashMap<(IpAddr, u16), BannerRecord> {
    let sem = Arc::new(Semaphore::new(concurrency.clamp(1, Semaphore::MAX_PERMITS)));
    let mut set = JoinSet::new();
    let mut out = HashMap::new();

    'hosts: for (host, ports) in open.hosts() {
        for port in ports {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'hosts,
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break 'hosts,
                },
            };
            let identified = shared.identified.clone();
            set.spawn(async move {
                let _permit = permit;
                let record = identifier.identify(SocketAddr::new(host, port)).await;
                identified.fetch_add(1, Ordering::Relaxed);
                ((host, port), record)
            });
        }
    }

    while let Some(res) = set.join_next().await {
        match res {
            Ok((key, record)) => {
                out.insert(key, record);
            }
            Err(e) => tracing::warn!("identification task failed: {e}"),
        }
    }
    out
}

/// Pair every open port with its banner record. Hosts without open ports are left out.
///
/// A port with no record (cancelled or failed task) still gets one, holding an error text.
pub fn build_report(
    open: &OpenPortSet,
    mut banners: HashMap<(IpAddr, u16), BannerRecord>,
) -> ScanReport {
    open.hosts()
        .map(|(host, ports)| {
            let banners = ports
                .iter()
                .map(|&port| {
                    banners.remove(&(host, port)).unwrap_or_else(|| BannerRecord {
                        port,
                        banner: "Error grabbing banner: identification did not complete"
                            .to_string(),
                    })
                })
                .collect();
            HostResult {
                host: host.to_string(),
                ports,
                banners,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn report_pairs_every_port_with_a_record() {
        let host = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7));
        let mut open = OpenPortSet::default();
        open.insert(host, 80);
        open.insert(host, 22);

        let mut banners = HashMap::new();
        banners.insert(
            (host, 22),
            BannerRecord { port: 22, banner: "SSH-2.0-OpenSSH_9.0".into() },
        );

        let report = build_report(&open, banners);
        assert_eq!(report.len(), 1);
        let hr = &report[0];
        assert_eq!(hr.host, "192.168.1.7");
        assert_eq!(hr.ports, vec![22, 80]);
        assert_eq!(hr.banners.len(), 2);
        assert_eq!(hr.banners[0].banner, "SSH-2.0-OpenSSH_9.0");
        assert_eq!(hr.banners[1].port, 80);
        assert!(hr.banners[1].banner.starts_with("Error grabbing banner"));
    }

    #[test]
    fn report_serializes_with_banner_key() {
        let report = vec![HostResult {
            host: "127.0.0.1".into(),
            ports: vec![80],
            banners: vec![BannerRecord { port: 80, banner: "TestServer/1.0".into() }],
        }];
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "host": "127.0.0.1",
                "ports": [80],
                "banner": [{"port": 80, "banner": "TestServer/1.0"}]
            }])
        );
    }

    #[tokio::test]
    async fn cancelled_identification_starts_no_grabs() {
        let host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let mut open = OpenPortSet::default();
        open.insert(host, 9);
        let cancel = CancellationToken::new();
        cancel.cancel();
        for _ in 0..100 {
            let shared = SharedProgress::new();
            let banners =
                identify_all(&open, ServiceIdentifier::default(), 4, &cancel, &shared).await;
            assert!(banners.is_empty());
            assert_eq!(shared.identified.load(Ordering::Relaxed), 0);

            let report = build_report(&open, banners);
            assert_eq!(report[0].ports, vec![9]);
            assert!(report[0].banners[0].banner.starts_with("Error grabbing banner"));
        }
    }

    #[tokio::test]
    async fn empty_open_set_gives_empty_report() {
        let banners = identify_all(
            &OpenPortSet::default(),
            ServiceIdentifier::default(),
            4,
            &CancellationToken::new(),
            &SharedProgress::new(),
        )
        .await;
        assert!(banners.is_empty());
        assert!(build_report(&OpenPortSet::default(), banners).is_empty());
    }
}
