use crate::addrs::AddressRange;
use crate::aggregate::ResultAggregator;
use crate::ports::PortRange;
use crate::probe::Probe;
use crate::scanner::SharedProgress;
use crate::types::{PortState, Target};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs a [`Probe`] over many targets with at most `concurrency` in flight.
///
/// - A permit is acquired before each task is spawned and released when the
///   task finishes, after its result has been recorded.
/// - [`WorkerPool::dispatch`] waits while every permit is taken.
/// - [`WorkerPool::join`] is the barrier: it returns once every dispatched
///   task has completed. Read the aggregator only after it returns.
pub struct WorkerPool<P: Probe> {
    probe: Arc<P>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    aggregator: ResultAggregator,
    cancel: CancellationToken,
    progress: SharedProgress,
    dispatched: u64,
}

impl<P: Probe> WorkerPool<P> {
    pub fn new(probe: P, concurrency: usize, aggregator: &ResultAggregator) -> Self {
        Self {
            probe: Arc::new(probe),
            permits: Arc::new(Semaphore::new(concurrency.clamp(1, Semaphore::MAX_PERMITS))),
            tasks: JoinSet::new(),
            aggregator: aggregator.clone(),
            cancel: CancellationToken::new(),
            progress: SharedProgress::new(),
            dispatched: 0,
        }
    }

    /// Stop dispatching, and skip queued probes, once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Spawn one probe, waiting for a free permit first.
    ///
    /// Returns `false` without spawning if the pool was cancelled.
    pub async fn dispatch(&mut self, target: Target) -> bool {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => return false,
            },
        };

        // Reap finished tasks so the set does not grow with the whole matrix.
        while let Some(res) = self.tasks.try_join_next() {
            log_join_error(res);
        }

        let probe = self.probe.clone();
        let aggregator = self.aggregator.clone();
        let progress = self.progress.clone();
        let cancel = self.cancel.clone();

        self.tasks.spawn(async move {
            let _permit = permit; // held until the result is published

            if cancel.is_cancelled() {
                progress.scanned_done.fetch_add(1, Ordering::Relaxed);
                return;
            }

            if probe.probe(target).await == PortState::Open
                && aggregator.record(target.host, target.port).await
            {
                progress.open_count.fetch_add(1, Ordering::Relaxed);
            }
            progress.scanned_done.fetch_add(1, Ordering::Relaxed);
        });
        self.dispatched += 1;
        true
    }

    /// Dispatch every host x port pair, hosts in range order.
    pub async fn dispatch_all(&mut self, hosts: &AddressRange, ports: &PortRange) {
        'hosts: for host in hosts {
            debug!(%host, "scanning");
            for port in ports.iter() {
                if !self.dispatch(Target::new(host, port)).await {
                    break 'hosts;
                }
            }
        }
    }

    /// Wait for every dispatched probe. Returns how many were dispatched.
    pub async fn join(mut self) -> u64 {
        while let Some(res) = self.tasks.join_next().await {
            log_join_error(res);
        }
        self.dispatched
    }
}

fn log_join_error(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        warn!("probe task failed: {e}");
    }
}
