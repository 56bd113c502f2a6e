use crate::types::{PortState, Target};
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, warn};

/// EMFILE on Linux/macOS, WSAEMFILE on Windows.
const FD_EXHAUSTED: [i32; 2] = [24, 10024];

static FD_WARNED: AtomicBool = AtomicBool::new(false);

/// Connectivity check run by the worker pool for every target.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, target: Target) -> impl Future<Output = PortState> + Send;
}

/// Plain TCP connect probe bounded by `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnectProbe {
    pub timeout: Duration,
}

impl TcpConnectProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Probe for TcpConnectProbe {
    async fn probe(&self, target: Target) -> PortState {
        match time::timeout(self.timeout, TcpStream::connect(target.socket_addr())).await {
            Ok(Ok(stream)) => {
                drop(stream);
                debug!(host = %target.host, port = target.port, "open port found");
                PortState::Open
            }
            Ok(Err(e)) => {
                if is_fd_exhaustion(&e) && !FD_WARNED.swap(true, Ordering::Relaxed) {
                    warn!(
                        "out of file descriptors; ports are being reported closed. \
                         Lower --concurrency or raise the open file limit (ulimit -n)"
                    );
                }
                PortState::Closed
            }
            // Timed out.
            Err(_) => PortState::Closed,
        }
    }
}

/// The local process ran out of sockets, so the result says nothing about the target.
pub fn is_fd_exhaustion(e: &io::Error) -> bool {
    e.raw_os_error().is_some_and(|code| FD_EXHAUSTED.contains(&code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::net::TcpListener;

    #[test]
    fn fd_exhaustion_recognised() {
        assert!(is_fd_exhaustion(&io::Error::from_raw_os_error(24)));
        assert!(!is_fd_exhaustion(&io::Error::from_raw_os_error(111)));
        assert!(!is_fd_exhaustion(&io::Error::new(io::ErrorKind::Other, "x")));
    }

    #[tokio::test]
    async fn listening_port_is_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpConnectProbe::new(Duration::from_secs(1));
        let target = Target::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        assert_eq!(probe.probe(target).await, PortState::Open);
    }

    #[tokio::test]
    async fn released_port_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let probe = TcpConnectProbe::new(Duration::from_secs(1));
        let target = Target::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        assert_eq!(probe.probe(target).await, PortState::Closed);
    }
}
