//! Service identification for open ports.
//!
//! Each port goes through at most two attempts, each on a fresh connection:
//!
//! 1. HTTP: send a minimal `GET /` and look for a `Server:` header in an
//!    `HTTP/` response.
//! 2. Plain TCP: read the first line the peer sends unprompted.
//!
//! If neither yields a banner the record carries an error description instead.

use crate::types::BannerRecord;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time;

#[derive(Debug, Error)]
pub enum BannerError {
    #[error("connect to {0} timed out")]
    ConnectTimeout(SocketAddr),
    #[error("connect to {0} failed: {1}")]
    Connect(SocketAddr, #[source] io::Error),
    #[error("read timed out")]
    ReadTimeout,
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error("no HTTP server detected")]
    NotHttp,
    #[error("no banner received")]
    NoBanner,
}

/// Where the identification state machine currently is.
#[derive(Debug)]
enum Step {
    Start,
    HttpAttempt,
    TcpAttempt,
    Success(String),
    Failure(BannerError),
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceIdentifier {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ServiceIdentifier {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl ServiceIdentifier {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    /// Identify the service on `addr`. Always produces a record.
    pub async fn identify(&self, addr: SocketAddr) -> BannerRecord {
        let banner = match self.grab(addr).await {
            Ok(banner) => banner,
            Err(e) => {
                tracing::warn!(%addr, "banner grab failed: {e}");
                format!("Error grabbing banner: {e}")
            }
        };
        BannerRecord {
            port: addr.port(),
            banner,
        }
    }

    /// Run the two attempts in order, returning the banner or the last failure.
    pub async fn grab(&self, addr: SocketAddr) -> Result<String, BannerError> {
        let mut step = Step::Start;
        loop {
            step = match step {
                Step::Start => Step::HttpAttempt,
                Step::HttpAttempt => match self.http_server_header(addr).await {
                    Ok(server) => Step::Success(server),
                    Err(e) => {
                        tracing::debug!(%addr, "http attempt fell through: {e}");
                        Step::TcpAttempt
                    }
                },
                Step::TcpAttempt => match self.first_line(addr).await {
                    Ok(line) => Step::Success(line),
                    Err(e) => Step::Failure(e),
                },
                Step::Success(banner) => return Ok(banner),
                Step::Failure(e) => return Err(e),
            };
        }
    }

    /// HTTP attempt: the trimmed `Server:` header value of an `HTTP/` response.
    pub async fn http_server_header(&self, addr: SocketAddr) -> Result<String, BannerError> {
        let mut stream = self.connect(addr).await?;
        let request = format!("GET / HTTP/1.1\r\nHost: {addr}\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;

        let mut reader = BufReader::new(stream);
        time::timeout(self.read_timeout, async {
            match read_line_lossy(&mut reader).await? {
                Some(status) if status.starts_with("HTTP/") => {}
                _ => return Err(BannerError::NotHttp),
            }
            while let Some(line) = read_line_lossy(&mut reader).await? {
                if let Some(value) = line.strip_prefix("Server:") {
                    return Ok(value.trim().to_string());
                }
                // Server only appears in the header block; a keep-alive body would stall until timeout.
                if line.is_empty() {
                    break;
                }
            }
            Err(BannerError::NotHttp)
        })
        .await
        .map_err(|_| BannerError::ReadTimeout)?
    }

    /// Generic TCP attempt: the first line the peer sends, verbatim.
    pub async fn first_line(&self, addr: SocketAddr) -> Result<String, BannerError> {
        let stream = self.connect(addr).await?;
        let mut reader = BufReader::new(stream);
        time::timeout(self.read_timeout, read_line_lossy(&mut reader))
            .await
            .map_err(|_| BannerError::ReadTimeout)??
            .ok_or(BannerError::NoBanner)
    }

    async fn connect(&self, addr: SocketAddr) -> Result<TcpStream, BannerError> {
        match time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(BannerError::Connect(addr, e)),
            Err(_) => Err(BannerError::ConnectTimeout(addr)),
        }
    }
}

/// Read one line without its `\n` or `\r\n` terminator. `None` at end of stream.
///
/// Non UTF-8 bytes are replaced rather than rejected; banners are often binary.
async fn read_line_lossy<R>(reader: &mut BufReader<R>) -> Result<Option<String>, BannerError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
