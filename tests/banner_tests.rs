use range_scan_rs::banner::{BannerError, ServiceIdentifier};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Bind a local stub and serve each connection with `handler`.
async fn stub<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handler(stream));
        }
    });
    addr
}

async fn read_request(stream: &mut TcpStream) {
    let mut buf = [0u8; 1024];
    let _ = stream.read(&mut buf).await;
}

fn quick() -> ServiceIdentifier {
    ServiceIdentifier::new(Duration::from_secs(1), Duration::from_millis(300))
}

#[tokio::test]
async fn http_server_header_is_the_banner() {
    let addr = stub(|mut s| async move {
        read_request(&mut s).await;
        let _ = s
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nServer: TestServer/1.0\r\nContent-Length: 0\r\n\r\n")
            .await;
    })
    .await;

    let record = ServiceIdentifier::default().identify(addr).await;
    assert_eq!(record.port, addr.port());
    assert_eq!(record.banner, "TestServer/1.0");
}

#[tokio::test]
async fn unprompted_banner_is_returned_verbatim() {
    let addr = stub(|mut s| async move {
        let _ = s.write_all(b"SSH-2.0-OpenSSH_9.0\r\n").await;
        read_request(&mut s).await;
    })
    .await;

    let record = quick().identify(addr).await;
    assert_eq!(record.banner, "SSH-2.0-OpenSSH_9.0");
}

#[tokio::test]
async fn immediate_close_gives_failure_record() {
    let addr = stub(|s| async move { drop(s) }).await;

    let record = quick().identify(addr).await;
    assert_eq!(record.port, addr.port());
    assert!(
        record.banner.starts_with("Error grabbing banner: "),
        "unexpected banner {:?}",
        record.banner
    );
}

#[tokio::test]
async fn http_without_server_header_falls_through() {
    let addr = stub(|mut s| async move {
        read_request(&mut s).await;
        let _ = s
            .write_all(b"HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await;
    })
    .await;

    let id = quick();
    assert!(matches!(id.http_server_header(addr).await, Err(BannerError::NotHttp)));
    // The plain attempt sees nothing unprompted, so the status line is never reported.
    let record = id.identify(addr).await;
    assert!(record.banner.starts_with("Error grabbing banner"));
    assert!(!record.banner.contains("404"));
}

#[tokio::test]
async fn silent_peer_times_out() {
    let addr = stub(|mut s| async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let _ = s.shutdown().await;
    })
    .await;

    let err = quick().grab(addr).await.unwrap_err();
    assert!(matches!(err, BannerError::ReadTimeout), "got {err:?}");
}

#[tokio::test]
async fn refused_connection_is_described() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = quick().grab(addr).await.unwrap_err();
    assert!(matches!(err, BannerError::Connect(a, _) if a == addr), "got {err:?}");
}
