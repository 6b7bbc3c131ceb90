//! End-to-end tests over loopback TCP

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use streamserver::http::{PING_HEADER, STREAM_HEADER};
use streamserver::session::ConnectionContext;
use streamserver::{
    Host, Provisioner, RejectReason, Route, ServerConfig, ServerHandle, StreamHandler,
    StreamServer, TlsConfig,
};

const SECRET: &str = "s3cret";

fn config() -> ServerConfig {
    ServerConfig::default()
        .host(Host::Literal("127.0.0.1".into()))
        .port(0)
        .secret(SECRET)
}

async fn start(config: ServerConfig) -> ServerHandle {
    StreamServer::new(config).unwrap().start().await.unwrap()
}

async fn send_request<S>(stream: &mut S, target: &str)
where
    S: AsyncWrite + Unpin,
{
    let request = format!("GET {} HTTP/1.1\r\nHost: test\r\n\r\n", target);
    stream.write_all(request.as_bytes()).await.unwrap();
}

/// Read until `needle` shows up in the accumulated bytes
async fn read_until<S>(stream: &mut S, buf: &mut Vec<u8>, needle: &[u8]) -> bool
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        if buf.windows(needle.len()).any(|w| w == needle) {
            return true;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

/// Find a port that is free right now
fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_wrong_secret_gets_nothing() {
    let handle = start(config()).await;
    let addr = handle.address().local_addr;

    let mut client = TcpStream::connect(addr).await.unwrap();
    send_request(&mut client, "/wrong?q=ping").await;

    let mut buf = Vec::new();
    let n = timeout(Duration::from_secs(2), client.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);

    // The server keeps serving everyone else
    let mut client = TcpStream::connect(addr).await.unwrap();
    send_request(&mut client, &format!("/{}?q=ping", SECRET)).await;
    let mut buf = Vec::new();
    assert!(timeout(Duration::from_secs(1), read_until(&mut client, &mut buf, b"pong\r\n"))
        .await
        .unwrap());

    let stats = handle.stop().await;
    assert_eq!(stats.rejected_requests, 1);
    assert_eq!(stats.ping_requests, 1);
}

#[tokio::test]
async fn test_malformed_request_gets_nothing() {
    let handle = start(config()).await;

    let mut client = TcpStream::connect(handle.address().local_addr).await.unwrap();
    client
        .write_all(format!("POST /{} HTTP/1.1\r\n\r\n", SECRET).as_bytes())
        .await
        .unwrap();

    let mut buf = Vec::new();
    timeout(Duration::from_secs(2), client.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert!(buf.is_empty());

    handle.stop().await;
}

#[tokio::test]
async fn test_ping_repeats() {
    let handle = start(config().ping_interval(Duration::from_millis(50))).await;

    let mut client = TcpStream::connect(handle.address().local_addr).await.unwrap();
    send_request(&mut client, &format!("/{}?q=ping", SECRET)).await;

    let mut buf = Vec::new();
    assert!(timeout(Duration::from_secs(1), read_until(&mut client, &mut buf, b"pong\r\n"))
        .await
        .unwrap());
    assert!(buf.starts_with(PING_HEADER));

    // Wait for a few more heartbeats
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut chunk = [0u8; 4096];
    let n = client.read(&mut chunk).await.unwrap();
    buf.extend_from_slice(&chunk[..n]);
    assert!(count(&buf, b"pong\r\n") >= 3);

    handle.stop().await;
}

#[tokio::test]
async fn test_viewer_page() {
    let handle = start(config()).await;

    let mut client = TcpStream::connect(handle.address().local_addr).await.unwrap();
    send_request(&mut client, &format!("/{}?q=viewer", SECRET)).await;

    let mut buf = Vec::new();
    timeout(Duration::from_secs(2), client.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();

    let page = String::from_utf8(buf).unwrap();
    assert!(page.starts_with("HTTP/1."));
    assert!(page.contains("text/html"));
    assert!(page.contains(handle.url()));
    assert!(!page.contains("{URL}"));

    handle.stop().await;
}

#[tokio::test]
async fn test_viewer_template_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("viewer.html");
    std::fs::write(&path, "<p>custom {URL}</p>").unwrap();

    let handle = start(config().viewer_template(&path)).await;

    let mut client = TcpStream::connect(handle.address().local_addr).await.unwrap();
    send_request(&mut client, &format!("/{}?q=viewer", SECRET)).await;

    let mut buf = Vec::new();
    timeout(Duration::from_secs(2), client.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();

    let expected = format!("<p>custom {}</p>", handle.url());
    assert!(String::from_utf8(buf).unwrap().ends_with(&expected));

    handle.stop().await;
}

#[tokio::test]
async fn test_second_server_advances_port() {
    let port = free_port();

    let first = start(config().port(port)).await;
    let second = start(config().port(port)).await;

    assert_eq!(first.address().port, port);
    assert!(second.address().port > port);
    assert!(second
        .url()
        .contains(&format!(":{}/", second.address().port)));

    second.stop().await;
    first.stop().await;
}

#[tokio::test]
async fn test_busy_port_without_advance_fails() {
    let port = free_port();
    let first = start(config().port(port)).await;

    let result = StreamServer::new(config().port(port).next_free_port(false))
        .unwrap()
        .start()
        .await;
    assert!(matches!(result, Err(streamserver::Error::Bind(_))));

    first.stop().await;
}

#[tokio::test]
async fn test_stop_closes_streaming_clients() {
    const CLIENTS: usize = 5;

    let handle = start(
        config()
            .placeholder_frame(Bytes::from_static(b"placeholder"))
            .frame_wait_timeout(Duration::from_secs(30)),
    )
    .await;
    let addr = handle.address().local_addr;

    let mut clients = Vec::new();
    for _ in 0..CLIENTS {
        let mut client = TcpStream::connect(addr).await.unwrap();
        send_request(&mut client, &format!("/{}", SECRET)).await;

        let mut buf = Vec::new();
        assert!(read_until(&mut client, &mut buf, b"placeholder").await);
        assert!(buf.starts_with(STREAM_HEADER));
        clients.push(client);
    }
    assert_eq!(handle.active_connections(), CLIENTS as u64);

    // Workers are parked waiting for a frame that never comes
    let stats = timeout(Duration::from_secs(3), handle.stop()).await.unwrap();
    assert_eq!(stats.stream_requests, CLIENTS as u64);
    assert_eq!(stats.active_connections, 0);

    for mut client in clients {
        let mut rest = Vec::new();
        timeout(Duration::from_secs(2), client.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
    }

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_stream_frames_are_monotonic() {
    const FRAMES: u32 = 50;

    let handle = start(
        config()
            .placeholder_frame(Bytes::from_static(b"frame-0000"))
            .frame_wait_timeout(Duration::from_millis(100)),
    )
    .await;

    let mut client = TcpStream::connect(handle.address().local_addr).await.unwrap();
    send_request(&mut client, &format!("/{}", SECRET)).await;

    let mut buf = Vec::new();
    assert!(read_until(&mut client, &mut buf, b"frame-0000").await);

    let frames = handle.frames();
    let producer = tokio::spawn(async move {
        for i in 1..=FRAMES {
            frames.publish(format!("frame-{:04}", i).into_bytes());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let last = format!("frame-{:04}", FRAMES);
    assert!(timeout(Duration::from_secs(5), read_until(&mut client, &mut buf, last.as_bytes()))
        .await
        .unwrap());
    producer.await.unwrap();

    let versions: Vec<u32> = buf
        .windows(10)
        .filter(|w| w.starts_with(b"frame-"))
        .map(|w| std::str::from_utf8(&w[6..]).unwrap().parse().unwrap())
        .collect();

    assert!(versions.len() >= 2);
    assert!(versions.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(*versions.last().unwrap(), FRAMES);

    let stats = handle.stop().await;
    assert_eq!(stats.frames_published, FRAMES as u64);
    assert!(stats.frames_sent >= 2);
}

#[derive(Default)]
struct Recorder {
    started: AtomicU64,
    connections: AtomicU64,
    requests: AtomicU64,
    rejected: AtomicU64,
    disconnects: AtomicU64,
}

struct RecordingHandler(Arc<Recorder>);

impl StreamHandler for RecordingHandler {
    async fn on_started(&self, url: &str) {
        assert!(url.starts_with("http://127.0.0.1:"));
        self.0.started.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_connection(&self, _ctx: &ConnectionContext) -> bool {
        self.0.connections.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn on_request(&self, _ctx: &ConnectionContext, route: Route) {
        assert_eq!(route, Route::Viewer);
        self.0.requests.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_rejected(&self, _ctx: &ConnectionContext, reason: RejectReason) {
        assert_eq!(reason, RejectReason::WrongSecret);
        self.0.rejected.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_disconnect(&self, _ctx: &ConnectionContext) {
        self.0.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_handler_hooks() {
    let recorder = Arc::new(Recorder::default());
    let handle = StreamServer::with_handler(config(), RecordingHandler(Arc::clone(&recorder)))
        .unwrap()
        .start()
        .await
        .unwrap();
    let addr = handle.address().local_addr;

    for target in [format!("/{}?q=viewer", SECRET), "/nope".to_string()] {
        let mut client = TcpStream::connect(addr).await.unwrap();
        send_request(&mut client, &target).await;
        let mut buf = Vec::new();
        timeout(Duration::from_secs(2), client.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();
    }

    handle.stop().await;

    assert_eq!(recorder.started.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.connections.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.requests.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.rejected.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 2);
}

fn tls_client(cert_path: &std::path::Path) -> tokio_rustls::TlsConnector {
    let pem = std::fs::read(cert_path).unwrap();
    let mut roots = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        roots.add(cert.unwrap()).unwrap();
    }

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_root_certificates(roots)
    .with_no_client_auth();

    tokio_rustls::TlsConnector::from(Arc::new(config))
}

#[tokio::test]
async fn test_tls_self_signed() {
    let dir = tempfile::tempdir().unwrap();
    let tls = TlsConfig::in_dir(dir.path()).provisioner(Provisioner::SelfSigned);
    let cert_path = tls.cert_path.clone();

    let handle = start(config().tls(tls)).await;
    assert!(handle.url().starts_with("https://"));
    assert!(handle.address().secure);
    assert!(cert_path.exists());

    let addr: SocketAddr = handle.address().local_addr;
    let tcp = TcpStream::connect(addr).await.unwrap();
    let server_name = rustls::pki_types::ServerName::try_from("localhost").unwrap();
    let mut client = tls_client(&cert_path)
        .connect(server_name, tcp)
        .await
        .unwrap();

    send_request(&mut client, &format!("/{}?q=ping", SECRET)).await;
    let mut buf = Vec::new();
    assert!(timeout(Duration::from_secs(2), read_until(&mut client, &mut buf, b"pong\r\n"))
        .await
        .unwrap());

    handle.stop().await;
}

#[tokio::test]
async fn test_tls_reuses_existing_cert() {
    let dir = tempfile::tempdir().unwrap();
    let tls = TlsConfig::in_dir(dir.path()).provisioner(Provisioner::SelfSigned);

    let first = start(config().tls(tls.clone())).await;
    first.stop().await;
    let pem = std::fs::read(&tls.cert_path).unwrap();

    let second = start(config().tls(tls.clone())).await;
    second.stop().await;
    assert_eq!(std::fs::read(&tls.cert_path).unwrap(), pem);
}

#[tokio::test]
async fn test_plain_client_on_tls_server_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let tls = TlsConfig::in_dir(dir.path()).provisioner(Provisioner::SelfSigned);
    let handle = start(config().tls(tls)).await;

    let mut client = TcpStream::connect(handle.address().local_addr).await.unwrap();
    send_request(&mut client, &format!("/{}?q=ping", SECRET)).await;

    // Handshake fails; no pong ever arrives
    let mut buf = Vec::new();
    let _ = timeout(Duration::from_secs(2), client.read_to_end(&mut buf)).await;
    assert_eq!(count(&buf, b"pong"), 0);

    handle.stop().await;
}
