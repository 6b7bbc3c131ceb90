//! MJPEG server streaming a synthetic test pattern
//!
//! Run with: cargo run --example simple_server --features encoder [HOST] [PORT]
//!
//! Examples:
//!   cargo run --example simple_server --features encoder               # localhost:5000
//!   cargo run --example simple_server --features encoder GLOBAL        # LAN address
//!   cargo run --example simple_server --features encoder 0.0.0.0 8080  # all interfaces
//!
//! Open the printed viewer URL in a browser. Set `STREAM_TLS=1` to serve over
//! HTTPS with a self-signed certificate in the current directory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use streamserver::session::ConnectionContext;
use streamserver::{
    Host, ImageEncoder, Provisioner, RejectReason, Route, ServerConfig, StreamHandler,
    StreamServer, TlsConfig,
};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const FPS: u64 = 15;

/// Handler that logs events and counts viewers
struct MyHandler {
    viewers: AtomicU64,
}

impl StreamHandler for MyHandler {
    async fn on_started(&self, url: &str) {
        println!("Stream: {}", url);
        println!("Viewer: {}?q=viewer", url);
    }

    async fn on_request(&self, ctx: &ConnectionContext, route: Route) {
        if route == Route::Stream {
            let viewers = self.viewers.fetch_add(1, Ordering::Relaxed) + 1;
            println!("[{}] Viewer joined from {} ({} total)", ctx.session_id, ctx.peer_addr, viewers);
        }
    }

    async fn on_rejected(&self, ctx: &ConnectionContext, reason: RejectReason) {
        tracing::info!(session_id = ctx.session_id, peer = %ctx.peer_addr, reason = %reason, "Request dropped");
    }

    async fn on_disconnect(&self, ctx: &ConnectionContext) {
        tracing::debug!(session_id = ctx.session_id, "Disconnected");
    }
}

/// Moving diagonal gradient in BGR order
fn render_pattern(tick: u64, buf: &mut [u8]) {
    let shift = (tick * 4) as u32;
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let i = ((y * WIDTH + x) * 3) as usize;
            buf[i] = ((x + shift) % 256) as u8;
            buf[i + 1] = ((y + shift / 2) % 256) as u8;
            buf[i + 2] = ((x + y) % 256) as u8;
        }
    }
}

fn print_usage() {
    eprintln!("Usage: simple_server [HOST] [PORT]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  HOST    localhost, GLOBAL or a literal address (default: localhost)");
    eprintln!("  PORT    First port to try (default: 5000)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("streamserver=debug".parse()?)
                .add_directive("simple_server=debug".parse()?),
        )
        .init();

    let mut config = ServerConfig::default();
    if let Some(host) = args.get(1) {
        config = config.host(Host::parse(host));
    }
    if let Some(port) = args.get(2) {
        config = config.port(port.parse()?);
    }
    if std::env::var("STREAM_TLS").is_ok_and(|v| v == "1") {
        config = config.tls(TlsConfig::default().provisioner(Provisioner::SelfSigned));
    }

    let handler = MyHandler {
        viewers: AtomicU64::new(0),
    };
    let server = StreamServer::with_handler(config, handler)?.with_encoder(ImageEncoder);
    let handle = server.start().await?;

    let mut buf = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    let mut ticker = tokio::time::interval(Duration::from_millis(1000 / FPS));
    let started = Instant::now();
    let mut tick = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                render_pattern(tick, &mut buf);
                if let Err(e) = handle.publish_pixels(WIDTH, HEIGHT, 3, &buf) {
                    eprintln!("Encode failed: {}", e);
                }
                tick += 1;

                if tick % (FPS * 10) == 0 {
                    let stats = handle.stats();
                    println!(
                        "Stats: uptime={:?} clients={} frames_sent={} bitrate={} bps",
                        started.elapsed(),
                        stats.active_connections,
                        stats.frames_sent,
                        stats.bitrate(),
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    let stats = handle.stop().await;
    println!(
        "Served {} connections, {} frames",
        stats.total_connections, stats.frames_sent
    );

    Ok(())
}
