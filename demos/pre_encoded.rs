//! Stream a slideshow of JPEG files without an encoder
//!
//! Run with: cargo run --example pre_encoded [DIR] [SECRET]
//!
//! Every `.jpg`/`.jpeg` file in DIR (default: current directory) is published
//! in turn, one per second. Stop with Ctrl+C.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use streamserver::{ServerConfig, StreamServer};

async fn load_frames(dir: &Path) -> std::io::Result<Vec<(PathBuf, Bytes)>> {
    let mut frames = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));

        if is_jpeg {
            let data = tokio::fs::read(&path).await?;
            frames.push((path, Bytes::from(data)));
        }
    }

    frames.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(frames)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("streamserver=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let dir = PathBuf::from(args.get(1).map(String::as_str).unwrap_or("."));

    let frames = load_frames(&dir).await?;
    if frames.is_empty() {
        eprintln!("No JPEG files found in {}", dir.display());
        std::process::exit(1);
    }
    println!("Loaded {} frames from {}", frames.len(), dir.display());

    let mut config = ServerConfig::default().placeholder_frame(frames[0].1.clone());
    if let Some(secret) = args.get(2) {
        config = config.secret(secret.as_str());
    }

    let server = StreamServer::new(config)?;
    let store = server.frames();

    let slideshow = async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        for (path, data) in frames.iter().cycle() {
            ticker.tick().await;
            let version = store.publish(data.clone());
            tracing::debug!(frame = %path.display(), version = version, "Published");
        }
    };

    let stats = server
        .run_until(async move {
            tokio::select! {
                _ = slideshow => {}
                _ = tokio::signal::ctrl_c() => println!("\nShutting down..."),
            }
        })
        .await?;

    println!(
        "Served {} connections, {} bytes",
        stats.total_connections, stats.bytes_sent
    );

    Ok(())
}
