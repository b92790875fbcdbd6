//! Recorder Server - Records every device channel to an Annex-B file
//!
//! Run with: cargo run --example recorder_server -- [output_dir] [bind_addr]
//!
//! This example demonstrates:
//! - Using `N9mHandler` to observe device registration and disconnects
//! - Recording each (session, channel) pair through `FileArtifactStore`
//! - Auditing signal traffic with `on_frame`
//! - Periodic server statistics
//!
//! # Layout on disk
//!
//! ```text
//!   <output_dir>/
//!     <session>/
//!       1.h264
//!       2.h264
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use n9m_rs::protocol::{DeviceInfo, Frame, PayloadType};
use n9m_rs::server::{FrameDirection, N9mHandler};
use n9m_rs::session::ConnectionContext;
use n9m_rs::stream::FileArtifactStore;
use n9m_rs::{N9mServer, ServerConfig};

/// Logs device lifecycle and counts signalling traffic
#[derive(Default)]
struct RecorderHandler {
    signals_in: AtomicU64,
    signals_out: AtomicU64,
}

impl N9mHandler for RecorderHandler {
    async fn on_connection(&self, ctx: &ConnectionContext) -> bool {
        tracing::info!(connection = ctx.connection_id, peer = %ctx.peer_addr, "Device connected");
        true
    }

    async fn on_connect(&self, ctx: &ConnectionContext, device: &DeviceInfo) {
        tracing::info!(
            connection = ctx.connection_id,
            session_id = ctx.session_id.as_deref().unwrap_or_default(),
            serial = %device.serial,
            network = device.network.as_deref().unwrap_or("-"),
            "Device registered"
        );
    }

    fn on_frame(&self, session_id: &str, direction: FrameDirection, frame: &Frame) {
        if frame.payload_type != PayloadType::Signal {
            return;
        }
        let counter = match direction {
            FrameDirection::Inbound => &self.signals_in,
            FrameDirection::Outbound => &self.signals_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = %session_id,
            direction = ?direction,
            payload = %String::from_utf8_lossy(&frame.payload),
            "Signal"
        );
    }

    async fn on_disconnect(&self, ctx: &ConnectionContext) {
        tracing::info!(
            connection = ctx.connection_id,
            session_id = ctx.session_id.as_deref().unwrap_or_default(),
            media_frames = ctx.stats.media_frames,
            dropped = ctx.stats.dropped_frames,
            duration_secs = ctx.stats.duration.as_secs(),
            "Device disconnected"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("n9m_rs=info".parse()?)
                .add_directive("recorder_server=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let output_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("recordings"));
    let bind_addr: SocketAddr = match args.next() {
        Some(addr) => addr.parse()?,
        None => ServerConfig::default().bind_addr,
    };

    std::fs::create_dir_all(&output_dir)?;

    let config = ServerConfig::with_addr(bind_addr).media_endpoint(bind_addr.to_string());

    println!("N9M Recording Server");
    println!("====================");
    println!("Listening on: {}", config.bind_addr);
    println!("Output dir:   {}", output_dir.display());
    println!();
    println!("Press Ctrl+C to stop the server...");
    println!();

    let store = Arc::new(FileArtifactStore::new(&output_dir));
    let server = Arc::new(N9mServer::with_store(
        config,
        RecorderHandler::default(),
        store,
    ));

    // Periodic stats
    let stats_server = Arc::clone(&server);
    let stats_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let stats = stats_server.stats().await;
            tracing::info!(
                active_connections = stats.active_connections,
                total_connections = stats.total_connections,
                sessions = stats.active_sessions,
                uptime_secs = stats.uptime.as_secs(),
                "Server stats"
            );
        }
    });

    // Run until Ctrl+C
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };
    if let Err(e) = server.run_until(shutdown).await {
        eprintln!("Server error: {}", e);
    }

    stats_task.abort();
    println!("\nShutting down...");
    Ok(())
}
