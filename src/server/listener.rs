//! N9M server listener
//!
//! Handles TCP accept loop and spawns connection handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::dispatch::SignalDispatcher;
use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::server::handler::N9mHandler;
use crate::stats::ServerStats;
use crate::stream::{ArtifactStore, FileArtifactStore, NullArtifactStore, StreamDemuxer};

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    active: AtomicU64,
    rejected: AtomicU64,
}

/// N9M server
pub struct N9mServer<H: N9mHandler> {
    config: Arc<ServerConfig>,
    dispatcher: Arc<SignalDispatcher<H>>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    counters: Arc<Counters>,
    started_at: Instant,
}

impl<H: N9mHandler> N9mServer<H> {
    /// Create a new server with the given configuration and handler
    ///
    /// Channels are recorded under `record_dir` when it is set and
    /// discarded otherwise.
    pub fn new(config: ServerConfig, handler: H) -> Self {
        let store: Arc<dyn ArtifactStore> = match config.record_dir {
            Some(ref dir) => Arc::new(FileArtifactStore::new(dir.clone())),
            None => Arc::new(NullArtifactStore),
        };
        Self::with_store(config, handler, store)
    }

    /// Create a new server writing channels to a custom store
    pub fn with_store(config: ServerConfig, handler: H, store: Arc<dyn ArtifactStore>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = Arc::new(SessionRegistry::new());
        let demuxer = Arc::new(StreamDemuxer::new(
            Arc::clone(&registry),
            store,
            config.sink.clone(),
        ));
        let dispatcher = Arc::new(SignalDispatcher::new(
            config.dispatch_config(),
            Arc::new(handler),
            registry,
            demuxer,
        ));

        Self {
            config: Arc::new(config),
            dispatcher,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
            counters: Arc::new(Counters::default()),
            started_at: Instant::now(),
        }
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.dispatcher.registry()
    }

    /// Get a reference to the media demuxer (for live subscriptions)
    pub fn demuxer(&self) -> &Arc<StreamDemuxer> {
        self.dispatcher.demuxer()
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    ///
    /// Once `shutdown` resolves, every open connection is closed the same
    /// way as an idle one (session released, sinks flushed) before this
    /// returns.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Accept connections on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_until(listener, std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves, then drain them
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = %listener.local_addr()?, "N9M server listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        self.handle_connection(&mut connections, &stop_rx, socket, peer_addr);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },

                // Reap finished connection tasks
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(listener);
        stop_tx.send_replace(true);

        let open = connections.len();
        if open > 0 {
            tracing::info!(connections = open, "Closing open connections");
        }
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Connection task failed");
            }
        }

        Ok(())
    }

    fn handle_connection(
        &self,
        connections: &mut JoinSet<()>,
        stop: &watch::Receiver<bool>,
        socket: TcpStream,
        peer_addr: SocketAddr,
    ) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            connection = connection_id,
            peer = %peer_addr,
            "New connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.counters.active.fetch_add(1, Ordering::Relaxed);

        let config = Arc::clone(&self.config);
        let dispatcher = Arc::clone(&self.dispatcher);
        let counters = Arc::clone(&self.counters);
        let stop = stop.clone();

        connections.spawn(async move {
            // Held for the connection's lifetime
            let _permit = permit;

            let mut connection =
                Connection::new(connection_id, socket, peer_addr, config, dispatcher)
                    .with_shutdown(stop);

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    connection = connection_id,
                    error = %e,
                    "Connection error"
                );
            }

            counters.active.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(connection = connection_id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    /// Server-wide counters
    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            total_connections: self.counters.total.load(Ordering::Relaxed),
            active_connections: self.counters.active.load(Ordering::Relaxed),
            rejected_connections: self.counters.rejected.load(Ordering::Relaxed),
            active_sessions: self.registry().session_count().await as u64,
            uptime: self.started_at.elapsed(),
        }
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
