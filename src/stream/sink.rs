//! Per-channel sink
//!
//! A sink has two independent outputs:
//!
//! ```text
//!                      ┌──► mpsc (bounded) ──► writer task ──► ArtifactWriter
//!   append(Bytes) ─────┤
//!                      └──► broadcast ──► live subscribers
//! ```
//!
//! Neither path awaits. A full write queue drops the frame for the durable
//! path only, and a lagging subscriber misses frames without slowing the
//! producer (`broadcast` semantics).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::key::ChannelKey;
use super::store::{ArtifactStore, ArtifactWriter};
use crate::error::SinkError;

/// Sink tuning
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Frames a live subscriber may fall behind before it starts losing frames
    pub broadcast_capacity: usize,

    /// Frames queued for the durable writer before appends are dropped
    pub write_queue_depth: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
            write_queue_depth: 512,
        }
    }
}

impl SinkConfig {
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    pub fn write_queue_depth(mut self, depth: usize) -> Self {
        self.write_queue_depth = depth.max(1);
        self
    }
}

/// Point-in-time sink counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Frames accepted by `append`
    pub frames: u64,
    /// Bytes accepted by `append`
    pub bytes: u64,
    /// Frames the durable path dropped (queue full)
    pub dropped_frames: u64,
    /// Durable writes that failed
    pub write_errors: u64,
    /// Currently attached live subscribers
    pub subscribers: usize,
}

#[derive(Debug, Default)]
struct Counters {
    frames: AtomicU64,
    bytes: AtomicU64,
    dropped_frames: AtomicU64,
    write_errors: AtomicU64,
}

struct Outputs {
    queue: Option<mpsc::Sender<Bytes>>,
    fanout: Option<broadcast::Sender<Bytes>>,
    writer: Option<JoinHandle<()>>,
}

/// Append target for one (session, channel) pair
pub struct Sink {
    key: ChannelKey,
    outputs: Mutex<Outputs>,
    counters: Arc<Counters>,
}

impl Sink {
    /// Open the channel's artifact and start its writer task
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        key: ChannelKey,
        store: &dyn ArtifactStore,
        config: &SinkConfig,
    ) -> Result<Self, SinkError> {
        let target = store
            .open(&key)
            .map_err(|e| SinkError::Open(e.to_string()))?;

        let (queue_tx, queue_rx) = mpsc::channel(config.write_queue_depth.max(1));
        let (fanout_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let counters = Arc::new(Counters::default());

        let writer = tokio::spawn(run_writer(
            key.clone(),
            target,
            queue_rx,
            Arc::clone(&counters),
        ));

        tracing::info!(channel = %key, "Sink opened");

        Ok(Self {
            key,
            outputs: Mutex::new(Outputs {
                queue: Some(queue_tx),
                fanout: Some(fanout_tx),
                writer: Some(writer),
            }),
            counters,
        })
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Append bytes to the durable artifact and forward them to live viewers
    ///
    /// Never waits. Returns `SinkError::Backlogged` when the durable queue is
    /// full; the frame is still forwarded to subscribers.
    pub fn append(&self, data: Bytes) -> Result<(), SinkError> {
        let outputs = self.lock();
        let queue = outputs.queue.as_ref().ok_or(SinkError::Closed)?;

        self.counters.frames.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        if let Some(ref fanout) = outputs.fanout {
            // Err only means nobody is watching
            let _ = fanout.send(data.clone());
        }

        match queue.try_send(data) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(SinkError::Backlogged)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped_frames.fetch_add(1, Ordering::Relaxed);
                Err(SinkError::Closed)
            }
        }
    }

    /// Attach a live subscriber
    ///
    /// Returns `None` once the sink is closed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Bytes>> {
        self.lock().fanout.as_ref().map(broadcast::Sender::subscribe)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().queue.is_none()
    }

    pub fn stats(&self) -> SinkStats {
        let subscribers = self
            .lock()
            .fanout
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count);

        SinkStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
            dropped_frames: self.counters.dropped_frames.load(Ordering::Relaxed),
            write_errors: self.counters.write_errors.load(Ordering::Relaxed),
            subscribers,
        }
    }

    /// Flush and release the artifact and detach all subscribers
    ///
    /// Waits for queued appends to reach the artifact. Calling it again is a
    /// no-op.
    pub async fn close(&self) {
        let writer = {
            let mut outputs = self.lock();
            if outputs.queue.is_none() {
                return;
            }
            // Dropping the senders ends the writer loop and the subscribers' streams
            outputs.queue = None;
            outputs.fanout = None;
            outputs.writer.take()
        };

        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                tracing::error!(channel = %self.key, error = %e, "Sink writer task failed");
            }
        }

        tracing::info!(
            channel = %self.key,
            frames = self.counters.frames.load(Ordering::Relaxed),
            bytes = self.counters.bytes.load(Ordering::Relaxed),
            "Sink closed"
        );
    }

    fn lock(&self) -> MutexGuard<'_, Outputs> {
        self.outputs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("key", &self.key)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn run_writer(
    key: ChannelKey,
    mut target: ArtifactWriter,
    mut queue: mpsc::Receiver<Bytes>,
    counters: Arc<Counters>,
) {
    while let Some(data) = queue.recv().await {
        if let Err(e) = target.write_all(&data).await {
            counters.write_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(channel = %key, error = %e, len = data.len(), "Durable append failed");
        }
    }

    if let Err(e) = target.flush().await {
        tracing::warn!(channel = %key, error = %e, "Failed to flush artifact");
    }
    if let Err(e) = target.shutdown().await {
        tracing::warn!(channel = %key, error = %e, "Failed to close artifact");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::testing::MemoryStore;

    #[tokio::test]
    async fn test_append_reaches_artifact_in_order() {
        let store = MemoryStore::new();
        let key = ChannelKey::new("s1", 5);
        let sink = Sink::open(key.clone(), &store, &SinkConfig::default()).unwrap();

        sink.append(Bytes::from_static(&[1, 2])).unwrap();
        sink.append(Bytes::from_static(&[3])).unwrap();
        sink.close().await;

        assert_eq!(store.written(&key), vec![1, 2, 3]);
        assert_eq!(store.close_count(&key), 1);

        let stats = sink.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.bytes, 3);
        assert_eq!(stats.dropped_frames, 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = MemoryStore::new();
        let key = ChannelKey::new("s1", 1);
        let sink = Sink::open(key.clone(), &store, &SinkConfig::default()).unwrap();

        sink.close().await;
        sink.close().await;

        assert!(sink.is_closed());
        assert_eq!(store.close_count(&key), 1);
        assert_eq!(
            sink.append(Bytes::from_static(b"late")),
            Err(SinkError::Closed)
        );
    }

    #[tokio::test]
    async fn test_subscribers_receive_live_bytes_and_detach_on_close() {
        let store = MemoryStore::new();
        let sink = Sink::open(ChannelKey::new("s1", 2), &store, &SinkConfig::default()).unwrap();

        let mut viewer = sink.subscribe().unwrap();
        assert_eq!(sink.stats().subscribers, 1);

        sink.append(Bytes::from_static(b"nal")).unwrap();
        assert_eq!(viewer.recv().await.unwrap(), Bytes::from_static(b"nal"));

        sink.close().await;
        assert!(matches!(
            viewer.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(sink.subscribe().is_none());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block_producer() {
        let store = MemoryStore::new();
        let key = ChannelKey::new("s1", 3);
        let config = SinkConfig::default().broadcast_capacity(2);
        let sink = Sink::open(key.clone(), &store, &config).unwrap();

        // Never read from until all appends are done
        let mut slow = sink.subscribe().unwrap();

        for i in 0..10u8 {
            sink.append(Bytes::from(vec![i])).unwrap();
        }

        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));

        sink.close().await;
        assert_eq!(store.written(&key), (0..10u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_full_queue_drops_durable_frame_only() {
        let store = MemoryStore::new();
        let key = ChannelKey::new("s1", 4);
        let config = SinkConfig::default().write_queue_depth(1);
        let sink = Sink::open(key.clone(), &store, &config).unwrap();
        let mut viewer = sink.subscribe().unwrap();

        // The writer task cannot run between these appends on the
        // current-thread runtime, so only the first one fits the queue.
        let mut backlogged = 0u64;
        for i in 0..8u8 {
            if sink.append(Bytes::from(vec![i])) == Err(SinkError::Backlogged) {
                backlogged += 1;
            }
        }

        assert_eq!(backlogged, 7);
        assert_eq!(sink.stats().dropped_frames, 7);

        // Live viewers still saw every frame
        for i in 0..8u8 {
            assert_eq!(viewer.recv().await.unwrap(), Bytes::from(vec![i]));
        }

        sink.close().await;
        assert_eq!(store.written(&key), vec![0]);
        assert_eq!(store.close_count(&key), 1);
    }

    #[tokio::test]
    async fn test_failed_write_loses_only_that_frame() {
        let store = MemoryStore::failing_write(2);
        let key = ChannelKey::new("s1", 6);
        let sink = Sink::open(key.clone(), &store, &SinkConfig::default()).unwrap();

        for frame in [&b"a"[..], b"b", b"c", b"d"] {
            sink.append(Bytes::copy_from_slice(frame)).unwrap();
        }
        sink.close().await;

        assert_eq!(store.written(&key), b"acd".to_vec());
        assert_eq!(store.close_count(&key), 1);

        let stats = sink.stats();
        assert_eq!(stats.write_errors, 1);
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.dropped_frames, 0);
    }

    #[tokio::test]
    async fn test_sink_keeps_accepting_after_failed_write() {
        let store = MemoryStore::failing_write(1);
        let key = ChannelKey::new("s1", 8);
        let sink = Sink::open(key.clone(), &store, &SinkConfig::default()).unwrap();

        sink.append(Bytes::from_static(b"lost")).unwrap();
        // Let the writer task hit the failure before the next append
        while sink.stats().write_errors == 0 {
            tokio::task::yield_now().await;
        }

        assert!(!sink.is_closed());
        sink.append(Bytes::from_static(b"kept")).unwrap();
        sink.close().await;

        assert_eq!(store.written(&key), b"kept".to_vec());
        assert_eq!(store.close_count(&key), 1);
    }

    #[test]
    fn test_sink_config_builder() {
        let config = SinkConfig::default()
            .broadcast_capacity(0)
            .write_queue_depth(64);
        assert_eq!(config.broadcast_capacity, 1);
        assert_eq!(config.write_queue_depth, 64);
    }
}
