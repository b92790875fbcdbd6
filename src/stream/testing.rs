//! In-memory artifact store for tests

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

use super::key::ChannelKey;
use super::store::{ArtifactStore, ArtifactWriter};

#[derive(Default)]
struct Shared {
    written: HashMap<ChannelKey, Vec<u8>>,
    appends: HashMap<ChannelKey, usize>,
    closes: HashMap<ChannelKey, usize>,
    opens: HashMap<ChannelKey, usize>,
    /// Data writes seen across all channels
    write_attempts: usize,
    /// The data write (1-based) that fails
    fail_at: Option<usize>,
}

/// Records every write and shutdown per channel
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store whose `nth` data write fails once
    pub(crate) fn failing_write(nth: usize) -> Self {
        let store = Self::default();
        store.shared.lock().unwrap().fail_at = Some(nth);
        store
    }

    pub(crate) fn written(&self, key: &ChannelKey) -> Vec<u8> {
        let shared = self.shared.lock().unwrap();
        shared.written.get(key).cloned().unwrap_or_default()
    }

    /// Number of `poll_write` calls that carried data
    pub(crate) fn append_count(&self, key: &ChannelKey) -> usize {
        let shared = self.shared.lock().unwrap();
        shared.appends.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn close_count(&self, key: &ChannelKey) -> usize {
        let shared = self.shared.lock().unwrap();
        shared.closes.get(key).copied().unwrap_or(0)
    }

    pub(crate) fn open_count(&self) -> usize {
        let shared = self.shared.lock().unwrap();
        shared.opens.values().sum()
    }

    pub(crate) fn total_closes(&self) -> usize {
        let shared = self.shared.lock().unwrap();
        shared.closes.values().sum()
    }
}

impl ArtifactStore for MemoryStore {
    fn open(&self, key: &ChannelKey) -> io::Result<ArtifactWriter> {
        *self
            .shared
            .lock()
            .unwrap()
            .opens
            .entry(key.clone())
            .or_default() += 1;

        Ok(Box::new(MemoryWriter {
            key: key.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MemoryWriter {
    key: ChannelKey,
    shared: Arc<Mutex<Shared>>,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut shared = self.shared.lock().unwrap();
        if !buf.is_empty() {
            shared.write_attempts += 1;
            if shared.fail_at == Some(shared.write_attempts) {
                return Poll::Ready(Err(io::Error::other("disk full")));
            }
        }
        shared
            .written
            .entry(self.key.clone())
            .or_default()
            .extend_from_slice(buf);
        if !buf.is_empty() {
            *shared.appends.entry(self.key.clone()).or_default() += 1;
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        *self
            .shared
            .lock()
            .unwrap()
            .closes
            .entry(self.key.clone())
            .or_default() += 1;
        Poll::Ready(Ok(()))
    }
}
