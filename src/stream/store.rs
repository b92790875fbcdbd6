//! Durable artifact stores
//!
//! A store opens one append target per channel. The sink's writer task owns
//! the returned writer, so opening is the only synchronous step.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncWrite, BufWriter};

use super::key::ChannelKey;

/// Writer handed to a sink's writer task
pub type ArtifactWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens durable append targets for channels
pub trait ArtifactStore: Send + Sync + 'static {
    fn open(&self, key: &ChannelKey) -> io::Result<ArtifactWriter>;
}

/// Appends each channel to `<root>/<session>/<channel>.h264`
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the given channel is written to
    pub fn path_for(&self, key: &ChannelKey) -> PathBuf {
        self.root
            .join(sanitize(&key.session_id))
            .join(format!("{}.h264", key.channel))
    }
}

impl ArtifactStore for FileArtifactStore {
    fn open(&self, key: &ChannelKey) -> io::Result<ArtifactWriter> {
        let path = self.path_for(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(channel = %key, path = %path.display(), "Opened channel artifact");

        Ok(Box::new(BufWriter::new(tokio::fs::File::from_std(file))))
    }
}

/// Discards everything; for deployments that only want live fan-out
#[derive(Debug, Clone, Copy, Default)]
pub struct NullArtifactStore;

impl ArtifactStore for NullArtifactStore {
    fn open(&self, _key: &ChannelKey) -> io::Result<ArtifactWriter> {
        Ok(Box::new(tokio::io::sink()))
    }
}

/// Session keys come from devices; keep them to one path component
fn sanitize(session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "_".into()
    } else {
        cleaned
    }
}
