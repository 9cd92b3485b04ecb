// Decrypting pipeline: key resolution up front, then lazy decryption of each fetched segment.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::decrypt::{SegmentDecryptor, decrypt_stream};
use crate::error::{CoreError, Result};
use crate::key::KeyStore;
use crate::media::PlaylistInfo;
use crate::stream::{ByteStream, StreamTransform, apply_transforms, cancellable};

const DEFAULT_KEY_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a [`DecryptingPipeline`]. No state is entered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Initializing,
    Ready,
    Streaming,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct DecryptingPipeline {
    playlist: PlaylistInfo,
    key_store: Arc<KeyStore>,
    key_timeout: Duration,
    transforms: Vec<Arc<dyn StreamTransform>>,
    state: Arc<Mutex<PipelineState>>,
}

impl DecryptingPipeline {
    pub fn new(playlist: PlaylistInfo, key_store: Arc<KeyStore>) -> Self {
        Self {
            playlist,
            key_store,
            key_timeout: DEFAULT_KEY_TIMEOUT,
            transforms: Vec::new(),
            state: Arc::new(Mutex::new(PipelineState::Created)),
        }
    }

    pub fn with_key_timeout(mut self, timeout: Duration) -> Self {
        self.key_timeout = timeout;
        self
    }

    /// Add a transform run on the decrypted stream, after any added earlier.
    pub fn with_transform(mut self, transform: Arc<dyn StreamTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    pub fn playlist(&self) -> &PlaylistInfo {
        &self.playlist
    }

    pub fn into_playlist(self) -> PlaylistInfo {
        self.playlist
    }

    fn transition(&self, from: &[PipelineState], to: PipelineState) -> Result<()> {
        let mut state = self.state.lock();
        if !from.contains(&*state) {
            return Err(CoreError::InvalidState(format!(
                "cannot move from {} to {to}",
                *state
            )));
        }
        if *state != to {
            debug!(from = %*state, %to, "Pipeline state change");
        }
        *state = to;
        Ok(())
    }

    /// Resolve and validate the playlist key. Must complete before any segment is transformed.
    ///
    /// Any error is fatal for the whole download and leaves the pipeline `Failed`.
    pub async fn initialize(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.transition(&[PipelineState::Created], PipelineState::Initializing)?;

        let result = self
            .key_store
            .resolve_key(self.playlist.key.as_mut(), self.key_timeout, cancel)
            .await
            .and_then(|()| {
                // resolve_key succeeded, so the descriptor is present
                match &self.playlist.key {
                    Some(descriptor) => descriptor.iv_block().map(|_| ()),
                    None => Err(CoreError::configuration("no usable key information")),
                }
            });

        match result {
            Ok(()) => self.transition(&[PipelineState::Initializing], PipelineState::Ready),
            Err(e) => {
                *self.state.lock() = PipelineState::Failed;
                warn!(error = %e, "Pipeline initialization failed");
                Err(e)
            }
        }
    }

    /// Wrap a freshly fetched segment stream so it is decrypted as it is read,
    /// then passed through the registered transforms in order.
    pub fn transform_after_fetch(
        &self,
        raw: ByteStream,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<ByteStream> {
        let descriptor = self
            .playlist
            .key
            .as_ref()
            .ok_or_else(|| CoreError::InvalidState("pipeline is not initialized".to_string()))?;
        let key = descriptor
            .key_bytes
            .as_deref()
            .ok_or_else(|| CoreError::InvalidState("pipeline is not initialized".to_string()))?;

        self.transition(
            &[PipelineState::Ready, PipelineState::Streaming],
            PipelineState::Streaming,
        )?;

        let decryptor = SegmentDecryptor::new(descriptor.method, key, &descriptor.iv_block()?)?;
        let decrypted = decrypt_stream(cancellable(raw, cancel.clone()), decryptor);
        let transformed = apply_transforms(decrypted, content_type, &self.transforms);

        Ok(track_failures(transformed, Arc::clone(&self.state)))
    }

    /// Mark the download complete. Fails if a segment stream already failed.
    pub fn finish(&self) -> Result<()> {
        self.transition(
            &[PipelineState::Ready, PipelineState::Streaming],
            PipelineState::Done,
        )
    }
}

/// Move the pipeline to `Failed` when a segment stream yields an error other than cancellation.
fn track_failures(input: ByteStream, state: Arc<Mutex<PipelineState>>) -> ByteStream {
    input
        .inspect(move |item| {
            if let Err(e) = item {
                if !e.is_cancelled() {
                    warn!(error = %e, "Segment stream failed");
                    *state.lock() = PipelineState::Failed;
                }
            }
        })
        .boxed()
}
