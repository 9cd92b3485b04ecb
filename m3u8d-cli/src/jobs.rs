//! Download jobs accepted over the control plane and the worker that prepares them.
//!
//! A job is ready once its playlist is known and, for encrypted playlists,
//! its key has been resolved through a [`DecryptingPipeline`]. Segment
//! transfer and muxing are left to the download engine.

use std::sync::Arc;
use std::time::Duration;

use m3u8_core::media::decode_bytes_text;
use m3u8_core::{
    ByteSource, CoreError, DecryptingPipeline, EncryptionDescriptor, EncryptionMethod, KeyStore,
    PlaylistInfo, UriResolver, with_deadline,
};
use rest_server::{
    CallbackResult, ContentDownload, ControlCallbacks, DownloadOptions, ParseRequest,
    PlaylistDownload, UrlDownload,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::playlist::parse_playlist;
use crate::utils::header_map;

#[derive(Debug)]
pub enum Job {
    Url(UrlDownload),
    Content(ContentDownload),
    Playlist(PlaylistDownload),
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl JobQueue {
    pub fn submit(&self, job: Job) -> CallbackResult {
        self.tx
            .send(job)
            .map_err(|_| "download queue is closed".into())
    }
}

/// Shared collaborators of every job.
#[derive(Clone)]
pub struct JobContext {
    pub source: Arc<dyn ByteSource>,
    pub resolver: Arc<dyn UriResolver>,
    pub fetch_timeout: Duration,
    pub key_timeout: Duration,
    pub resolve_timeout: Duration,
}

pub enum Prepared {
    Plain(PlaylistInfo),
    Encrypted(DecryptingPipeline),
}

impl Prepared {
    pub fn playlist(&self) -> &PlaylistInfo {
        match self {
            Self::Plain(playlist) => playlist,
            Self::Encrypted(pipeline) => pipeline.playlist(),
        }
    }
}

/// Bind the control-plane callbacks to `queue` and the playlist parser.
pub fn control_callbacks(queue: JobQueue) -> ControlCallbacks {
    let (by_url, by_content, by_playlist) = (queue.clone(), queue.clone(), queue);
    ControlCallbacks::new(
        move |call: UrlDownload| by_url.submit(Job::Url(call)),
        move |call: ContentDownload| by_content.submit(Job::Content(call)),
        move |call: PlaylistDownload| by_playlist.submit(Job::Playlist(call)),
        |call: ParseRequest| {
            parse_playlist(&call.content, call.base_url.as_ref()).map_err(Into::into)
        },
    )
}

/// Start the job worker. It stops taking jobs when `cancel` fires and waits
/// for the jobs already started.
pub fn spawn_worker(ctx: JobContext, cancel: CancellationToken) -> (JobQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

    let handle = tokio::spawn(async move {
        let tracker = TaskTracker::new();
        let mut next_id = 0u64;

        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            next_id += 1;
            let id = next_id;
            let ctx = ctx.clone();
            let job_cancel = cancel.child_token();
            tracker.spawn(async move {
                let name = job_name(&job);
                info!(id, name, "Job accepted");
                match prepare(job, &ctx, &job_cancel).await {
                    Ok((options, prepared)) => info!(
                        id,
                        name = options.name.as_deref().unwrap_or_default(),
                        save_path = options.save_path.as_deref().unwrap_or_default(),
                        segments = prepared.playlist().segments.len(),
                        encrypted = matches!(prepared, Prepared::Encrypted(_)),
                        "Job ready for download"
                    ),
                    Err(AppError::Core(CoreError::Cancelled)) => debug!(id, "Job cancelled"),
                    Err(e) => warn!(id, error = %e, "Job failed"),
                }
            });
        }

        tracker.close();
        tracker.wait().await;
        debug!("Job worker stopped");
    });

    (JobQueue { tx }, handle)
}

fn job_name(job: &Job) -> &'static str {
    match job {
        Job::Url(_) => "url",
        Job::Content(_) => "content",
        Job::Playlist(_) => "playlist",
    }
}

/// Turn a job into a playlist and, when it is encrypted, an initialized pipeline.
pub async fn prepare(
    job: Job,
    ctx: &JobContext,
    cancel: &CancellationToken,
) -> Result<(DownloadOptions, Prepared), AppError> {
    let (playlist, options) = match job {
        Job::Url(call) => {
            let headers = header_map(call.options.headers.as_ref());
            let source = ctx.resolver.resolve(&call.url, ctx.resolve_timeout, cancel).await?;
            let data = with_deadline(
                cancel,
                ctx.fetch_timeout,
                || {
                    CoreError::fetch(format!(
                        "playlist fetch from {source} got no response within {:?}",
                        ctx.fetch_timeout
                    ))
                },
                ctx.source.fetch_bytes(&source, &headers),
            )
            .await?;

            let base = source
                .join(".")
                .map_err(|e| AppError::InvalidInput(format!("Failed to determine base URL: {e}")))?;
            let mut playlist = parse_playlist(&String::from_utf8_lossy(&data), Some(&base))?;
            playlist.uri = Some(source);
            apply_key_override(&mut playlist, call.method, call.key, call.iv)?;
            (playlist, call.options)
        }
        Job::Content(call) => (
            parse_playlist(&call.content, call.base_url.as_ref())?,
            call.options,
        ),
        Job::Playlist(call) => (call.playlist, call.options),
    };

    if playlist.key.is_none() {
        return Ok((options, Prepared::Plain(playlist)));
    }

    let key_store = KeyStore::new(Arc::clone(&ctx.source))
        .with_resolver(Arc::clone(&ctx.resolver))
        .with_resolve_timeout(ctx.resolve_timeout)
        .with_headers(header_map(options.headers.as_ref()));
    let mut pipeline =
        DecryptingPipeline::new(playlist, Arc::new(key_store)).with_key_timeout(ctx.key_timeout);
    pipeline.initialize(cancel).await?;

    Ok((options, Prepared::Encrypted(pipeline)))
}

/// Key and IV given with a `downloadbyurl` request take precedence over the playlist's.
fn apply_key_override(
    playlist: &mut PlaylistInfo,
    method: EncryptionMethod,
    key: Option<String>,
    iv: Option<String>,
) -> Result<(), AppError> {
    let iv = match iv.filter(|iv| !iv.trim().is_empty()) {
        Some(text) => Some(
            decode_bytes_text(&text).ok_or_else(|| AppError::InvalidInput(format!("Invalid IV {text}")))?,
        ),
        None => None,
    };

    match key.filter(|key| !key.is_empty()) {
        Some(key) => {
            let iv = iv
                .or_else(|| playlist.key.as_ref().map(|k| k.iv.clone()))
                .unwrap_or_else(|| {
                    let sequence = playlist
                        .extra
                        .get("mediaSequence")
                        .and_then(serde_json::Value::as_u64)
                        .unwrap_or(0);
                    EncryptionDescriptor::sequence_iv(sequence).to_vec()
                });
            playlist.key = Some(EncryptionDescriptor::with_key_bytes(method, key.into_bytes(), iv));
        }
        None => {
            if let (Some(descriptor), Some(iv)) = (playlist.key.as_mut(), iv) {
                descriptor.iv = iv;
            }
        }
    }
    Ok(())
}
