//! JSON-RPC over HTTP control plane.
//!
//! Each operation is a `POST /<name>` endpoint taking a JSON body and always
//! answering with a [`ResponseEnvelope`]. Request failures, including panics
//! inside callbacks, are reported to the client and never stop the server.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::post;
use bytes::Bytes;
use m3u8_core::PlaylistInfo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::callbacks::{CallbackResult, ControlCallbacks};
use crate::envelope::ResponseEnvelope;
use crate::error::RequestError;
use crate::request::ControlRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DownloadByUrl,
    DownloadByContent,
    DownloadByJsonContent,
    GetM3u8Data,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Self::DownloadByUrl,
        Self::DownloadByContent,
        Self::DownloadByJsonContent,
        Self::GetM3u8Data,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::DownloadByUrl => "downloadbyurl",
            Self::DownloadByContent => "downloadbycontent",
            Self::DownloadByJsonContent => "downloadbyjsoncontent",
            Self::GetM3u8Data => "getm3u8data",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum ServerState {
    Unconfigured,
    Configured(Arc<ControlCallbacks>),
}

/// Two-phase control server: construct, [`configure`](Self::configure) once, then run.
pub struct ControlServer {
    operations: Vec<Operation>,
    state: ServerState,
}

impl Default for ControlServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlServer {
    pub fn new() -> Self {
        let operations = Operation::ALL.to_vec();
        debug!(?operations, "Registered control operations");
        Self {
            operations,
            state: ServerState::Unconfigured,
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, ServerState::Configured(_))
    }

    /// Bind the download-engine callbacks. Allowed exactly once.
    pub fn configure(&mut self, callbacks: ControlCallbacks) -> Result<(), RequestError> {
        if self.is_configured() {
            return Err(RequestError::AlreadyConfigured);
        }
        self.state = ServerState::Configured(Arc::new(callbacks));
        Ok(())
    }

    /// Build the HTTP router with one `POST` route per registered operation.
    pub fn router(&self) -> Result<Router, RequestError> {
        let ServerState::Configured(callbacks) = &self.state else {
            return Err(RequestError::NotConfigured);
        };

        let mut router = Router::new();
        for &operation in &self.operations {
            router = router.route(
                &format!("/{}", operation.name()),
                post(
                    move |State(callbacks): State<Arc<ControlCallbacks>>,
                          body: Result<Bytes, BytesRejection>| {
                        handle(operation, callbacks, body)
                    },
                ),
            );
        }

        // Whole playlists are posted inline, so request bodies are not capped.
        Ok(router
            .with_state(Arc::clone(callbacks))
            .layer(DefaultBodyLimit::disable())
            .layer(TraceLayer::new_for_http()))
    }

    /// Bind `addr` and serve until `cancel` fires.
    pub async fn run(self, addr: SocketAddr, cancel: CancellationToken) -> Result<(), RequestError> {
        // Reject before binding so an unconfigured server never accepts a connection.
        if !self.is_configured() {
            return Err(RequestError::NotConfigured);
        }
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, cancel).await
    }

    /// Serve on an already bound listener until `cancel` fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), RequestError> {
        let router = self.router()?;
        info!(addr = %listener.local_addr()?, "Control server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        info!("Control server stopped");
        Ok(())
    }
}

async fn handle(
    operation: Operation,
    callbacks: Arc<ControlCallbacks>,
    body: Result<Bytes, BytesRejection>,
) -> ResponseEnvelope<PlaylistInfo> {
    let result = match body {
        Ok(body) => dispatch(operation, callbacks, &body).await,
        Err(rejection) => Err(RequestError::MalformedBody(rejection.body_text())),
    };
    match result {
        Ok(Some(playlist)) => {
            debug!(%operation, segments = playlist.segments.len(), "Playlist parsed");
            ResponseEnvelope::parsed(playlist)
        }
        Ok(None) => {
            debug!(%operation, "Request accepted");
            ResponseEnvelope::success()
        }
        Err(e) => {
            warn!(%operation, error = %e, "Request failed");
            ResponseEnvelope::error(&e)
        }
    }
}

async fn dispatch(
    operation: Operation,
    callbacks: Arc<ControlCallbacks>,
    body: &[u8],
) -> Result<Option<PlaylistInfo>, RequestError> {
    let request = ControlRequest::from_slice(body)?;

    match operation {
        Operation::DownloadByUrl => {
            let call = request.into_url_download()?;
            invoke(move || (callbacks.download_by_url)(call)).await?;
            Ok(None)
        }
        Operation::DownloadByContent => {
            let call = request.into_content_download()?;
            invoke(move || (callbacks.download_by_content)(call)).await?;
            Ok(None)
        }
        Operation::DownloadByJsonContent => {
            let call = request.into_playlist_download()?;
            invoke(move || (callbacks.download_by_playlist_info)(call)).await?;
            Ok(None)
        }
        Operation::GetM3u8Data => {
            let call = request.into_parse_request()?;
            let playlist = invoke(move || (callbacks.parse_playlist)(call)).await?;
            Ok(Some(playlist))
        }
    }
}

/// Run a callback on the blocking pool, turning its errors and panics into request errors.
async fn invoke<T, F>(callback: F) -> Result<T, RequestError>
where
    T: Send + 'static,
    F: FnOnce() -> CallbackResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(callback).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(RequestError::Callback(e.to_string())),
        Err(join_error) if join_error.is_panic() => {
            let payload = join_error.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(%message, "Callback panicked");
            Err(RequestError::CallbackPanic(message))
        }
        Err(join_error) => Err(RequestError::Callback(join_error.to_string())),
    }
}
