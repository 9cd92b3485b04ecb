//! The download-engine functions a [`ControlServer`](crate::ControlServer) dispatches to.

use std::collections::HashMap;
use std::sync::Arc;

use m3u8_core::{EncryptionMethod, PlaylistInfo};
use url::Url;

/// Error type callbacks report failures with.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;
pub type CallbackResult<T = ()> = Result<T, CallbackError>;

/// Optional fields every operation forwards unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadOptions {
    pub name: Option<String>,
    pub save_path: Option<String>,
    pub plugin: Option<String>,
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrlDownload {
    pub url: Url,
    pub method: EncryptionMethod,
    pub key: Option<String>,
    pub iv: Option<String>,
    pub options: DownloadOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentDownload {
    pub content: String,
    pub base_url: Option<Url>,
    pub options: DownloadOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistDownload {
    pub playlist: PlaylistInfo,
    pub options: DownloadOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseRequest {
    pub content: String,
    pub base_url: Option<Url>,
}

type Callback<A, R = ()> = Arc<dyn Fn(A) -> CallbackResult<R> + Send + Sync>;

/// The four functions bound by [`ControlServer::configure`](crate::ControlServer::configure).
///
/// Callbacks run on the blocking thread pool, one call per request, and may
/// be invoked concurrently.
#[derive(Clone)]
pub struct ControlCallbacks {
    pub(crate) download_by_url: Callback<UrlDownload>,
    pub(crate) download_by_content: Callback<ContentDownload>,
    pub(crate) download_by_playlist_info: Callback<PlaylistDownload>,
    pub(crate) parse_playlist: Callback<ParseRequest, PlaylistInfo>,
}

impl ControlCallbacks {
    pub fn new<U, C, P, Q>(
        download_by_url: U,
        download_by_content: C,
        download_by_playlist_info: P,
        parse_playlist: Q,
    ) -> Self
    where
        U: Fn(UrlDownload) -> CallbackResult + Send + Sync + 'static,
        C: Fn(ContentDownload) -> CallbackResult + Send + Sync + 'static,
        P: Fn(PlaylistDownload) -> CallbackResult + Send + Sync + 'static,
        Q: Fn(ParseRequest) -> CallbackResult<PlaylistInfo> + Send + Sync + 'static,
    {
        Self {
            download_by_url: Arc::new(download_by_url),
            download_by_content: Arc::new(download_by_content),
            download_by_playlist_info: Arc::new(download_by_playlist_info),
            parse_playlist: Arc::new(parse_playlist),
        }
    }
}

impl std::fmt::Debug for ControlCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlCallbacks").finish_non_exhaustive()
    }
}
