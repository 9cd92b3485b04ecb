//! # rest-server
//!
//! JSON-RPC over HTTP control plane for the m3u8 downloader.
//!
//! Four operations (`downloadbyurl`, `downloadbycontent`,
//! `downloadbyjsoncontent`, `getm3u8data`) validate their JSON body, build
//! the matching callback arguments and hand them to the download engine.

pub mod callbacks;
pub mod envelope;
pub mod error;
pub mod request;
pub mod server;

pub use callbacks::{
    CallbackError, CallbackResult, ContentDownload, ControlCallbacks, DownloadOptions,
    ParseRequest, PlaylistDownload, UrlDownload,
};
pub use envelope::ResponseEnvelope;
pub use error::RequestError;
pub use request::{ControlRequest, normalize_base_url};
pub use server::{ControlServer, Operation};
