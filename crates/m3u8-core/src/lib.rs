//! # m3u8-core
//!
//! Key acquisition and streaming decryption for encrypted HLS media segments.
//!
//! ## Features
//!
//! - AES-128/192/256 CBC keys, inline or fetched from a local file or HTTP endpoint
//! - Key fetches bounded by a deadline and by caller cancellation
//! - Lazy, chunk-by-chunk segment decryption composed with further stream transforms
//! - JSON-friendly playlist descriptions shared with the control plane

pub mod builder;
pub mod client;
pub mod config;
pub mod decrypt;
pub mod error;
pub mod fetch;
pub mod key;
pub mod media;
pub mod pipeline;
pub mod proxy;
pub mod resolver;
pub mod scope;
pub mod stream;

pub use builder::DownloaderConfigBuilder;
pub use client::create_client;
pub use config::DownloaderConfig;
pub use error::{CoreError, Result};

pub use decrypt::{SegmentDecryptor, decrypt_stream};
pub use fetch::{ByteSource, HttpByteSource};
pub use key::{KeyStore, normalize_key};
pub use media::{
    EncryptionDescriptor, EncryptionMethod, IV_LEN, MediaSegment, PlaylistInfo, parse_location,
};
pub use pipeline::{DecryptingPipeline, PipelineState};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use resolver::{IdentityResolver, RedirectResolver, UriResolver};
pub use scope::{DeadlineScope, Interrupted, with_deadline};
pub use stream::{ByteStream, StreamReader, StreamTransform, apply_transforms, cancellable};
