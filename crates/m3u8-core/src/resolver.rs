// Source URI resolution: maps a playlist or key address to the address actually fetched.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::{CoreError, Result};
use crate::scope::with_deadline;

/// Maps a source URI to the effective URI to fetch.
///
/// Implementations must honor both `timeout` and `cancel`: a timeout surfaces
/// as [`CoreError::Fetch`], caller cancellation as [`CoreError::Cancelled`].
#[async_trait]
pub trait UriResolver: Send + Sync {
    async fn resolve(
        &self,
        source: &Url,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Url>;
}

/// Returns the source unchanged without any I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

#[async_trait]
impl UriResolver for IdentityResolver {
    async fn resolve(
        &self,
        source: &Url,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Url> {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(source.clone())
    }
}

/// Follows HTTP redirects with a HEAD request and returns the final address.
///
/// Non-HTTP sources are returned unchanged.
#[derive(Clone)]
pub struct RedirectResolver {
    http_client: Client,
}

impl RedirectResolver {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl UriResolver for RedirectResolver {
    async fn resolve(
        &self,
        source: &Url,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Url> {
        if !matches!(source.scheme(), "http" | "https") {
            return IdentityResolver.resolve(source, timeout, cancel).await;
        }

        let resolved = with_deadline(
            cancel,
            timeout,
            || CoreError::fetch(format!("resolving {source} timed out after {timeout:?}")),
            async {
                let response = self.http_client.head(source.clone()).send().await?;
                Ok::<_, CoreError>(response.url().clone())
            },
        )
        .await?;

        if &resolved != source {
            debug!(%source, %resolved, "Source URI redirected");
        }
        Ok(resolved)
    }
}
