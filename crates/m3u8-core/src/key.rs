// Key store: resolves and validates the decryption key of an encryption descriptor.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::fetch::ByteSource;
use crate::media::{EncryptionDescriptor, EncryptionMethod, decode_bytes_text};
use crate::resolver::{IdentityResolver, UriResolver};
use crate::scope::{DeadlineScope, Interrupted};

const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Validate key material against `method`.
///
/// Raw bytes of exactly the required length are taken as-is. Anything else is
/// read as hex or base64 text and accepted only if it decodes to the required length.
pub fn normalize_key(raw: &[u8], method: EncryptionMethod) -> Result<Vec<u8>> {
    let expected = method.key_len();
    if raw.is_empty() {
        return Err(CoreError::configuration("key is empty"));
    }
    if raw.len() == expected {
        return Ok(raw.to_vec());
    }

    if let Some(decoded) = std::str::from_utf8(raw).ok().and_then(decode_bytes_text) {
        if decoded.len() == expected {
            return Ok(decoded);
        }
    }

    Err(CoreError::configuration(format!(
        "{method} key must be {expected} bytes, got {}",
        raw.len()
    )))
}

pub struct KeyStore {
    source: Arc<dyn ByteSource>,
    resolver: Arc<dyn UriResolver>,
    resolve_timeout: Duration,
    headers: HeaderMap,
}

impl KeyStore {
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self {
            source,
            resolver: Arc::new(IdentityResolver),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn UriResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Deadline for mapping a key location through the resolver. Zero means none.
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// Transport headers sent with remote key requests.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Fill `descriptor.key_bytes` with validated key material.
    ///
    /// A descriptor with a key location and no inline key is fetched under a
    /// deadline of `timeout` linked to `cancel`. Inline keys are validated
    /// without any I/O. Resolving an already resolved descriptor re-validates
    /// the stored key and changes nothing.
    pub async fn resolve_key(
        &self,
        descriptor: Option<&mut EncryptionDescriptor>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let descriptor =
            descriptor.ok_or_else(|| CoreError::configuration("no usable key information"))?;
        let method = descriptor.method;

        let key = match (&descriptor.key_uri, &descriptor.key_bytes) {
            (Some(key_uri), None) => {
                let raw = self.fetch_key(key_uri, timeout, cancel).await?;
                normalize_key(&raw, method)?
            }
            (_, Some(inline)) => normalize_key(inline, method)?,
            (None, None) => return Err(CoreError::configuration("key is empty")),
        };

        descriptor.key_bytes = Some(key);
        Ok(())
    }

    async fn fetch_key(
        &self,
        key_uri: &url::Url,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<bytes::Bytes> {
        debug!(%key_uri, ?timeout, "Fetching decryption key");

        // The resolver gets the scoped token so it stops with the key deadline too.
        let scope = DeadlineScope::new(cancel, timeout);
        let fetch = async {
            let effective = self
                .resolver
                .resolve(key_uri, self.resolve_timeout, scope.token())
                .await?;
            self.source.fetch_bytes(&effective, &self.headers).await
        };
        let result = match scope.run(fetch).await {
            Ok(result) => result,
            Err(Interrupted::Cancelled) => Err(CoreError::Cancelled),
            Err(Interrupted::TimedOut) => Err(CoreError::fetch(format!(
                "key fetch from {key_uri} failed: no response within {timeout:?}"
            ))),
        };

        match &result {
            Ok(data) => debug!(%key_uri, len = data.len(), "Decryption key fetched"),
            Err(CoreError::Cancelled) => debug!(%key_uri, "Key fetch cancelled by caller"),
            Err(e) => warn!(%key_uri, error = %e, "Key fetch failed"),
        }
        result
    }
}
