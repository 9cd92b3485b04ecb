//! # Builder for DownloaderConfig
//!
//! Fluent construction of [`DownloaderConfig`] values.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use m3u8_core::DownloaderConfig;
//!
//! let config = DownloaderConfig::builder()
//!     .with_key_timeout(Duration::from_secs(5))
//!     .with_user_agent("m3u8d/0.1")
//!     .with_header("Referer", "https://example.com/")
//!     .build();
//!
//! assert_eq!(config.key_timeout, Duration::from_secs(5));
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::{DownloaderConfig, proxy::ProxyConfig};

/// Starts from [`DownloaderConfig::default`]; every setter overrides one field.
#[derive(Debug, Clone)]
pub struct DownloaderConfigBuilder {
    config: DownloaderConfig,
}

impl DownloaderConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: DownloaderConfig::default(),
        }
    }

    /// Zero disables the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Deadline of each key fetch. Zero waits for the caller's cancellation only.
    pub fn with_key_timeout(mut self, timeout: Duration) -> Self {
        self.config.key_timeout = timeout;
        self
    }

    /// Deadline of each source URI resolution.
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.config.resolve_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Invalid header names or values are dropped.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<reqwest::header::HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.headers.insert(name, value);
        }
        self
    }

    /// Given headers replace defaults of the same name.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers.extend(headers);
        self
    }

    /// Route requests through `proxy`. Turns off the system proxy.
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self.config.use_system_proxy = false;
        self
    }

    /// Ignored once an explicit proxy is set.
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        if self.config.proxy.is_none() {
            self.config.use_system_proxy = use_system_proxy;
        }
        self
    }

    pub fn build(self) -> DownloaderConfig {
        self.config
    }
}

impl Default for DownloaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
