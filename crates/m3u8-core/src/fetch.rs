// Byte sources: where key material is read from.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::{CoreError, Result};

/// Reads the full content behind a location.
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn fetch_bytes(&self, url: &Url, headers: &HeaderMap) -> Result<Bytes>;
}

/// Reads `file://` locations from disk and everything else over HTTP.
#[derive(Clone)]
pub struct HttpByteSource {
    http_client: Client,
}

impl HttpByteSource {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    async fn read_local(url: &Url) -> Result<Bytes> {
        let path = url
            .to_file_path()
            .map_err(|_| CoreError::InvalidUrl(format!("{url} is not a local file path")))?;
        let data = tokio::fs::read(&path).await?;
        debug!(path = %path.display(), len = data.len(), "Read key from local file");
        Ok(Bytes::from(data))
    }

    async fn read_remote(&self, url: &Url, headers: &HeaderMap) -> Result<Bytes> {
        let response = self
            .http_client
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CoreError::NotFound {
                url: url.to_string(),
                status,
            });
        }
        if !status.is_success() {
            return Err(CoreError::Fetch {
                message: format!("HTTP {status} fetching {url}"),
                status: Some(status),
            });
        }

        let data = response.bytes().await?;
        debug!(%url, len = data.len(), "Fetched remote bytes");
        Ok(data)
    }
}

#[async_trait]
impl ByteSource for HttpByteSource {
    async fn fetch_bytes(&self, url: &Url, headers: &HeaderMap) -> Result<Bytes> {
        if url.scheme() == "file" {
            Self::read_local(url).await
        } else {
            self.read_remote(url, headers).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_local_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789abcdef").unwrap();
        let url = Url::from_file_path(file.path()).unwrap();

        let source = HttpByteSource::new(Client::new());
        let data = source.fetch_bytes(&url, &HeaderMap::new()).await.unwrap();
        assert_eq!(&data[..], b"0123456789abcdef");
    }

    #[tokio::test]
    async fn missing_local_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("absent.key")).unwrap();

        let source = HttpByteSource::new(Client::new());
        let err = source.fetch_bytes(&url, &HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
