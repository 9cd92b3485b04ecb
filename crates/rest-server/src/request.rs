//! Request bodies and their validation into callback arguments.

use std::collections::HashMap;

use m3u8_core::{EncryptionMethod, PlaylistInfo, parse_location};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::callbacks::{ContentDownload, DownloadOptions, ParseRequest, PlaylistDownload, UrlDownload};
use crate::error::RequestError;

/// JSON body shared by all operations. Every field is optional at this level;
/// each operation checks the ones it needs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControlRequest {
    pub url: Option<String>,
    pub name: Option<String>,
    pub method: Option<String>,
    pub key: Option<String>,
    pub iv: Option<String>,
    pub savepath: Option<String>,
    pub plugin: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub content: Option<Value>,
    pub baseurl: Option<String>,
}

impl ControlRequest {
    pub fn from_slice(body: &[u8]) -> Result<Self, RequestError> {
        serde_json::from_slice(body).map_err(|e| RequestError::MalformedBody(e.to_string()))
    }

    fn options(&mut self) -> DownloadOptions {
        DownloadOptions {
            name: self.name.take(),
            save_path: self.savepath.take(),
            plugin: self.plugin.take(),
            headers: self.headers.take(),
        }
    }

    pub fn into_url_download(mut self) -> Result<UrlDownload, RequestError> {
        let url = self
            .url
            .take()
            .filter(|url| !url.is_empty())
            .ok_or(RequestError::MissingField("url"))?;

        let method = match self.method.take() {
            Some(method) => method
                .parse::<EncryptionMethod>()
                .map_err(|e| RequestError::InvalidMethod(e.to_string()))?,
            None => EncryptionMethod::default(),
        };

        let url = parse_location(&url).map_err(|e| RequestError::InvalidUri {
            field: "url",
            reason: e.to_string(),
        })?;

        Ok(UrlDownload {
            url,
            method,
            key: self.key.take(),
            iv: self.iv.take(),
            options: self.options(),
        })
    }

    pub fn into_content_download(mut self) -> Result<ContentDownload, RequestError> {
        let content = content_text(self.content.take())?;
        let base_url = base_url(self.baseurl.take())?;
        Ok(ContentDownload {
            content,
            base_url,
            options: self.options(),
        })
    }

    pub fn into_playlist_download(mut self) -> Result<PlaylistDownload, RequestError> {
        let playlist = match self.content.take() {
            None | Some(Value::Null) => return Err(RequestError::MissingField("content")),
            // A playlist description sent as an embedded JSON string.
            Some(Value::String(text)) => serde_json::from_str::<PlaylistInfo>(&text),
            Some(value) => serde_json::from_value::<PlaylistInfo>(value),
        }
        .map_err(|e| RequestError::BadContent(e.to_string()))?;

        Ok(PlaylistDownload {
            playlist,
            options: self.options(),
        })
    }

    pub fn into_parse_request(mut self) -> Result<ParseRequest, RequestError> {
        Ok(ParseRequest {
            content: content_text(self.content.take())?,
            base_url: base_url(self.baseurl.take())?,
        })
    }
}

/// Playlist text. Null is rejected, an empty string is not.
fn content_text(content: Option<Value>) -> Result<String, RequestError> {
    match content {
        None | Some(Value::Null) => Err(RequestError::MissingField("content")),
        Some(Value::String(text)) => Ok(text),
        Some(other) => Err(RequestError::InvalidField {
            field: "content",
            reason: format!("expected playlist text, got {other}"),
        }),
    }
}

fn base_url(raw: Option<String>) -> Result<Option<Url>, RequestError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => normalize_base_url(&raw).map(Some),
        _ => Ok(None),
    }
}

/// Make sure a base address ends with a separator so relative segment paths
/// resolve beneath it, then parse it as an absolute location.
pub fn normalize_base_url(raw: &str) -> Result<Url, RequestError> {
    let raw = raw.trim();
    let mut base = raw.to_string();
    if !raw.ends_with('/') && !raw.ends_with('\\') {
        base.push('/');
    }
    parse_location(&base).map_err(|e| RequestError::InvalidUri {
        field: "baseurl",
        reason: e.to_string(),
    })
}
