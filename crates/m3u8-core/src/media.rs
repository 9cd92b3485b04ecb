//! Playlist-level data shared between the control plane and the download engine.
//!
//! Only the encryption descriptor is interpreted here. Segment entries and any
//! additional playlist fields are carried through untouched so a caller can
//! round-trip a playlist description as JSON.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;

/// AES block size, which is also the IV length for every supported method.
pub const IV_LEN: usize = 16;

/// Segment cipher; CBC mode with PKCS#7 padding in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum EncryptionMethod {
    #[default]
    Aes128,
    Aes192,
    Aes256,
}

impl EncryptionMethod {
    pub const ALL: [EncryptionMethod; 3] = [Self::Aes128, Self::Aes192, Self::Aes256];

    /// Required key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes128 => "AES-128",
            Self::Aes192 => "AES-192",
            Self::Aes256 => "AES-256",
        }
    }
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionMethod {
    type Err = CoreError;

    /// Case-insensitive: `aes-256` and `AES-256` are the same method.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == upper)
            .ok_or_else(|| {
                CoreError::configuration(format!(
                    "unsupported key method '{s}', must be one of AES-128, AES-192, AES-256"
                ))
            })
    }
}

impl TryFrom<String> for EncryptionMethod {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EncryptionMethod> for &'static str {
    fn from(method: EncryptionMethod) -> Self {
        method.as_str()
    }
}

/// Method, key material (inline or by location) and IV needed to decrypt a segment stream.
///
/// `key_bytes` is filled in by [`KeyStore`](crate::KeyStore) during pipeline
/// initialization and left alone afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionDescriptor {
    #[serde(default)]
    pub method: EncryptionMethod,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "location::deserialize_opt"
    )]
    pub key_uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "text_bytes::opt")]
    pub key_bytes: Option<Vec<u8>>,
    #[serde(default, with = "text_bytes")]
    pub iv: Vec<u8>,
}

impl EncryptionDescriptor {
    /// Descriptor whose key is fetched from `key_uri`.
    pub fn with_key_uri(method: EncryptionMethod, key_uri: Url, iv: impl Into<Vec<u8>>) -> Self {
        Self {
            method,
            key_uri: Some(key_uri),
            key_bytes: None,
            iv: iv.into(),
        }
    }

    /// Descriptor carrying its key inline.
    pub fn with_key_bytes(
        method: EncryptionMethod,
        key_bytes: impl Into<Vec<u8>>,
        iv: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            method,
            key_uri: None,
            key_bytes: Some(key_bytes.into()),
            iv: iv.into(),
        }
    }

    /// Default HLS IV for playlists without an explicit one: the media sequence
    /// number as a big-endian integer in the low eight bytes.
    pub fn sequence_iv(media_sequence: u64) -> [u8; IV_LEN] {
        let mut iv = [0u8; IV_LEN];
        iv[8..].copy_from_slice(&media_sequence.to_be_bytes());
        iv
    }

    pub(crate) fn iv_block(&self) -> Result<[u8; IV_LEN], CoreError> {
        self.iv.as_slice().try_into().map_err(|_| {
            CoreError::configuration(format!(
                "IV must be {IV_LEN} bytes, got {}",
                self.iv.len()
            ))
        })
    }
}

/// One media segment reference. Opaque to the decryption core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSegment {
    pub uri: String,
    #[serde(default)]
    pub duration: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Parsed playlist handed from the parser to the download engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "location::deserialize_opt"
    )]
    pub uri: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<EncryptionDescriptor>,
    #[serde(default)]
    pub segments: Vec<MediaSegment>,
    /// Fields this crate does not model, preserved as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Parse an absolute source location: an `http(s)`/`file` URL or an absolute filesystem path.
pub fn parse_location(input: &str) -> Result<Url, CoreError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CoreError::InvalidUrl("location is empty".to_string()));
    }

    // A single-letter scheme is a Windows drive prefix, not a URL.
    if let Ok(url) = Url::parse(input) {
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }

    if Path::new(input).is_absolute() {
        return Url::from_file_path(input)
            .map_err(|_| CoreError::InvalidUrl(format!("invalid file path {input}")));
    }

    Err(CoreError::InvalidUrl(format!(
        "{input} is neither an absolute URL nor an absolute file path"
    )))
}

/// Decode key or IV material written as text: hex (optionally `0x`-prefixed) or base64.
pub fn decode_bytes_text(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    if let Some(hex_digits) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        return hex::decode(hex_digits).ok();
    }
    if !text.is_empty() && text.len() % 2 == 0 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return hex::decode(text).ok();
    }
    BASE64.decode(text).ok()
}

mod location {
    use serde::{Deserialize, Deserializer};
    use url::Url;

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<Url>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => super::parse_location(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Byte fields travel as base64 strings; hex is accepted on input.
mod text_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::BASE64;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if !s.trim().is_empty() => super::decode_bytes_text(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid hex/base64 bytes: {s}"))),
            _ => Ok(Vec::new()),
        }
    }

    pub mod opt {
        use serde::{Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => super::serialize(b, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let bytes = super::deserialize(deserializer)?;
            Ok((!bytes.is_empty()).then_some(bytes))
        }
    }
}
