//! Playlist text to [`PlaylistInfo`], using m3u8-rs.

use m3u8_core::media::decode_bytes_text;
use m3u8_core::{EncryptionDescriptor, EncryptionMethod, MediaSegment, PlaylistInfo, parse_location};
use m3u8_rs::{Key, KeyMethod, Playlist, parse_playlist_res};
use serde_json::json;
use url::Url;

use crate::error::AppError;

/// Parse a media playlist. Relative segment and key addresses are resolved
/// against `base_url` when one is given.
pub fn parse_playlist(content: &str, base_url: Option<&Url>) -> Result<PlaylistInfo, AppError> {
    let playlist = match parse_playlist_res(content.as_bytes()) {
        Ok(Playlist::MediaPlaylist(pl)) => pl,
        Ok(Playlist::MasterPlaylist(_)) => {
            return Err(AppError::Playlist(
                "Expected Media Playlist, got Master".to_string(),
            ));
        }
        Err(e) => return Err(AppError::Playlist(format!("Failed to parse playlist: {e}"))),
    };

    let key = match playlist.segments.iter().find_map(|s| s.key.as_ref()) {
        Some(key) => key_descriptor(key, base_url, playlist.media_sequence)?,
        None => None,
    };

    let segments = playlist
        .segments
        .iter()
        .map(|segment| MediaSegment {
            uri: resolve(&segment.uri, base_url)
                .map(String::from)
                .unwrap_or_else(|| segment.uri.clone()),
            duration: segment.duration,
            title: segment.title.clone().filter(|t| !t.is_empty()),
        })
        .collect();

    let mut extra = serde_json::Map::new();
    extra.insert("mediaSequence".to_string(), json!(playlist.media_sequence));
    extra.insert("targetDuration".to_string(), json!(playlist.target_duration));
    extra.insert("endList".to_string(), json!(playlist.end_list));

    Ok(PlaylistInfo {
        uri: base_url.cloned(),
        key,
        segments,
        extra,
    })
}

fn resolve(reference: &str, base_url: Option<&Url>) -> Option<Url> {
    match base_url {
        Some(base) => base.join(reference).ok(),
        None => parse_location(reference).ok(),
    }
}

fn key_descriptor(
    key: &Key,
    base_url: Option<&Url>,
    media_sequence: u64,
) -> Result<Option<EncryptionDescriptor>, AppError> {
    let method = match &key.method {
        KeyMethod::None => return Ok(None),
        KeyMethod::AES128 => EncryptionMethod::Aes128,
        KeyMethod::Other(name) => name
            .parse::<EncryptionMethod>()
            .map_err(|e| AppError::Playlist(e.to_string()))?,
        KeyMethod::SampleAES => {
            return Err(AppError::Playlist(
                "SAMPLE-AES encryption is not supported".to_string(),
            ));
        }
    };

    let uri = key
        .uri
        .as_deref()
        .ok_or_else(|| AppError::Playlist("Key URI is missing".to_string()))?;
    let key_uri = resolve(uri, base_url).ok_or_else(|| {
        AppError::Playlist(format!("Key URI {uri} is relative and no base URL is known"))
    })?;

    let iv = match key.iv.as_deref() {
        Some(text) => decode_bytes_text(text)
            .ok_or_else(|| AppError::Playlist(format!("Invalid IV {text}")))?,
        None => EncryptionDescriptor::sequence_iv(media_sequence).to_vec(),
    };

    Ok(Some(EncryptionDescriptor::with_key_uri(method, key_uri, iv)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCRYPTED: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:7
#EXT-X-KEY:METHOD=AES-128,URI=\"keys/k1.bin\"
#EXTINF:6.0,
seg7.ts
#EXTINF:5.5,
https://cdn.example/other/seg8.ts
#EXT-X-ENDLIST
";

    #[test]
    fn parses_segments_and_key() {
        let base = Url::parse("http://host/path/").unwrap();
        let info = parse_playlist(ENCRYPTED, Some(&base)).unwrap();

        assert_eq!(info.uri.as_ref(), Some(&base));
        assert_eq!(info.segments.len(), 2);
        assert_eq!(info.segments[0].uri, "http://host/path/seg7.ts");
        assert_eq!(info.segments[1].uri, "https://cdn.example/other/seg8.ts");
        assert_eq!(info.extra["mediaSequence"], 7);

        let key = info.key.unwrap();
        assert_eq!(key.method, EncryptionMethod::Aes128);
        assert_eq!(key.key_uri.unwrap().as_str(), "http://host/path/keys/k1.bin");
        // No IV in the playlist: the media sequence number is used.
        assert_eq!(key.iv, EncryptionDescriptor::sequence_iv(7).to_vec());
    }

    #[test]
    fn explicit_iv_and_wider_method() {
        let content = "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXT-X-KEY:METHOD=AES-256,URI=\"https://keys.example/k\",IV=0x000102030405060708090a0b0c0d0e0f
#EXTINF:4.0,
a.ts
";
        let info = parse_playlist(content, None).unwrap();
        let key = info.key.unwrap();
        assert_eq!(key.method, EncryptionMethod::Aes256);
        assert_eq!(key.iv, (0u8..16).collect::<Vec<_>>());
        // No base: relative segment addresses are kept as written.
        assert_eq!(info.segments[0].uri, "a.ts");
    }

    #[test]
    fn relative_key_without_base_is_rejected() {
        let err = parse_playlist(ENCRYPTED, None).unwrap_err();
        assert!(err.to_string().contains("keys/k1.bin"));
    }

    #[test]
    fn unencrypted_playlist_has_no_key() {
        let content = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\na.ts\n#EXT-X-ENDLIST\n";
        let info = parse_playlist(content, None).unwrap();
        assert!(info.key.is_none());
        assert_eq!(info.extra["endList"], true);
    }

    #[test]
    fn master_playlist_is_rejected() {
        let content = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1280000\nlow/index.m3u8\n";
        assert!(parse_playlist(content, None).is_err());
    }
}
