use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
        warn!("Invalid header name: '{}'", name);
        return;
    };

    let Ok(header_value) = HeaderValue::from_str(value) else {
        warn!("Invalid header value for '{}'", name);
        return;
    };

    debug!("Adding header: {}", name);
    headers.insert(header_name, header_value);
}

/// Parse `Name: Value` strings from the command line into a HeaderMap.
pub fn parse_headers(header_strings: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for header_str in header_strings {
        // The first colon separates name and value
        let Some((name, value)) = header_str.split_once(':') else {
            warn!(
                "Invalid header format: '{}'. Expected 'Name: Value'",
                header_str
            );
            continue;
        };
        insert_header(&mut headers, name.trim(), value.trim());
    }

    headers
}

/// Headers attached to a control request. Invalid entries are skipped.
pub fn header_map(pairs: Option<&HashMap<String, String>>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs.into_iter().flatten() {
        insert_header(&mut headers, name.trim(), value.trim());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_value_pairs() {
        let headers = parse_headers(&[
            "Referer: https://example.com/watch?v=1".to_string(),
            "X-Token:abc".to_string(),
            "no separator".to_string(),
        ]);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["referer"], "https://example.com/watch?v=1");
        assert_eq!(headers["x-token"], "abc");
    }

    #[test]
    fn request_headers_skip_invalid_names() {
        let pairs = HashMap::from([
            ("Cookie".to_string(), "a=b".to_string()),
            ("bad name".to_string(), "x".to_string()),
        ]);
        let headers = header_map(Some(&pairs));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["cookie"], "a=b");
        assert!(header_map(None).is_empty());
    }
}
