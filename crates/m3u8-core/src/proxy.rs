use std::str::FromStr;

use reqwest::Proxy;

use crate::error::CoreError;

/// Which requests an explicit proxy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ProxyType {
    Http,
    Https,
    Socks5,
    /// Every scheme goes through the proxy
    All,
}

impl FromStr for ProxyType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "socks5" => Ok(Self::Socks5),
            "all" => Ok(Self::All),
            other => Err(CoreError::configuration(format!(
                "Invalid proxy type: '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

/// Build a reqwest Proxy from the proxy configuration
pub fn build_proxy_from_config(config: &ProxyConfig) -> Result<Proxy, CoreError> {
    let proxy_url = &config.url;
    let invalid = |kind: &str, e: reqwest::Error| {
        CoreError::configuration(format!("Invalid {kind} proxy URL {proxy_url}: {e}"))
    };

    let mut proxy = match config.proxy_type {
        ProxyType::Http => Proxy::http(proxy_url).map_err(|e| invalid("HTTP", e))?,
        ProxyType::Https => Proxy::https(proxy_url).map_err(|e| invalid("HTTPS", e))?,
        ProxyType::Socks5 => {
            let url = if proxy_url.starts_with("socks5://") {
                proxy_url.to_string()
            } else {
                format!("socks5://{proxy_url}")
            };
            Proxy::all(&url).map_err(|e| invalid("SOCKS5", e))?
        }
        ProxyType::All => Proxy::all(proxy_url).map_err(|e| invalid("generic", e))?,
    };

    if let Some(auth) = &config.auth {
        proxy = proxy.basic_auth(&auth.username, &auth.password);
    }

    Ok(proxy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_type_parses_case_insensitively() {
        assert_eq!("SOCKS5".parse::<ProxyType>().unwrap(), ProxyType::Socks5);
        assert_eq!("all".parse::<ProxyType>().unwrap(), ProxyType::All);
        assert!(matches!(
            "ftp".parse::<ProxyType>(),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn socks5_proxy_without_scheme_is_accepted() {
        let config = ProxyConfig {
            url: "127.0.0.1:1080".to_string(),
            proxy_type: ProxyType::Socks5,
            auth: None,
        };
        assert!(build_proxy_from_config(&config).is_ok());
    }
}
