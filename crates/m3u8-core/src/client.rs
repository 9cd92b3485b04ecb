use reqwest::Client;
use tracing::{debug, info};

use crate::DownloaderConfig;
use crate::error::CoreError;
use crate::proxy::build_proxy_from_config;

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig) -> Result<Client, CoreError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if let Some(proxy_config) = &config.proxy {
        let proxy = build_proxy_from_config(proxy_config)?;
        client_builder = client_builder.proxy(proxy);
        info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy");
    } else if config.use_system_proxy {
        // reqwest picks up system proxy settings unless no_proxy() is called
        debug!("Using system proxy settings");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled");
    }

    client_builder
        .build()
        .map_err(|e| CoreError::configuration(format!("Failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ProxyConfig, ProxyType};

    #[test]
    fn builds_client_from_defaults() {
        assert!(create_client(&DownloaderConfig::default()).is_ok());
    }

    #[test]
    fn rejects_invalid_proxy() {
        let config = DownloaderConfig::builder()
            .with_proxy(ProxyConfig {
                url: "http://[::1".to_string(),
                proxy_type: ProxyType::Http,
                auth: None,
            })
            .build();

        assert!(matches!(
            create_client(&config),
            Err(CoreError::Configuration(_))
        ));
    }
}
