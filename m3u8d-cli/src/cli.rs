use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Control-plane daemon for downloading encrypted HLS streams",
    long_about = "Listens for JSON-RPC requests over HTTP and queues HLS downloads.\n\
                  \n\
                  Operations: downloadbyurl, downloadbycontent, downloadbyjsoncontent and\n\
                  getm3u8data, each a POST to /<operation> with a JSON body. Encrypted\n\
                  playlists (AES-128, AES-192, AES-256) have their keys resolved before\n\
                  any segment is decrypted."
)]
pub struct CliArgs {
    /// Port of the control server
    #[arg(short, long, default_value = "65432", help = "Port the control server listens on")]
    pub port: u16,

    /// Bind address of the control server
    #[arg(long, default_value = "127.0.0.1", help = "Address the control server binds to")]
    pub bind: IpAddr,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Log file path
    #[arg(long, default_value = "m3u8d.log", help = "File the log is written to, besides stdout")]
    pub log_file: PathBuf,

    /// Key fetch deadline in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Deadline in seconds for fetching a decryption key (0 disables it)"
    )]
    pub key_timeout: u64,

    /// URI resolution deadline in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Deadline in seconds for resolving playlist and key addresses (0 disables it)"
    )]
    pub resolve_timeout: u64,

    /// Overall timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Overall timeout in seconds for HTTP requests (0 disables it)"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(
        long,
        help = "Proxy server URL for downloads (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5, all)
    #[arg(
        long,
        default_value = "http",
        help = "Proxy type (http, https, socks5, all)",
        value_parser = ["http", "https", "socks5", "all"]
    )]
    pub proxy_type: String,

    /// Proxy username
    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings for downloads
    #[arg(
        long,
        help = "Disable all proxy settings (including system proxy) for downloads"
    )]
    pub no_proxy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["m3u8d"]);
        assert_eq!(args.port, 65432);
        assert_eq!(args.bind.to_string(), "127.0.0.1");
        assert_eq!(args.key_timeout, 10);
        assert!(args.headers.is_empty());
        assert!(!args.no_proxy);
    }

    #[test]
    fn repeated_headers_and_proxy() {
        let args = CliArgs::parse_from([
            "m3u8d",
            "-H",
            "Referer: https://a",
            "--header",
            "Cookie: x=y",
            "--proxy",
            "socks5://127.0.0.1:1080",
            "--proxy-type",
            "socks5",
        ]);
        assert_eq!(args.headers.len(), 2);
        assert_eq!(args.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(args.proxy_type, "socks5");
    }

    #[test]
    fn rejects_unknown_proxy_type() {
        assert!(CliArgs::try_parse_from(["m3u8d", "--proxy-type", "ftp"]).is_err());
    }
}
