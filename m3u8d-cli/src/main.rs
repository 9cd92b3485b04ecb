use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use m3u8_core::{
    DownloaderConfig, HttpByteSource, ProxyAuth, ProxyConfig, ProxyType, RedirectResolver,
    create_client,
};
use rest_server::ControlServer;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod cli;
mod error;
mod jobs;
mod playlist;
mod utils;

use cli::CliArgs;
use error::AppError;
use jobs::JobContext;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&args.log_file)?;

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("m3u8d {} - encrypted HLS download daemon", env!("CARGO_PKG_VERSION"));
    info!(
        "Timeouts: request={}s, connect={}s, key={}s, resolve={}s",
        args.timeout, args.connect_timeout, args.key_timeout, args.resolve_timeout
    );

    let download_config = downloader_config(&args)?;
    let client = create_client(&download_config)?;

    let ctx = JobContext {
        source: Arc::new(HttpByteSource::new(client.clone())),
        resolver: Arc::new(RedirectResolver::new(client)),
        fetch_timeout: download_config.timeout,
        key_timeout: download_config.key_timeout,
        resolve_timeout: download_config.resolve_timeout,
    };

    let cancel = CancellationToken::new();
    let (queue, worker) = jobs::spawn_worker(ctx, cancel.clone());

    let mut server = ControlServer::new();
    server.configure(jobs::control_callbacks(queue))?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
        shutdown.cancel();
    });

    let addr = SocketAddr::new(args.bind, args.port);
    let result = server.run(addr, cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = worker.await {
        warn!(error = %e, "Job worker ended abnormally");
    }

    result?;
    Ok(())
}

fn downloader_config(args: &CliArgs) -> Result<DownloaderConfig, AppError> {
    let proxy_config = if args.no_proxy {
        info!("All proxy settings disabled (--no-proxy flag)");
        None
    } else if let Some(proxy_url) = args.proxy.as_ref() {
        let proxy_type = args
            .proxy_type
            .parse::<ProxyType>()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;

        // Authentication needs both a username and a password
        let auth = match (&args.proxy_user, &args.proxy_pass) {
            (Some(username), Some(password)) => Some(ProxyAuth {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        info!(
            proxy_url = %proxy_url,
            proxy_type = ?proxy_type,
            has_auth = auth.is_some(),
            "Using explicit proxy configuration"
        );

        Some(ProxyConfig {
            url: proxy_url.clone(),
            proxy_type,
            auth,
        })
    } else {
        info!("Using system proxy settings");
        None
    };

    let mut builder = DownloaderConfig::builder()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_key_timeout(Duration::from_secs(args.key_timeout))
        .with_resolve_timeout(Duration::from_secs(args.resolve_timeout))
        .with_headers(utils::parse_headers(&args.headers));

    builder = match proxy_config {
        Some(proxy) => builder.with_proxy(proxy),
        None => builder.with_system_proxy(!args.no_proxy),
    };
    Ok(builder.build())
}
