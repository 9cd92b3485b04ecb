//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use aes::{Aes128, Aes192, Aes256};
use axum::Router;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use m3u8_core::EncryptionMethod;
use tokio::net::TcpListener;
use url::Url;

pub const KEY: [u8; 16] = *b"0123456789abcdef";
pub const IV: [u8; 16] = [0x24; 16];

/// Key endpoints on a random localhost port, shut down on drop.
pub struct KeyServer {
    base_url: Url,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl KeyServer {
    pub async fn start() -> Self {
        let router = Router::new()
            .route("/key.bin", get(|| async { KEY.to_vec() }))
            .route("/hex.key", get(|| async { hex::encode(KEY) }))
            .route("/short.key", get(|| async { b"tiny".to_vec() }))
            .route("/moved.key", get(|| async { Redirect::temporary("/key.bin") }))
            .route(
                "/slow.key",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    KEY.to_vec()
                }),
            )
            .route(
                "/protected.key",
                get(|request: Request| async move {
                    match request.headers().get("x-token") {
                        Some(token) if token == "secret" => KEY.to_vec().into_response(),
                        _ => StatusCode::FORBIDDEN.into_response(),
                    }
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });
        tokio::spawn(async move {
            let _ = server.await;
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> Url {
        self.base_url.join(path).unwrap()
    }
}

impl Drop for KeyServer {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

pub fn encrypt(method: EncryptionMethod, key: &[u8], iv: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let mut buf = plaintext.to_vec();
    buf.resize(plaintext.len() + 16 - plaintext.len() % 16, 0);
    let len = match method {
        EncryptionMethod::Aes128 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
            .unwrap()
            .len(),
        EncryptionMethod::Aes192 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
            .unwrap()
            .len(),
        EncryptionMethod::Aes256 => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .unwrap()
            .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
            .unwrap()
            .len(),
    };
    buf.truncate(len);
    buf
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("m3u8_core=debug")
        .with_test_writer()
        .try_init();
}
