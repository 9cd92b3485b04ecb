use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use m3u8_core::{EncryptionMethod, MediaSegment, PlaylistInfo};
use rest_server::{
    ContentDownload, ControlCallbacks, ControlServer, ParseRequest, PlaylistDownload,
    ResponseEnvelope, UrlDownload,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Recorder {
    urls: Mutex<Vec<UrlDownload>>,
    contents: Mutex<Vec<ContentDownload>>,
    playlists: Mutex<Vec<PlaylistDownload>>,
    parses: Mutex<Vec<ParseRequest>>,
    calls: AtomicUsize,
}

impl Recorder {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn recording_callbacks(recorder: Arc<Recorder>) -> ControlCallbacks {
    let (r1, r2, r3, r4) = (
        Arc::clone(&recorder),
        Arc::clone(&recorder),
        Arc::clone(&recorder),
        recorder,
    );
    ControlCallbacks::new(
        move |call: UrlDownload| {
            r1.calls.fetch_add(1, Ordering::SeqCst);
            if call.options.name.as_deref() == Some("explode") {
                panic!("engine exploded");
            }
            if call.options.name.as_deref() == Some("refuse") {
                return Err("queue is closed".into());
            }
            r1.urls.lock().unwrap().push(call);
            Ok(())
        },
        move |call: ContentDownload| {
            r2.calls.fetch_add(1, Ordering::SeqCst);
            r2.contents.lock().unwrap().push(call);
            Ok(())
        },
        move |call: PlaylistDownload| {
            r3.calls.fetch_add(1, Ordering::SeqCst);
            r3.playlists.lock().unwrap().push(call);
            Ok(())
        },
        move |call: ParseRequest| {
            r4.calls.fetch_add(1, Ordering::SeqCst);
            let base = call.base_url.clone();
            r4.parses.lock().unwrap().push(call);
            Ok(PlaylistInfo {
                uri: base,
                segments: vec![MediaSegment {
                    uri: "seg0.ts".to_string(),
                    duration: 6.0,
                    title: None,
                }],
                ..Default::default()
            })
        },
    )
}

struct TestServer {
    base: String,
    cancel: CancellationToken,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<Result<(), rest_server::RequestError>>,
}

impl TestServer {
    async fn start(recorder: Arc<Recorder>) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("rest_server=debug")
            .with_test_writer()
            .try_init();

        let mut server = ControlServer::new();
        server.configure(recording_callbacks(recorder)).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(server.serve(listener, cancel.clone()));

        Self {
            base: format!("http://{addr}"),
            cancel,
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn post_raw(&self, operation: &str, body: String) -> ResponseEnvelope {
        let response = self
            .client
            .post(format!("{}/{operation}", self.base))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        response.json().await.unwrap()
    }

    async fn post(&self, operation: &str, body: Value) -> ResponseEnvelope {
        self.post_raw(operation, body.to_string()).await
    }

    async fn stop(self) {
        self.cancel.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn empty_url_is_rejected_without_callback() {
    let recorder = Arc::new(Recorder::default());
    let server = TestServer::start(Arc::clone(&recorder)).await;

    let envelope = server.post("downloadbyurl", json!({"url": ""})).await;
    assert_ne!(envelope.code, 0);
    assert!(envelope.message.starts_with("request failed, "));
    assert!(envelope.message.contains("url"));
    assert_eq!(recorder.calls(), 0);

    server.stop().await;
}

#[tokio::test]
async fn lowercase_method_is_normalized() {
    let recorder = Arc::new(Recorder::default());
    let server = TestServer::start(Arc::clone(&recorder)).await;

    let envelope = server
        .post(
            "downloadbyurl",
            json!({"url": "http://x/y.m3u8", "method": "aes-256", "headers": {"Cookie": "a=b"}}),
        )
        .await;
    assert_eq!(envelope, ResponseEnvelope::success());

    let urls = recorder.urls.lock().unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].method, EncryptionMethod::Aes256);
    assert_eq!(urls[0].method.to_string(), "AES-256");
    assert_eq!(urls[0].url.as_str(), "http://x/y.m3u8");
    drop(urls);

    server.stop().await;
}

#[tokio::test]
async fn unsupported_method_lists_allowed_methods() {
    let recorder = Arc::new(Recorder::default());
    let server = TestServer::start(Arc::clone(&recorder)).await;

    let envelope = server
        .post("downloadbyurl", json!({"url": "http://x", "method": "DES"}))
        .await;
    assert_ne!(envelope.code, 0);
    for allowed in ["AES-128", "AES-192", "AES-256"] {
        assert!(envelope.message.contains(allowed), "{}", envelope.message);
    }
    assert_eq!(recorder.calls(), 0);

    server.stop().await;
}

#[tokio::test]
async fn getm3u8data_normalizes_base_and_returns_playlist() {
    let recorder = Arc::new(Recorder::default());
    let server = TestServer::start(Arc::clone(&recorder)).await;

    let envelope = server
        .post(
            "getm3u8data",
            json!({"content": "#EXTM3U\n#EXTINF:6,\nseg0.ts\n", "baseurl": "http://host/path"}),
        )
        .await;
    assert_eq!(envelope.code, 0);
    assert_eq!(envelope.message, "parsed");

    let data = envelope.data.unwrap();
    assert_eq!(data["uri"], "http://host/path/");
    assert_eq!(data["segments"][0]["uri"], "seg0.ts");

    let parses = recorder.parses.lock().unwrap();
    assert_eq!(
        parses[0].base_url.as_ref().map(|u| u.as_str()),
        Some("http://host/path/")
    );
    drop(parses);

    server.stop().await;
}

#[tokio::test]
async fn content_operations_validate_content() {
    let recorder = Arc::new(Recorder::default());
    let server = TestServer::start(Arc::clone(&recorder)).await;

    let envelope = server.post("downloadbycontent", json!({"content": null})).await;
    assert_ne!(envelope.code, 0);

    let envelope = server
        .post("downloadbycontent", json!({"content": "", "savepath": "/tmp/x"}))
        .await;
    assert_eq!(envelope.code, 0);

    let envelope = server.post("downloadbyjsoncontent", json!({})).await;
    assert_ne!(envelope.code, 0);

    let envelope = server
        .post(
            "downloadbyjsoncontent",
            json!({
                "content": {
                    "key": {"method": "AES-128", "keyUri": "http://keys/k.bin", "iv": "00000000000000000000000000000001"},
                    "segments": [{"uri": "seg0.ts", "duration": 4.0}]
                },
                "name": "show"
            }),
        )
        .await;
    assert_eq!(envelope.code, 0, "{}", envelope.message);

    let contents = recorder.contents.lock().unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].options.save_path.as_deref(), Some("/tmp/x"));
    drop(contents);

    let playlists = recorder.playlists.lock().unwrap();
    let key = playlists[0].playlist.key.as_ref().unwrap();
    assert_eq!(key.iv[15], 1);
    assert_eq!(playlists[0].options.name.as_deref(), Some("show"));
    drop(playlists);

    server.stop().await;
}

#[tokio::test]
async fn malformed_json_yields_error_envelope() {
    let server = TestServer::start(Arc::new(Recorder::default())).await;

    let envelope = server.post_raw("downloadbyurl", "{\"url\":".to_string()).await;
    assert_eq!(envelope.code, -1);
    assert!(envelope.message.starts_with("request failed, "));

    server.stop().await;
}

#[tokio::test]
async fn callback_failures_are_isolated_per_request() {
    let recorder = Arc::new(Recorder::default());
    let server = TestServer::start(Arc::clone(&recorder)).await;

    let envelope = server
        .post("downloadbyurl", json!({"url": "http://x/a.m3u8", "name": "explode"}))
        .await;
    assert_ne!(envelope.code, 0);
    assert!(envelope.message.contains("engine exploded"));

    let envelope = server
        .post("downloadbyurl", json!({"url": "http://x/b.m3u8", "name": "refuse"}))
        .await;
    assert_ne!(envelope.code, 0);
    assert!(envelope.message.contains("queue is closed"));

    // The server keeps serving after both failures.
    let envelope = server
        .post("downloadbyurl", json!({"url": "http://x/c.m3u8"}))
        .await;
    assert_eq!(envelope.code, 0);
    assert_eq!(recorder.calls(), 3);

    server.stop().await;
}

#[tokio::test]
async fn unknown_operation_is_not_routed() {
    let server = TestServer::start(Arc::new(Recorder::default())).await;

    let response = server
        .client
        .post(format!("{}/deleteeverything", server.base))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn large_playlist_body_is_accepted() {
    let recorder = Arc::new(Recorder::default());
    let server = TestServer::start(Arc::clone(&recorder)).await;

    let mut content = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:6\n");
    while content.len() < 3 * 1024 * 1024 {
        content.push_str("#EXTINF:6.0,\nhttp://cdn.example/vod/segment-000000.ts\n");
    }

    let envelope = server
        .post("getm3u8data", json!({"content": &content, "baseurl": "http://host/vod"}))
        .await;
    assert_eq!(envelope.code, 0, "{}", envelope.message);
    assert_eq!(envelope.message, "parsed");

    let parses = recorder.parses.lock().unwrap();
    assert_eq!(parses.len(), 1);
    assert_eq!(parses[0].content.len(), content.len());
    drop(parses);

    server.stop().await;
}
