//! End-to-end tests: the streaming client against a live server.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pipeload_client::{TransferAttributes, UploadError, Uploader, UploaderConfig};
use pipeload_server::{Destination, ServerConfig, ServerError, ServerState, UploadServer};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct TestServer {
    addr: SocketAddr,
    dest: PathBuf,
    state: watch::Receiver<ServerState>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), ServerError>>,
    dir: tempfile::TempDir,
}

impl TestServer {
    async fn start(tune: impl FnOnce(&mut ServerConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("uploaded-file");
        let mut config = ServerConfig {
            port: 0,
            destination: Destination::Fixed { path: dest.clone() },
            ..ServerConfig::default()
        };
        tune(&mut config);

        let server = Arc::new(UploadServer::new(config));
        let state = server.subscribe();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
        });

        Self {
            addr,
            dest,
            state,
            stop: Some(stop),
            task,
            dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    fn uploader(&self) -> Uploader {
        Uploader::new(UploaderConfig {
            endpoint: self.url("/upload/"),
            show_progress: false,
        })
        .unwrap()
    }

    fn write_source(&self, name: &str, data: &[u8]) -> PathBuf {
        let src_dir = self.dir.path().join("src");
        std::fs::create_dir_all(&src_dir).unwrap();
        let path = src_dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    fn begin_shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    async fn stop(mut self) -> Result<(), ServerError> {
        self.begin_shutdown();
        self.task.await.unwrap()
    }
}

fn pattern(len: usize) -> Vec<u8> {
    let mut x: u32 = 0x9e37_79b9;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect()
}

async fn wait_for_file(path: &Path) {
    for _ in 0..500 {
        if path.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never appeared", path.display());
}

#[tokio::test]
async fn round_trip_reproduces_bytes() {
    let server = TestServer::start(|_| {}).await;
    let uploader = server.uploader();

    for size in [0, 1, 31_999, 32_000, 100_003, (1 << 20) + 7] {
        let data = pattern(size);
        let source = server.write_source("payload.bin", &data);

        let report = uploader
            .upload_file(&source, &TransferAttributes::new(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.status, 200);
        assert_eq!(report.bytes_sent, size as u64);
        assert_eq!(report.response, "File 'payload.bin' uploaded successfully\n");
        let stored = std::fs::read(&server.dest).unwrap();
        assert!(stored == data, "size {size}: stored {} bytes", stored.len());
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn attributes_and_small_object() {
    let server = TestServer::start(|_| {}).await;
    let source = server.write_source("x.txt", b"hello");
    let attributes = TransferAttributes::from([
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "2".to_string()),
    ]);

    let report = server
        .uploader()
        .upload_file(&source, &attributes, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, 200);
    assert!(report.response.contains("x.txt"));
    assert_eq!(std::fs::read(&server.dest).unwrap(), b"hello");
    server.stop().await.unwrap();
}

#[tokio::test]
async fn unique_destination_keeps_every_upload() {
    let upload_dir = tempfile::tempdir().unwrap();
    let dir_path = upload_dir.path().to_path_buf();
    let server = TestServer::start(|cfg| {
        cfg.destination = Destination::Unique { dir: dir_path };
    })
    .await;
    let uploader = server.uploader();

    for content in [&b"first"[..], &b"second"[..]] {
        let source = server.write_source("f.txt", content);
        uploader
            .upload_file(&source, &TransferAttributes::new(), CancellationToken::new())
            .await
            .unwrap();
    }

    let mut stored: Vec<Vec<u8>> = std::fs::read_dir(upload_dir.path())
        .unwrap()
        .map(|entry| std::fs::read(entry.unwrap().path()).unwrap())
        .collect();
    stored.sort();
    assert_eq!(stored, vec![b"first".to_vec(), b"second".to_vec()]);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn wrong_content_type_is_415() {
    let server = TestServer::start(|_| {}).await;

    let response = reqwest::Client::new()
        .post(server.url("/upload/"))
        .header(reqwest::header::CONTENT_TYPE, "text/plain")
        .body("hello")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 415);
    assert!(!server.dest.exists());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn body_without_object_is_400() {
    let server = TestServer::start(|_| {}).await;
    let body = "--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--B--\r\n";

    let response = reqwest::Client::new()
        .post(server.url("/upload/"))
        .header(reqwest::header::CONTENT_TYPE, "multipart/form-data; boundary=B")
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(response.text().await.unwrap(), "No file uploaded\n");
    assert!(!server.dest.exists());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn rejected_upload_surfaces_status() {
    let server = TestServer::start(|cfg| {
        cfg.destination = Destination::Fixed {
            path: PathBuf::from("/nonexistent-dir/for/uploads/file"),
        };
    })
    .await;
    let source = server.write_source("x.txt", b"hello");

    let err = server
        .uploader()
        .upload_file(&source, &TransferAttributes::new(), CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        UploadError::ServerRejected { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "Error saving file\n");
        }
        other => panic!("unexpected error: {other}"),
    }
    server.stop().await.unwrap();
}

#[tokio::test]
async fn large_rejected_upload_surfaces_status() {
    let server = TestServer::start(|cfg| {
        cfg.destination = Destination::Fixed {
            path: PathBuf::from("/nonexistent-dir/for/uploads/file"),
        };
    })
    .await;
    let source = server.write_source("big.bin", &pattern(8 * 1024 * 1024));

    for _ in 0..3 {
        let err = server
            .uploader()
            .upload_file(&source, &TransferAttributes::new(), CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            UploadError::ServerRejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "Error saving file\n");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    server.stop().await.unwrap();
}

#[tokio::test]
async fn large_body_with_wrong_content_type_is_415() {
    let server = TestServer::start(|_| {}).await;

    let response = reqwest::Client::new()
        .post(server.url("/upload/"))
        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
        .body(pattern(4 * 1024 * 1024))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 415);
    assert_eq!(response.text().await.unwrap(), "Unsupported Media Type\n");
    server.stop().await.unwrap();
}

#[tokio::test]
async fn cancel_before_start_sends_nothing() {
    let server = TestServer::start(|_| {}).await;
    let source = server.write_source("x.txt", b"hello");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = server
        .uploader()
        .upload_file(&source, &TransferAttributes::new(), cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(!server.dest.exists());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn cancel_mid_transfer() {
    let server = TestServer::start(|cfg| {
        cfg.upload_delay = Duration::from_millis(100);
    })
    .await;
    let source = server.write_source("big.bin", &pattern(2 << 20));

    let cancel = CancellationToken::new();
    let upload = {
        let uploader = server.uploader();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            uploader
                .upload_file(&source, &TransferAttributes::new(), cancel)
                .await
        })
    };

    wait_for_file(&server.dest).await;
    cancel.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), upload)
        .await
        .expect("cancellation should unwind promptly")
        .unwrap()
        .unwrap_err();
    assert!(err.is_cancelled());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn shutdown_lets_in_flight_upload_finish() {
    let mut server = TestServer::start(|cfg| {
        cfg.upload_delay = Duration::from_millis(20);
        cfg.shutdown_timeout = Duration::from_secs(5);
    })
    .await;
    let data = pattern(300_000);
    let source = server.write_source("slow.bin", &data);

    let upload = {
        let uploader = server.uploader();
        tokio::spawn(async move {
            uploader
                .upload_file(&source, &TransferAttributes::new(), CancellationToken::new())
                .await
        })
    };

    wait_for_file(&server.dest).await;
    server.begin_shutdown();

    let report = upload.await.unwrap().unwrap();
    assert_eq!(report.status, 200);
    assert_eq!(std::fs::read(&server.dest).unwrap(), data);

    let mut state = server.state.clone();
    server.stop().await.unwrap();
    assert_eq!(*state.borrow_and_update(), ServerState::Stopped);
}

#[tokio::test]
async fn shutdown_deadline_closes_connections() {
    let mut server = TestServer::start(|cfg| {
        cfg.upload_delay = Duration::from_millis(200);
        cfg.shutdown_timeout = Duration::from_millis(300);
    })
    .await;
    let source = server.write_source("huge.bin", &pattern(2 << 20));

    let upload = {
        let uploader = server.uploader();
        tokio::spawn(async move {
            uploader
                .upload_file(&source, &TransferAttributes::new(), CancellationToken::new())
                .await
        })
    };

    wait_for_file(&server.dest).await;
    server.begin_shutdown();

    let state = server.state.clone();
    let result = server.stop().await;
    assert!(matches!(result, Err(ServerError::ShutdownTimeout(_))));
    assert_eq!(*state.borrow(), ServerState::Stopped);

    let outcome = tokio::time::timeout(Duration::from_secs(5), upload)
        .await
        .expect("client should notice the closed connection")
        .unwrap();
    assert!(outcome.is_err(), "a force-closed upload must not succeed");
}

#[tokio::test]
async fn health_and_raw_write_routes() {
    let server = TestServer::start(|_| {}).await;
    let http = reqwest::Client::new();

    let health = http.get(server.url("/")).send().await.unwrap();
    assert_eq!(health.status().as_u16(), 200);
    assert_eq!(health.text().await.unwrap(), "OK");

    let write = http
        .post(server.url("/"))
        .body("raw body")
        .send()
        .await
        .unwrap();
    assert_eq!(write.status().as_u16(), 200);
    assert_eq!(write.text().await.unwrap(), "DONE\n");
    assert_eq!(std::fs::read(&server.dest).unwrap(), b"raw body");

    let missing = http.get(server.url("/nope")).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);
    server.stop().await.unwrap();
}
