//! Shared test infrastructure for integration tests
//!
//! TestServer spawns the real geckos3 binary against a temp data dir and
//! tears it down on drop. Tests drive it over plain HTTP with reqwest.

#![allow(dead_code)]

use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// Port counter to avoid conflicts between tests.
static PORT_COUNTER: AtomicU16 = AtomicU16::new(19000);

/// Test server wrapper that spawns a real geckos3 binary
pub struct TestServer {
    process: Child,
    port: u16,
    data_dir: TempDir,
}

impl TestServer {
    /// Start a server with auth disabled and sidecars on (the defaults).
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Start a server with extra environment applied to the child process.
    pub async fn spawn_with(configure: impl FnOnce(&mut Command)) -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
        let data_dir = TempDir::new().expect("Failed to create temp dir");

        let mut command = Command::new(env!("CARGO_BIN_EXE_geckos3"));
        command
            .env("GECKOS3_LISTEN", format!("127.0.0.1:{port}"))
            .env("GECKOS3_DATA_DIR", data_dir.path())
            .env("RUST_LOG", "geckos3=warn");
        configure(&mut command);

        let process = command.spawn().expect("Failed to start server");

        let mut server = Self {
            process,
            port,
            data_dir,
        };
        server.wait_ready().await;
        server
    }

    async fn wait_ready(&mut self) {
        let addr = format!("127.0.0.1:{}", self.port);
        for _ in 0..150 {
            if std::net::TcpStream::connect(&addr).is_ok() {
                sleep(Duration::from_millis(50)).await;
                return;
            }

            if let Ok(Some(status)) = self.process.try_wait() {
                panic!("Server exited before becoming ready: {}", status);
            }

            sleep(Duration::from_millis(100)).await;
        }

        let _ = self.process.kill();
        panic!("Timed out waiting for server on {}", addr);
    }

    /// Get the HTTP endpoint URL
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Absolute URL for a server path (must start with '/')
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint(), path)
    }

    /// The host value clients should sign against.
    pub fn host(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// The server's data directory, for on-disk layout assertions.
    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.process.kill();
    }
}

/// Extract the text of the first `<tag>...</tag>` occurrence.
pub fn xml_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].to_string())
}
