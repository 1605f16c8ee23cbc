// tests/integration/test_helpers.rs

//! Test helpers for end-to-end tests: a server bound to ephemeral loopback
//! ports with its store and logs in a temporary directory, and a line client.

#![allow(dead_code)]

use doorwarden::config::Config;
use doorwarden::core::protocol::Reply;
use doorwarden::core::state::ServerState;
use doorwarden::server::{Listener, Server};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

pub const ADMIN_NAME: &str = "adminReader";
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();
}

/// A running server with its own temporary store and log directory.
pub struct TestServer {
    server: Option<Server>,
    pub dir: TempDir,
    pub config: Config,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.client_port = 0;
        config.admin_port = 0;
        config.store_path = dir.path().join("config.json").to_string_lossy().into_owned();
        config.audit.log_dir = dir.path().join("logs").to_string_lossy().into_owned();
        customize(&mut config);

        let server = Server::start(config.clone(), Handle::current())
            .await
            .expect("server failed to start");
        Self {
            server: Some(server),
            dir,
            config,
        }
    }

    fn server(&self) -> &Server {
        self.server.as_ref().expect("server already stopped")
    }

    pub fn state(&self) -> &Arc<ServerState> {
        self.server().state()
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.server().client_addr()
    }

    pub fn admin_addr(&self) -> SocketAddr {
        self.server().admin_addr()
    }

    pub fn client_listener(&self) -> &Listener {
        self.server().client_listener()
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.config.store_path)
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.audit.log_dir)
    }

    /// A connection to the reader port.
    pub async fn reader(&self) -> TestClient {
        TestClient::connect(self.client_addr()).await
    }

    /// A connection to the admin port that has already read the greeting.
    pub async fn admin(&self) -> TestClient {
        let mut client = TestClient::connect(self.admin_addr()).await;
        assert_eq!(client.read_text().await, "Awaiting identification");
        client
    }

    /// A bound admin console.
    pub async fn identified_admin(&self) -> TestClient {
        self.wait_for_admin_release().await;
        let mut client = self.admin().await;
        assert_eq!(client.request(ADMIN_NAME).await, "Admin identified");
        client
    }

    /// Waits until no connection holds the admin binding.
    pub async fn wait_for_admin_release(&self) {
        let state = self.state().clone();
        wait_for(move || state.admin.bound_to().is_none()).await;
    }

    /// Resolves once an admin has issued `shutdown`.
    pub async fn shutdown_requested(&mut self) {
        let server = self.server.as_mut().expect("server already stopped");
        timeout(IO_TIMEOUT, server.shutdown_requested())
            .await
            .expect("shutdown was not requested");
    }

    pub async fn stop(mut self) {
        if let Some(server) = self.server.take() {
            server.stop().await;
        }
    }
}

pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    timeout(IO_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// A line-oriented client that understands the server's reply framing.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = timeout(IO_TIMEOUT, TcpStream::connect(addr))
            .await
            .expect("connect timed out")
            .expect("connect failed");
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Half-closes the connection, as a console does when it quits.
    pub async fn hang_up(&mut self) {
        self.writer.shutdown().await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Reads one reply header; `None` once the server has closed the socket.
    pub async fn read_reply(&mut self) -> Option<Reply> {
        let mut line = String::new();
        let read = timeout(IO_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a reply");
        match read {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let line = line.trim_end_matches('\n');
                Some(Reply::parse(line).unwrap_or_else(|| panic!("unframed reply {line:?}")))
            }
        }
    }

    pub async fn read_text(&mut self) -> String {
        match self.read_reply().await {
            Some(Reply::Text(text)) => text,
            other => panic!("expected a text reply, got {other:?}"),
        }
    }

    pub async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.read_text().await
    }

    pub async fn read_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        timeout(IO_TIMEOUT, self.reader.read_exact(&mut buf))
            .await
            .expect("timed out reading raw bytes")
            .unwrap();
        buf
    }

    pub async fn assert_closed(&mut self) {
        let reply = self.read_reply().await;
        assert!(reply.is_none(), "expected the server to close, got {reply:?}");
    }
}
