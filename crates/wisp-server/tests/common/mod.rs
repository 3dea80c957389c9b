//! Shared harness for relay integration tests.
//!
//! Starts a real server on an ephemeral port and drives it with
//! tokio-tungstenite clients.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use wisp_server::{server, ServerConfig};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Checksummed EIP-55 test addresses.
pub const ALICE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const BOB: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
pub const CAROL: &str = "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB";

/// Initialize tracing for tests.
pub fn init_test() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// A relay server bound to 127.0.0.1 on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(ServerConfig::default()).await
    }

    pub async fn start_with(config: ServerConfig) -> Self {
        init_test();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Bind test listener");
        let addr = listener.local_addr().expect("Listener address");

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let handle =
            tokio::spawn(async move { server::serve(listener, &config, token).await });

        Self {
            addr,
            shutdown,
            handle,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// GET a JSON endpoint over a plain HTTP/1.1 connection.
    pub async fn get_json(&self, path: &str) -> Value {
        let mut stream = TcpStream::connect(self.addr).await.expect("Connect HTTP");
        let request =
            format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream
            .write_all(request.as_bytes())
            .await
            .expect("Write request");

        let mut raw = String::new();
        tokio::time::timeout(DEFAULT_TIMEOUT, stream.read_to_string(&mut raw))
            .await
            .expect("HTTP response timed out")
            .expect("Read response");

        assert!(raw.starts_with("HTTP/1.1 200"), "unexpected response: {raw}");
        let (_, body) = raw.split_once("\r\n\r\n").expect("Response body");
        // Tolerates chunked framing around the JSON object
        let start = body.find('{').expect("JSON start");
        let end = body.rfind('}').expect("JSON end");
        serde_json::from_str(&body[start..=end]).expect("Parse JSON body")
    }

    pub async fn connected_clients(&self) -> u64 {
        self.get_json("/health").await["connectedClients"]
            .as_u64()
            .expect("connectedClients")
    }

    /// Poll the health endpoint until it reports `expected` clients.
    pub async fn wait_for_clients(&self, expected: u64) {
        let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
        loop {
            let current = self.connected_clients().await;
            if current == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {expected} clients, still {current}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel the server and wait for it to finish.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        tokio::time::timeout(DEFAULT_TIMEOUT, self.handle)
            .await
            .expect("Server did not stop in time")
            .expect("Server task panicked")
    }
}

/// A raw relay client.
pub struct RelayClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayClient {
    pub async fn connect(server: &TestServer) -> Self {
        Self::connect_url(&server.ws_url()).await
    }

    pub async fn connect_url(url: &str) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("WebSocket handshake");
        Self { ws }
    }

    pub async fn send(&mut self, message: Message) {
        self.ws.send(message).await.expect("Send frame");
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.send(Message::text(text)).await;
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send_raw(&value.to_string()).await;
    }

    /// Register `address` and return the acknowledgement.
    pub async fn register(&mut self, address: &str) -> Value {
        self.send_json(json!({"type": "register", "walletAddress": address}))
            .await;
        self.recv_json()
            .await
            .expect("Registration acknowledgement")
    }

    /// Next frame of any kind, `None` if the stream ended or timed out.
    pub async fn recv_frame(&mut self, timeout: Duration) -> Option<Message> {
        match tokio::time::timeout(timeout, self.ws.next()).await {
            Ok(Some(Ok(msg))) => Some(msg),
            _ => None,
        }
    }

    /// Next JSON text frame, skipping control frames.
    pub async fn recv_json(&mut self) -> Option<Value> {
        self.recv_json_within(DEFAULT_TIMEOUT).await
    }

    pub async fn recv_json_within(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.recv_frame(remaining).await? {
                msg @ (Message::Text(_) | Message::Binary(_)) => {
                    let text = msg.to_text().expect("UTF-8 frame");
                    return Some(serde_json::from_str(text).expect("JSON frame"));
                }
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }

    /// Assert that no JSON frame arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Some(value) = self.recv_json_within(window).await {
            panic!("expected no message, got {value}");
        }
    }

    /// Whether the server has closed this connection within `timeout`.
    pub async fn closed_within(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, self.ws.next()).await {
                Err(_) => return false,
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
                Ok(Some(Ok(_))) => continue,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
