// ABOUTME: Shared test support — a minimal OpenAI-wire-compatible mock HTTP server.
// ABOUTME: No mocking crate dependency: hand-rolled since the teacher's stack has no HTTP test double.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct MockServer {
    pub base_url: String,
    _handle: JoinHandle<()>,
}

impl MockServer {
    /// Start a server that replies to successive requests with the given
    /// JSON bodies in order, each on its own connection (`Connection: close`
    /// forces reqwest to open a fresh connection per call, so queue order
    /// lines up with call order regardless of pooling).
    pub async fn start(responses: Vec<Value>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let queue = Arc::new(Mutex::new(VecDeque::from(responses)));

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let queue = queue.clone();
                tokio::spawn(async move {
                    serve_one(stream, queue).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            _handle: handle,
        }
    }
}

async fn serve_one(mut stream: TcpStream, queue: Arc<Mutex<VecDeque<Value>>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let headers_end = loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let header_text = String::from_utf8_lossy(&buf[..headers_end]);
    let content_length: usize = header_text
        .lines()
        .find_map(|line| line.to_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut body_read = buf.len().saturating_sub(headers_end);
    while body_read < content_length {
        let Ok(n) = stream.read(&mut chunk).await else {
            break;
        };
        if n == 0 {
            break;
        }
        body_read += n;
    }

    let response_body = {
        let mut q = queue.lock().await;
        q.pop_front().unwrap_or_else(|| {
            serde_json::json!({
                "choices": [{"message": {"content": "(no mock response queued)"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 0, "completion_tokens": 0}
            })
        })
    };

    let body_str = response_body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_str.len(),
        body_str
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
