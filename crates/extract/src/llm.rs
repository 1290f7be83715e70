use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A chat-style completion endpoint. One call is one network round-trip; no
/// retries and no interpretation of the returned text.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub temperature: f64,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f64,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    options: ChatOptions,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String, options: ClientOptions) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: options.temperature,
            client,
        })
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    /// Returns `message.content`, or an empty string when the response has none.
    async fn complete(&self, system: &str, user: &str) -> Result<String, TransportError> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            stream: false,
            options: ChatOptions { temperature: self.temperature },
            messages: [
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|source| TransportError::Request { url: url.clone(), source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(TransportError::Decode)?;

        Ok(chat_response
            .message
            .and_then(|m| m.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves exactly one HTTP response and hands back the request body.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            let request_body = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length || n == 0 {
                        break text[header_end + 4..].to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            request_body
        });

        (base_url, handle)
    }

    fn client(base_url: String) -> OllamaClient {
        OllamaClient::new(base_url, "test-model".into(), ClientOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn test_complete_sends_chat_request() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"model":"test-model","message":{"role":"assistant","content":"{\"entities\":[]}"},"done":true}"#,
        )
        .await;

        let content = client(format!("{base_url}/")).complete("sys", "usr").await.unwrap();
        assert_eq!(content, r#"{"entities":[]}"#);

        let sent: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(sent["model"], "test-model");
        assert_eq!(sent["stream"], false);
        assert_eq!(sent["options"]["temperature"], 0.0);
        assert_eq!(sent["messages"][0]["role"], "system");
        assert_eq!(sent["messages"][0]["content"], "sys");
        assert_eq!(sent["messages"][1]["role"], "user");
        assert_eq!(sent["messages"][1]["content"], "usr");
    }

    #[tokio::test]
    async fn test_missing_content_is_empty() {
        let (base_url, _server) = serve_once("200 OK", r#"{"done":true}"#).await;

        let content = client(base_url).complete("s", "u").await.unwrap();
        assert!(content.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let (base_url, _server) = serve_once("500 Internal Server Error", r#"{"error":"model not loaded"}"#).await;

        let err = client(base_url).complete("s", "u").await.unwrap_err();
        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status.as_u16(), 500);
                assert!(body.contains("model not loaded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = client(base_url).complete("s", "u").await.unwrap_err();
        assert!(matches!(err, TransportError::Request { .. }));
    }
}
