//! HTTP client for the Tengen backend

use crate::api::ErrorBody;
use crate::error::{Result, TengenError};
use crate::services::TextStream;
use crate::types::{
    ChatMode, ChatRequest, ChatTurn, CodeRequest, CodeResponse, DebugRequest, DebugResponse,
    HealthStatus, ResearchRequest, ResearchResult, UploadReceipt,
};
use async_trait::async_trait;
use futures::{future, stream, Stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default request timeout
///
/// JSON calls are bounded end to end. Streamed replies are bounded only until
/// the response head arrives, so a long answer is never cut off.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Calls a front end makes against the backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `GET /health`
    async fn health_check(&self) -> Result<HealthStatus>;

    /// `POST /chat`, streamed
    async fn chat(&self, messages: &[ChatTurn], mode: ChatMode) -> Result<TextStream>;

    /// `POST /code-assist`, streamed
    async fn code_assist(&self, messages: &[ChatTurn]) -> Result<TextStream>;

    /// `POST /research`
    async fn research(&self, topic: &str, max_sources: usize) -> Result<ResearchResult>;

    /// `POST /files/upload`
    async fn upload_file(&self, path: &Path) -> Result<UploadReceipt>;
}

/// reqwest-backed [`ChatBackend`]
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        debug!("POST {}", path);
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        response.json::<T>().await.map_err(transport_error)
    }

    /// Only waiting for the response head is bounded; the body may take as long as it needs
    async fn stream_text<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<TextStream> {
        debug!("POST {} (streamed)", path);
        let request = self.client.post(self.url(path)).json(body).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                TengenError::Network(format!(
                    "No response from {} within {}s",
                    path,
                    self.timeout.as_secs_f32()
                ))
            })?
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        Ok(decode_text_stream(response.bytes_stream()))
    }

    /// `POST /code/generate`
    pub async fn code_generate(&self, prompt: &str, code_type: &str) -> Result<CodeResponse> {
        let body = CodeRequest {
            prompt: prompt.to_string(),
            code_type: code_type.to_string(),
        };
        Self::read_json(self.post_json("/code/generate", &body).await?).await
    }

    /// `POST /code/debug`
    pub async fn code_debug(&self, code: &str, language: &str) -> Result<DebugResponse> {
        let body = DebugRequest {
            code: code.to_string(),
            language: language.to_string(),
        };
        Self::read_json(self.post_json("/code/debug", &body).await?).await
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn health_check(&self) -> Result<HealthStatus> {
        let response = self
            .client
            .get(self.url("/health"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_json(check_status(response).await?).await
    }

    async fn chat(&self, messages: &[ChatTurn], mode: ChatMode) -> Result<TextStream> {
        let body = ChatRequest {
            messages: messages.to_vec(),
            mode,
        };
        self.stream_text("/chat", &body).await
    }

    async fn code_assist(&self, messages: &[ChatTurn]) -> Result<TextStream> {
        let body = ChatRequest {
            messages: messages.to_vec(),
            mode: ChatMode::Code,
        };
        self.stream_text("/code-assist", &body).await
    }

    async fn research(&self, topic: &str, max_sources: usize) -> Result<ResearchResult> {
        let body = ResearchRequest {
            topic: topic.to_string(),
            max_sources,
        };
        Self::read_json(self.post_json("/research", &body).await?).await
    }

    async fn upload_file(&self, path: &Path) -> Result<UploadReceipt> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TengenError::Validation(format!("Not a file: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.url("/files/upload"))
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_json(check_status(response).await?).await
    }
}

/// Connect failures and timeouts mean the backend is unreachable
fn transport_error(e: reqwest::Error) -> TengenError {
    if e.is_connect() || e.is_timeout() {
        TengenError::Network(e.to_string())
    } else {
        TengenError::Http(e)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.message,
        Err(_) if text.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => text,
    };

    Err(TengenError::Backend {
        status: status.as_u16(),
        message,
    })
}

/// Incremental UTF-8 decoder for a chunked body
///
/// Bytes of a character split across chunks are held back until the rest
/// arrives. Invalid sequences are replaced.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }

    /// End of input; a truncated final character becomes U+FFFD
    pub fn finish(self) -> String {
        String::from_utf8_lossy(&self.pending).into_owned()
    }
}

fn decode_text_stream<S, B>(bytes: S) -> TextStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = (Box::pin(bytes), Some(Utf8Decoder::default()));
    let decoded = stream::unfold(state, |(mut bytes, decoder)| async move {
        let mut decoder = decoder?;
        let (item, decoder) = match bytes.next().await {
            Some(Ok(chunk)) => (Ok(decoder.push(chunk.as_ref())), Some(decoder)),
            Some(Err(e)) => (Err(transport_error(e)), Some(decoder)),
            None => (Ok(decoder.finish()), None),
        };
        Some((item, (bytes, decoder)))
    });

    Box::pin(decoded.try_filter(|text| future::ready(!text.is_empty())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = ApiClient::new("http://127.0.0.1:8000/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
        assert_eq!(client.url("/chat"), "http://127.0.0.1:8000/chat");
    }

    #[test]
    fn test_decoder_holds_split_characters() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "héllo".as_bytes();
        // split inside the two-byte 'é'
        assert_eq!(decoder.push(&bytes[..2]), "h");
        assert_eq!(decoder.push(&bytes[2..]), "éllo");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_decoder_flushes_truncated_tail() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(b"ok \xc3"), "ok ");
        assert_eq!(decoder.finish(), "\u{FFFD}");

        assert_eq!(Utf8Decoder::default().finish(), "");
    }

    #[tokio::test]
    async fn test_text_stream_keeps_truncated_tail() {
        let chunks: Vec<reqwest::Result<&'static [u8]>> = vec![Ok(&b"caf"[..]), Ok(&b"\xc3"[..])];
        let text: Vec<String> = decode_text_stream(stream::iter(chunks))
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(text, vec!["caf".to_string(), "\u{FFFD}".to_string()]);
    }

    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_streamed_reply_outlives_request_timeout() {
        async fn slow_reply() -> axum::body::Body {
            let parts = stream::iter(["first ", "second"]).then(|part| async move {
                if part == "second" {
                    tokio::time::sleep(Duration::from_millis(600)).await;
                }
                Ok::<_, std::io::Error>(part)
            });
            axum::body::Body::from_stream(parts)
        }

        let url = serve(axum::Router::new().route("/chat", axum::routing::post(slow_reply))).await;
        let client = ApiClient::with_timeout(url, Duration::from_millis(300)).unwrap();

        let text: Vec<String> = client
            .chat(&[ChatTurn::user("hi")], ChatMode::Chat)
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(text.concat(), "first second");
    }

    #[tokio::test]
    async fn test_silent_backend_times_out_before_reply() {
        async fn stalled() -> &'static str {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "late"
        }

        let url = serve(axum::Router::new().route("/chat", axum::routing::post(stalled))).await;
        let client = ApiClient::with_timeout(url, Duration::from_millis(200)).unwrap();

        let err = match client.chat(&[ChatTurn::user("hi")], ChatMode::Chat).await {
            Ok(_) => panic!("expected a timeout"),
            Err(e) => e,
        };
        assert!(err.is_connectivity(), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_network_error() {
        let client =
            ApiClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.health_check().await.unwrap_err();
        assert!(err.is_connectivity(), "unexpected error: {:?}", err);
    }
}
