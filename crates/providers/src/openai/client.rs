use crate::openai::config::OpenAiConfig;
use crate::openai::request::ChatRequest;
use crate::openai::sse::{parse_line, SseLine};
use crate::openai::stream::{self, ResponseStream, StreamSender};
use chatstream_core::chat::{ChatError, Message, Model};
use chatstream_core::secret::ApiKey;
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    cfg: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2);
        if let Some(p) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(p)?);
        }
        let http = builder.build()?;
        Ok(Self { http, cfg })
    }

    /// Builds a client from the token/model/timeout triple, with upstream
    /// defaults for everything else.
    pub fn with_key(
        api_key: impl Into<ApiKey>,
        model: Model,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Self::new(OpenAiConfig::new(api_key, model, timeout))
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.cfg.api_key.reveal())
    }

    /// One-shot completion without streaming.
    pub async fn send(&self, prompt: &str, history: &[Message]) -> Result<Message, ChatError> {
        let request = ChatRequest::new(history, prompt, false, self.cfg.model.clone());
        let resp = self
            .http
            .post(self.endpoint())
            .header(header::AUTHORIZATION, self.bearer())
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        if !resp.status().is_success() {
            return Err(map_status_err(resp.status(), resp.text().await.ok()));
        }
        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        let content = v["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(ChatError::EmptyResponse)?
            .to_string();
        Ok(Message::assistant(content))
    }

    /// Sends `prompt` with the prior history and streams the reply.
    ///
    /// The returned stream yields content fragments on `data` and at most one
    /// terminal error on `errors`; both channels close when the call ends.
    /// Cancelling `cancel`, or hitting the configured timeout, ends the
    /// stream with an error even while a body read is blocked. Failures
    /// before the body starts are reported through the same error channel.
    pub async fn send_with_stream(
        &self,
        cancel: CancellationToken,
        prompt: &str,
        history: &[Message],
    ) -> ResponseStream {
        let (sender, stream) = stream::channel();
        let child = cancel.child_token();
        let deadline = Instant::now() + self.cfg.timeout;

        let request = ChatRequest::new(history, prompt, true, self.cfg.model.clone());
        let body = match serde_json::to_vec(&request) {
            Ok(b) => b,
            Err(e) => {
                error!(target: "providers::openai", "encode request: {}", e);
                sender.send_error(ChatError::Encode(e.to_string())).await;
                return stream;
            }
        };

        let url = self.endpoint();
        info!(target: "providers::openai", "start chat stream model={} url={}", self.cfg.model, url);
        let send_fut = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, self.bearer())
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send();

        let resp = tokio::select! {
            r = send_fut => match r {
                Ok(r) => r,
                Err(e) => {
                    error!(target: "providers::openai", "chat stream request: {}", e);
                    sender.send_error(map_reqwest_err(e)).await;
                    return stream;
                }
            },
            _ = child.cancelled() => {
                sender.send_error(ChatError::Canceled).await;
                return stream;
            }
            _ = sleep_until(deadline) => {
                sender.send_error(ChatError::Timeout("request deadline".into())).await;
                return stream;
            }
        };
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.ok();
            error!(target: "providers::openai", "chat stream non-200 status={} body={:?}", status, text);
            sender.send_error(map_status_err(status, text)).await;
            return stream;
        }

        let (done_tx, done_rx) = oneshot::channel::<()>();
        let reader_sender = sender.clone();
        let reader_cancel = child.clone();
        tokio::spawn(async move {
            consume_body(resp, &reader_sender, &reader_cancel).await;
            reader_sender.close().await;
            let _ = done_tx.send(());
        });

        tokio::spawn(async move {
            // Cancels the child token on every exit path, which aborts a
            // still-blocked body read and releases the connection.
            let _release = child.clone().drop_guard();
            tokio::select! {
                _ = child.cancelled() => sender.send_error(ChatError::Canceled).await,
                _ = sleep_until(deadline) => {
                    sender.send_error(ChatError::Timeout("request deadline".into())).await;
                }
                _ = done_rx => {}
            }
        });

        stream
    }
}

/// Reads the response body line by line until the terminator, an error, or
/// cancellation. The caller closes the stream afterwards.
async fn consume_body(resp: reqwest::Response, sender: &StreamSender, cancel: &CancellationToken) {
    let mut body = resp.bytes_stream();
    let mut buf = bytes::BytesMut::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                sender.send_error(ChatError::Canceled).await;
                return;
            }
            chunk = body.next() => match chunk {
                Some(Ok(b)) => {
                    buf.extend_from_slice(&b);
                    while let Some(pos) = twoway::find_bytes(&buf, b"\n") {
                        let line = buf.split_to(pos + 1).freeze();
                        let text = match std::str::from_utf8(&line) {
                            Ok(t) => t,
                            Err(e) => {
                                sender.send_error(ChatError::Decode(e.to_string())).await;
                                return;
                            }
                        };
                        match parse_line(text) {
                            Ok(SseLine::Skip) => {}
                            Ok(SseLine::Done) => {
                                debug!(target: "providers::openai", "chat stream done");
                                return;
                            }
                            Ok(SseLine::Delta(msg)) => sender.send(msg.content).await,
                            Err(e) => {
                                error!(target: "providers::openai", "chat stream line: {}", e);
                                sender.send_error(e).await;
                                return;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    error!(target: "providers::openai", "chat stream read: {}", e);
                    sender.send_error(map_reqwest_err(e)).await;
                    return;
                }
                None => {
                    sender
                        .send_error(ChatError::Protocol("unexpected end of stream".into()))
                        .await;
                    return;
                }
            }
        }
    }
}

fn map_reqwest_err(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::Timeout(e.to_string())
    } else if e.is_request() || e.is_connect() {
        ChatError::Network(e.to_string())
    } else {
        ChatError::Other(e.to_string())
    }
}

fn map_status_err(status: StatusCode, body: Option<String>) -> ChatError {
    let s = format!("{} {}", status.as_u16(), body.unwrap_or_default());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChatError::Auth(s),
        StatusCode::TOO_MANY_REQUESTS => ChatError::RateLimit(s),
        StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => ChatError::Network(s),
        _ => ChatError::Other(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_map_by_class() {
        assert!(matches!(
            map_status_err(StatusCode::UNAUTHORIZED, None),
            ChatError::Auth(_)
        ));
        assert!(matches!(
            map_status_err(StatusCode::TOO_MANY_REQUESTS, Some("slow down".into())),
            ChatError::RateLimit(_)
        ));
        assert!(matches!(
            map_status_err(StatusCode::BAD_GATEWAY, None),
            ChatError::Network(_)
        ));
        assert!(matches!(
            map_status_err(StatusCode::IM_A_TEAPOT, None),
            ChatError::Other(_)
        ));
    }

    #[test]
    fn status_error_keeps_the_upstream_body() {
        let err = map_status_err(StatusCode::UNAUTHORIZED, Some("bad key".into()));
        assert_eq!(err.to_string(), "auth error: 401 bad key");
    }
}
