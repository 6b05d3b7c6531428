//! HTTP transport seam.
//!
//! Fetch routines only see [`Session`] and [`HttpResponse`]. Dropping a
//! response releases its connection, so a body abandoned after early
//! termination is never read to the end.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use std::sync::Arc;

use crate::config::ScraperConfig;
use crate::error::{Error, Result};

#[async_trait]
pub trait HttpResponse: Send {
    fn status(&self) -> u16;

    fn url(&self) -> &str;

    /// Next body frame, `None` once the body is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    fn error_for_status(&self) -> Result<()> {
        let status = self.status();
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(Error::Status {
                url: self.url().to_string(),
                status,
            })
        }
    }

    /// Entire remaining body.
    async fn read(&mut self) -> Result<Bytes> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

#[async_trait]
pub trait Session: Send + Sync {
    async fn get(&self, url: &str) -> Result<Box<dyn HttpResponse>>;

    /// Submits `form` url-encoded. Never retried.
    async fn post(&self, url: &str, form: &[(&str, &str)]) -> Result<Box<dyn HttpResponse>>;

    /// Header sent with every subsequent request.
    fn set_header(&self, name: &str, value: &str) -> Result<()>;
}

/// Streams a response body in chunks of at most `size_hint` bytes.
///
/// A `size_hint` of 0 passes frames through as received. The stream ends after
/// the first error.
pub fn response_chunks(
    response: Box<dyn HttpResponse>,
    size_hint: usize,
) -> impl Stream<Item = Result<Bytes>> + Send {
    futures::stream::unfold(
        (response, Bytes::new(), false),
        move |(mut response, mut pending, failed)| async move {
            if failed {
                return None;
            }
            while pending.is_empty() {
                match response.next_chunk().await {
                    Ok(Some(frame)) => pending = frame,
                    Ok(None) => return None,
                    Err(e) => return Some((Err(e), (response, Bytes::new(), true))),
                }
            }
            let take = match size_hint {
                0 => pending.len(),
                n => n.min(pending.len()),
            };
            let chunk = pending.split_to(take);
            Some((Ok(chunk), (response, pending, false)))
        },
    )
}

// ── Capability registry ───────────────────────────────────────────────────────

/// Client names this build can construct.
pub fn available_clients() -> &'static [&'static str] {
    #[cfg(feature = "reqwest-client")]
    {
        &["reqwest"]
    }
    #[cfg(not(feature = "reqwest-client"))]
    {
        &[]
    }
}

/// Resolves a client name to a session. Names compiled out of this build fail
/// here rather than at startup.
pub fn session_for(name: &str, config: &ScraperConfig) -> Result<Arc<dyn Session>> {
    match name {
        #[cfg(feature = "reqwest-client")]
        "reqwest" => Ok(Arc::new(reqwest_session::ReqwestSession::new(config)?)),
        other => {
            let _ = config;
            Err(Error::UnsupportedClient(other.to_string()))
        }
    }
}

#[cfg(feature = "reqwest-client")]
pub use reqwest_session::ReqwestSession;

#[cfg(feature = "reqwest-client")]
mod reqwest_session {
    use super::*;
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
    use std::sync::RwLock;
    use std::time::Duration;
    use tokio_retry::RetryIf;
    use tokio_retry::strategy::{ExponentialBackoff, jitter};
    use tracing::{debug, warn};

    use crate::utils::polite_delay;

    pub struct ReqwestSession {
        inner: reqwest::Client,
        config: ScraperConfig,
        headers: RwLock<HeaderMap>,
    }

    impl ReqwestSession {
        pub fn new(config: &ScraperConfig) -> Result<Self> {
            let inner = reqwest::Client::builder()
                .user_agent(&config.user_agent)
                .timeout(Duration::from_secs(config.timeout_secs))
                .gzip(true)
                .build()?;

            Ok(Self {
                inner,
                config: config.clone(),
                headers: RwLock::new(HeaderMap::new()),
            })
        }

        fn headers(&self) -> HeaderMap {
            self.headers
                .read()
                .map(|h| h.clone())
                .unwrap_or_default()
        }

        async fn send_get(&self, url: &str) -> Result<reqwest::Response> {
            polite_delay(self.config.request_delay_ms, self.config.jitter_ms).await;
            debug!("GET {}", url);
            let resp = self.inner.get(url).headers(self.headers()).send().await?;
            match resp.status().as_u16() {
                status @ (429 | 503) => Err(Error::Status {
                    url: url.to_string(),
                    status,
                }),
                _ => Ok(resp),
            }
        }
    }

    fn is_retryable(err: &Error) -> bool {
        match err {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Status { status, .. } => matches!(status, 429 | 503),
            _ => false,
        }
    }

    #[async_trait]
    impl Session for ReqwestSession {
        async fn get(&self, url: &str) -> Result<Box<dyn HttpResponse>> {
            let strategy = ExponentialBackoff::from_millis(2)
                .factor(self.config.request_delay_ms.max(1))
                .max_delay(Duration::from_secs(30))
                .map(jitter)
                .take(self.config.max_retries as usize);

            let mut attempt = 0u32;
            let resp = RetryIf::start(
                strategy,
                || {
                    attempt += 1;
                    let n = attempt;
                    async move {
                        self.send_get(url).await.inspect_err(|e| {
                            warn!("GET {} failed on attempt {}: {}", url, n, e)
                        })
                    }
                },
                is_retryable,
            )
            .await?;

            Ok(Box::new(ReqwestResponse::new(resp)))
        }

        async fn post(&self, url: &str, form: &[(&str, &str)]) -> Result<Box<dyn HttpResponse>> {
            polite_delay(self.config.request_delay_ms, self.config.jitter_ms).await;
            debug!("POST {}", url);
            let body = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(form.iter().copied())
                .finish();
            let resp = self
                .inner
                .post(url)
                .headers(self.headers())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(body)
                .send()
                .await?;
            Ok(Box::new(ReqwestResponse::new(resp)))
        }

        fn set_header(&self, name: &str, value: &str) -> Result<()> {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Transport(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Transport(format!("invalid header value: {e}")))?;
            let mut headers = self
                .headers
                .write()
                .map_err(|_| Error::Transport("header map lock poisoned".into()))?;
            headers.insert(name, value);
            Ok(())
        }
    }

    struct ReqwestResponse {
        inner: reqwest::Response,
        url: String,
        status: u16,
    }

    impl ReqwestResponse {
        fn new(inner: reqwest::Response) -> Self {
            Self {
                url: inner.url().to_string(),
                status: inner.status().as_u16(),
                inner,
            }
        }
    }

    #[async_trait]
    impl HttpResponse for ReqwestResponse {
        fn status(&self) -> u16 {
            self.status
        }

        fn url(&self) -> &str {
            &self.url
        }

        async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            Ok(self.inner.chunk().await?)
        }
    }

}
