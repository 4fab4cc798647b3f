use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use super::message::{RequestMode, ResponseType, ShellRequest, ShellResponse};
use super::ShellError;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Hop-by-hop headers that must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "host",
    "content-length",
];

/// The live network behind the shell.
#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. `Err` means no response at all (offline, DNS,
    /// connection refused, timeout); HTTP error statuses are responses.
    async fn fetch(&self, request: &ShellRequest) -> Result<ShellResponse, ShellError>;
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
    async fn fetch(&self, request: &ShellRequest) -> Result<ShellResponse, ShellError> {
        (**self).fetch(request).await
    }
}

/// Network backed by reqwest. Responses are typed relative to `scope`.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
    scope: Url,
}

impl HttpNetwork {
    pub fn new(scope: Url) -> Result<Self, ShellError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, scope })
    }

    fn classify(&self, request: &ShellRequest, final_url: &Url) -> ResponseType {
        if final_url.origin() == self.scope.origin() {
            ResponseType::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseType::Opaque
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &ShellRequest) -> Result<ShellResponse, ShellError> {
        let mut builder = self.client.request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        debug!(url = %request.url, status, bytes = body.len(), "Network fetch complete");

        Ok(ShellResponse {
            status,
            headers,
            body,
            response_type: self.classify(request, &final_url),
            redirected: final_url != request.url,
            url: Some(final_url.to_string()),
        })
    }
}
