use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

/// Body of the placeholder served when a page cannot be loaded at all
pub const OFFLINE_BODY: &str = "You are offline";

/// How the request was initiated, as the browser reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page load
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

/// A request seen by the shell.
#[derive(Debug, Clone)]
pub struct ShellRequest {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl ShellRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            mode: RequestMode::Cors,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// GET and HEAD requests can be answered from the cache.
    pub fn is_safe(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// Identity of the request in a cache bucket.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Response type as classified by the fetch standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response with full access
    Basic,
    Cors,
    Opaque,
    OpaqueRedirect,
    /// Network failure
    Error,
}

/// A response produced by the network or the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub response_type: ResponseType,
    /// Final URL after redirects
    pub url: Option<String>,
    pub redirected: bool,
}

impl ShellResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            response_type: ResponseType::Basic,
            url: None,
            redirected: false,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_url(mut self, url: &Url) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Equivalent of `Response.error()`.
    pub fn network_error() -> Self {
        Self::new(0, Vec::new()).with_type(ResponseType::Error)
    }

    /// Plain text page served when navigation fails with nothing cached.
    pub fn offline_placeholder() -> Self {
        Self::new(200, OFFLINE_BODY).with_header("content-type", "text/plain; charset=utf-8")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_network_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }

    /// Whether a copy may be written back to the cache for `scope`.
    pub fn is_cacheable_for(&self, scope: &Url) -> bool {
        let same_origin = self
            .url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .is_some_and(|u| u.origin() == scope.origin());
        self.status == 200 && self.response_type == ResponseType::Basic && same_origin
    }
}
