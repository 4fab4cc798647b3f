use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Request, State as AxumState},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, warn};

use tabill_core::models::OrderRequest;
use tabill_core::shell::{
    Method as ShellMethod, RequestMode, ShellRequest, ShellResponse, Url,
};

use super::{error::AppError, state::State};

/// Largest request body forwarded through the shell
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "content-length",
];

pub async fn create_order_handler(
    AxumState(state): AxumState<Arc<State>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let payments = state.payments.as_ref().ok_or(AppError::PaymentsDisabled)?;
    let request: OrderRequest =
        serde_json::from_slice(&body).map_err(|_| AppError::MalformedPayload)?;

    let order = payments.create_order(request).await?;
    Ok(Json(order))
}

/// Everything that is not an API route goes through the offline shell.
pub async fn shell_handler(
    AxumState(state): AxumState<Arc<State>>,
    request: Request,
) -> Result<Response, AppError> {
    let shell_request = to_shell_request(state.shell.scope(), request).await?;
    debug!(method = %shell_request.method, url = %shell_request.url, mode = ?shell_request.mode, "Shell request");

    let response = state.shell.fetch(shell_request).await?;
    Ok(to_response(response))
}

pub(crate) async fn to_shell_request(scope: &Url, request: Request) -> Result<ShellRequest, AppError> {
    let (parts, body) = request.into_parts();
    let url = origin_url(scope, &parts.uri);

    let method = ShellMethod::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|_| AppError::MalformedPayload)?;
    let mut shell_request = ShellRequest::new(method, url);
    shell_request.mode = request_mode(&parts.method, &parts.headers);
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            shell_request = shell_request.with_header(name.as_str(), value);
        }
    }

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::MalformedPayload)?;
    if !body.is_empty() {
        shell_request = shell_request.with_body(body.to_vec());
    }
    Ok(shell_request)
}

/// The request target on the shell's origin. Only the path and query are
/// taken from the client, so a target such as `//other.host/x` stays a path.
fn origin_url(scope: &Url, uri: &axum::http::Uri) -> Url {
    let mut url = scope.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    url.set_fragment(None);
    url
}

/// Page loads are marked by `Sec-Fetch-Mode: navigate`; older clients are
/// recognised by a GET that accepts HTML.
pub(crate) fn request_mode(method: &Method, headers: &axum::http::HeaderMap) -> RequestMode {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    match header("sec-fetch-mode") {
        Some("navigate") => RequestMode::Navigate,
        Some("no-cors") => RequestMode::NoCors,
        Some("same-origin") => RequestMode::SameOrigin,
        Some(_) => RequestMode::Cors,
        None if method == Method::GET
            && header(header::ACCEPT.as_str()).is_some_and(|a| a.contains("text/html")) =>
        {
            RequestMode::Navigate
        }
        None => RequestMode::Cors,
    }
}

fn to_response(response: ShellResponse) -> Response {
    if response.is_network_error() {
        return (StatusCode::BAD_GATEWAY, "Network error").into_response();
    }

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => warn!(header = %name, "Dropping invalid response header"),
        }
    }

    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build shell response");
            StatusCode::BAD_GATEWAY.into_response()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Url {
        Url::parse("https://app.tabill.in/").expect("url")
    }

    #[tokio::test]
    async fn test_request_target_stays_on_app_origin() {
        let request = Request::builder()
            .uri("//evil.example/steal?x=1")
            .header("authorization", "Bearer user-jwt")
            .body(Body::empty())
            .expect("request");

        let shell_request = to_shell_request(&scope(), request).await.expect("shell request");

        assert_eq!(shell_request.url.host_str(), Some("app.tabill.in"));
        assert_eq!(shell_request.url.origin(), scope().origin());
        assert_eq!(shell_request.url.query(), Some("x=1"));
    }

    #[tokio::test]
    async fn test_path_and_query_are_kept() {
        let request = Request::builder()
            .uri("/menu/items?branch=b2")
            .body(Body::empty())
            .expect("request");

        let shell_request = to_shell_request(&scope(), request).await.expect("shell request");

        assert_eq!(
            shell_request.url.as_str(),
            "https://app.tabill.in/menu/items?branch=b2"
        );
        assert_eq!(shell_request.method, ShellMethod::GET);
    }

    #[test]
    fn test_absolute_form_target_is_pinned_to_scope() {
        let uri: axum::http::Uri = "http://evil.example/steal".parse().expect("uri");
        assert_eq!(
            origin_url(&scope(), &uri).as_str(),
            "https://app.tabill.in/steal"
        );
    }
}
