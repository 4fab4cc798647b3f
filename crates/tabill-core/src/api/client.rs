//! API client for the hosted Tabill backend.
//!
//! Auth goes through the `/auth/v1` endpoints and data through the
//! `/rest/v1` collection endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::SessionData;
use crate::config::Config;
use crate::models::{AppUser, BranchOption, CustomerInfo, Identity, StaffMember};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const AUTH_PATH: &str = "/auth/v1";
const REST_PATH: &str = "/rest/v1";

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    email: Option<String>,
}

/// API client for the hosted backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    anon_key: Option<String>,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            anon_key: self.anon_key.clone(),
            token: Some(token),
        }
    }

    fn auth_url(&self, grant_type: &str) -> String {
        format!("{}{}/token?grant_type={}", self.base_url, AUTH_PATH, grant_type)
    }

    fn rest_url(&self, collection: &str) -> String {
        format!("{}{}/{}", self.base_url, REST_PATH, collection)
    }

    fn headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref key) = self.anon_key {
            headers.insert("apikey", header::HeaderValue::from_str(key)?);
        }
        if let Some(bearer) = self.token.as_ref().or(self.anon_key.as_ref()) {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", bearer))?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self
            .client
            .get(url)
            .headers(self.headers()?)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        Self::check_response(response)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Sign in with email and password and load the caller's identity.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionData> {
        let response = self
            .client
            .post(self.auth_url("password"))
            .headers(self.headers()?)
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(ApiError::NetworkError)?;

        let token: TokenResponse = Self::check_response(response)
            .await?
            .json()
            .await
            .context("Failed to parse sign-in response")?;

        self.session_from_token(token).await
    }

    /// Exchange a refresh token for a new session.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<SessionData> {
        let response = self
            .client
            .post(self.auth_url("refresh_token"))
            .headers(self.headers()?)
            .json(&RefreshGrant { refresh_token })
            .send()
            .await
            .context("Failed to send session refresh request")?;

        let token: TokenResponse = Self::check_response(response)
            .await?
            .json()
            .await
            .context("Failed to parse session refresh response")?;

        self.session_from_token(token).await
    }

    async fn session_from_token(&self, token: TokenResponse) -> Result<SessionData> {
        let authed = self.with_token(token.access_token.clone());
        let identity = authed.fetch_identity(&token.user.id).await?;

        Ok(SessionData {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user_id: token.user.id,
            email: token.user.email,
            identity,
            expires_in: token.expires_in,
            created_at: Utc::now(),
        })
    }

    /// Load the app user and staff rows for an auth user id.
    pub async fn fetch_identity(&self, user_id: &str) -> Result<Identity> {
        let app_user = self.fetch_app_user(user_id).await?;
        let staff_member = match self.fetch_staff_member(user_id).await {
            Ok(staff) => staff,
            Err(e) => {
                warn!(error = %e, "Failed to load staff membership, treating as owner");
                None
            }
        };
        debug!(
            has_user = app_user.is_some(),
            has_staff = staff_member.is_some(),
            "Identity loaded"
        );
        Ok(Identity {
            app_user,
            staff_member,
        })
    }

    // ========================================================================
    // Collections
    // ========================================================================

    pub async fn fetch_app_user(&self, uid: &str) -> Result<Option<AppUser>> {
        let rows: Vec<AppUser> = self
            .get(
                &self.rest_url("users"),
                &[
                    ("select", "uid,name,email,phone".to_string()),
                    ("uid", format!("eq.{}", uid)),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    pub async fn fetch_staff_member(&self, user_id: &str) -> Result<Option<StaffMember>> {
        let rows: Vec<StaffMember> = self
            .get(
                &self.rest_url("staff"),
                &[
                    ("select", "id,user_id,owner_id,branch_id,role".to_string()),
                    ("user_id", format!("eq.{}", user_id)),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Branches for an owner, most recently created first.
    pub async fn fetch_branches(&self, owner_id: &str) -> Result<Vec<BranchOption>> {
        self.get(
            &self.rest_url("branches"),
            &[
                ("select", "id,name".to_string()),
                ("owner_id", format!("eq.{}", owner_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    /// Customer display info for payment notes.
    pub async fn fetch_customer_info(&self, uid: &str) -> Result<CustomerInfo> {
        let rows: Vec<CustomerInfo> = self
            .get(
                &self.rest_url("users"),
                &[
                    ("select", "name,email,phone".to_string()),
                    ("uid", format!("eq.{}", uid)),
                ],
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("user {}", uid)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        let config = Config {
            supabase_url: "https://project.supabase.co/".to_string(),
            supabase_anon_key: Some("anon-key".to_string()),
            ..Config::default()
        };
        ApiClient::new(&config).expect("client")
    }

    #[test]
    fn test_urls() {
        let api = client();
        assert_eq!(
            api.rest_url("branches"),
            "https://project.supabase.co/rest/v1/branches"
        );
        assert_eq!(
            api.auth_url("password"),
            "https://project.supabase.co/auth/v1/token?grant_type=password"
        );
    }

    #[test]
    fn test_bearer_prefers_session_token() {
        let api = client();
        let headers = api.headers().expect("headers");
        assert_eq!(headers["authorization"], "Bearer anon-key");
        assert_eq!(headers["apikey"], "anon-key");

        let authed = api.with_token("user-jwt".to_string());
        let headers = authed.headers().expect("headers");
        assert_eq!(headers["authorization"], "Bearer user-jwt");
        assert_eq!(headers["apikey"], "anon-key");
    }

    #[test]
    fn test_parse_token_response() {
        let json = r#"{"access_token":"jwt","token_type":"bearer","expires_in":3600,"refresh_token":"r1","user":{"id":"0b6c","email":"owner@tabill.in","role":"authenticated"}}"#;
        let token: TokenResponse =
            serde_json::from_str(json).expect("Failed to parse token test JSON");
        assert_eq!(token.access_token, "jwt");
        assert_eq!(token.expires_in, 3600);
        assert_eq!(token.user.id, "0b6c");
        assert_eq!(token.user.email.as_deref(), Some("owner@tabill.in"));
    }
}
