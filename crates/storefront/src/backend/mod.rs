//! Hosted backend-as-a-service clients.
//!
//! # Architecture
//!
//! - One shared [`BackendClient`] holds the `reqwest` connection pool, the
//!   project URL and the anon key
//! - [`AuthClient`] talks to the identity API (`/auth/v1/*`); one instance
//!   per visitor because it holds that visitor's session
//! - [`RestClient`] talks to the relational data API (`/rest/v1/{table}`)
//!
//! Every request carries the project's anon key in the `apikey` header and a
//! bearer token: the user's access token when signed in, the anon key
//! otherwise.

mod auth;
mod rest;
mod types;

pub use auth::AuthClient;
pub use rest::RestClient;

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::config::BackendConfig;
use crate::models::Session;
use crate::services::auth::{BackendConnector, IdentityProvider, ProfileStore, RoleDirectory};

use types::ApiErrorBody;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Api {
        status: u16,
        /// Machine-readable error code (`invalid_credentials`, `PGRST116`, ...).
        code: Option<String>,
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The call needs a signed-in session and there is none.
    #[error("not signed in")]
    NotSignedIn,

    /// Row not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Could not build a request URL.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    /// The backend's error code, if it sent one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Shared client for the hosted backend.
///
/// Cheap to clone. Implements [`BackendConnector`] so the application state
/// can hand each visitor its own identity client.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    http: reqwest::Client,
    base: Url,
    anon_key: SecretString,
    roles_table: String,
    profiles_table: String,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Http` if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("atelier-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // `Url::join` replaces the last path segment unless the base ends in '/'
        let mut base = config.url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                http,
                base,
                anon_key: config.anon_key.clone(),
                roles_table: config.roles_table.clone(),
                profiles_table: config.profiles_table.clone(),
            }),
        })
    }

    pub(crate) fn roles_table(&self) -> &str {
        &self.inner.roles_table
    }

    pub(crate) fn profiles_table(&self) -> &str {
        &self.inner.profiles_table
    }

    /// Build an endpoint URL under the project base with query pairs.
    pub(crate) fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, BackendError> {
        let mut url = self.inner.base.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Start a request with the project headers and the given bearer token.
    pub(crate) fn request(&self, method: Method, url: Url, bearer: Option<&str>) -> RequestBuilder {
        let anon_key = self.inner.anon_key.expose_secret();
        self.inner
            .http
            .request(method, url)
            .header("apikey", anon_key)
            .bearer_auth(bearer.unwrap_or(anon_key))
    }

    /// Send a request and decode a JSON body.
    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let text = self.send_raw(request).await?;

        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    body = %text.chars().take(500).collect::<String>(),
                    "Failed to parse backend response"
                );
                Err(BackendError::Parse(e))
            }
        }
    }

    /// Send a request whose body is irrelevant.
    pub(crate) async fn send_empty(&self, request: RequestBuilder) -> Result<(), BackendError> {
        self.send_raw(request).await.map(|_| ())
    }

    async fn send_raw(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        // Read the body as text first for better error diagnostics
        let text = response.text().await?;

        if !status.is_success() {
            let error = api_error(status, &text);
            tracing::warn!(
                status = %status,
                code = ?error.code(),
                "Backend returned non-success status"
            );
            return Err(error);
        }

        Ok(text)
    }
}

/// Turn an error response into [`BackendError::Api`].
///
/// The identity API and the data API use different error bodies; both are
/// folded into a code and a message. Unparseable bodies keep a prefix of
/// the raw text.
fn api_error(status: StatusCode, body: &str) -> BackendError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = parsed.map_or_else(
        || (None, body.chars().take(200).collect::<String>()),
        ApiErrorBody::into_parts,
    );
    let message = if message.is_empty() {
        status.canonical_reason().unwrap_or("error").to_string()
    } else {
        message
    };

    BackendError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

impl BackendConnector for BackendClient {
    fn identity_for(&self, restored: Option<Session>) -> Arc<dyn IdentityProvider> {
        Arc::new(AuthClient::new(self.clone(), restored))
    }

    fn roles(&self) -> Arc<dyn RoleDirectory> {
        Arc::new(RestClient::new(self.clone()))
    }

    fn profiles(&self) -> Arc<dyn ProfileStore> {
        Arc::new(RestClient::new(self.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client(url: &str) -> BackendClient {
        BackendClient::new(&BackendConfig {
            url: Url::parse(url).unwrap(),
            anon_key: SecretString::from("anon-key"),
            roles_table: "user_roles".to_string(),
            profiles_table: "profiles".to_string(),
            role_lookup_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let backend = client("https://project.example.com/base");
        let url = backend
            .endpoint("auth/v1/token", &[("grant_type", "password")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.com/base/auth/v1/token?grant_type=password"
        );
    }

    #[test]
    fn test_endpoint_encodes_filters() {
        let backend = client("https://project.example.com");
        let url = backend
            .endpoint("rest/v1/profiles", &[("id", "eq.a b")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.com/rest/v1/profiles?id=eq.a+b"
        );
    }

    #[test]
    fn test_request_headers() {
        let backend = client("https://project.example.com");
        let url = backend.endpoint("auth/v1/user", &[]).unwrap();

        let anonymous = backend
            .request(Method::GET, url.clone(), None)
            .build()
            .unwrap();
        assert_eq!(anonymous.headers()["apikey"], "anon-key");
        assert_eq!(anonymous.headers()["authorization"], "Bearer anon-key");

        let signed_in = backend
            .request(Method::GET, url, Some("user-token"))
            .build()
            .unwrap();
        assert_eq!(signed_in.headers()["apikey"], "anon-key");
        assert_eq!(signed_in.headers()["authorization"], "Bearer user-token");
    }

    #[test]
    fn test_api_error_from_identity_body() {
        let err = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        assert_eq!(err.code(), Some("invalid_credentials"));
        assert!(err.to_string().contains("Invalid login credentials"));
    }

    #[test]
    fn test_api_error_from_data_body() {
        let err = api_error(
            StatusCode::NOT_ACCEPTABLE,
            r#"{"code":"PGRST116","message":"JSON object requested, multiple (or no) rows returned"}"#,
        );
        assert_eq!(err.code(), Some("PGRST116"));
    }

    #[test]
    fn test_api_error_from_plain_text() {
        let err = api_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, BackendError::Api { status: 502, code: None, .. }));
        assert!(err.to_string().contains("upstream down"));
    }

    #[test]
    fn test_api_error_empty_body_uses_reason() {
        let err = api_error(StatusCode::UNAUTHORIZED, "");
        assert!(err.to_string().contains("Unauthorized"));
    }
}
