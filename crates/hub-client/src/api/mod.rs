//! Backend HTTP client.
//!
//! Every request reads the bearer token from the session store at call time.
//! Failures are normalized before they reach the caller, so callers only see
//! [`NormalizedError`].

mod endpoints;
mod recovery;
mod retry;

pub use endpoints::{
    CompanyRegistration, CompanySummary, InviteLink, LoginOutcome, ManagerRegistration,
    RegistrationReceipt, ResumeAnalysis,
};
pub use recovery::recover_from;
pub use reqwest::Method;
pub use retry::{
    retry_with_backoff, retry_with_backoff_if, with_timeout, RetryPolicy, SubmitGate, SubmitPermit,
    TimeoutError,
};

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::multipart::Form;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{normalize, HttpFailure, NormalizedError};
use crate::session::SessionStore;

/// HTTP client for the company hub backend.
pub struct ApiClient<S: SessionStore> {
    http: reqwest::Client,
    base_url: String,
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S: SessionStore> Clone for ApiClient<S> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            store: Arc::clone(&self.store),
            retry: self.retry,
        }
    }
}

impl<S: SessionStore> ApiClient<S> {
    pub fn new(config: &ClientConfig, store: Arc<S>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = match reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
        {
            Ok(http) => http,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "HTTP client build failed, falling back to defaults without timeout or JSON headers"
                );
                reqwest::Client::default()
            }
        };

        Self {
            http,
            base_url: config.base_url().to_string(),
            store,
            retry: config.retry_policy(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Token as of now; a failed store read sends the request anonymously.
    fn bearer_token(&self) -> Option<String> {
        match self.store.get() {
            Ok(session) if session.is_authenticated() => session.token,
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Session read failed, sending request without token");
                None
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        tracing::debug!(%method, %url, "API request");
        let builder = self.http.request(method, url);
        match self.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, NormalizedError> {
        self.execute(self.request(Method::GET, path)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, NormalizedError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, NormalizedError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, NormalizedError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(Method::PATCH, path).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, NormalizedError> {
        self.execute(self.request(Method::DELETE, path)).await
    }

    /// Multipart upload. The form sets its own content type; auth is kept.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Form,
    ) -> Result<T, NormalizedError> {
        self.execute(self.request(Method::POST, path).multipart(form)).await
    }

    /// Generic JSON call. Non-JSON success bodies are wrapped as `{"data": text}`.
    pub async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, NormalizedError> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| normalize(&transport_failure(&e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| normalize(&transport_failure(&e)))?;

        if !status.is_success() {
            return Err(normalize(&HttpFailure::Status {
                status: status.as_u16(),
                body: serde_json::from_str(&text).ok(),
            }));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| serde_json::json!({ "data": text })))
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, NormalizedError> {
        let response = builder.send().await.map_err(|e| normalize(&transport_failure(&e)))?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(normalize(&HttpFailure::Status {
                status: status.as_u16(),
                body: serde_json::from_str(&text).ok(),
            }));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| normalize(&transport_failure(&e)))?;
        decode_body(&bytes)
    }
}

/// Builder errors never reached the network; everything else did.
fn transport_failure(err: &reqwest::Error) -> HttpFailure {
    if err.is_builder() {
        HttpFailure::NotSent {
            reason: err.to_string(),
        }
    } else {
        HttpFailure::NoResponse {
            reason: err.to_string(),
        }
    }
}

fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, NormalizedError> {
    let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        bytes
    };
    serde_json::from_slice(bytes).map_err(|e| {
        normalize(&HttpFailure::NotSent {
            reason: format!("undecodable response body: {}", e),
        })
    })
}

#[cfg(test)]
pub(crate) mod test_server {
    //! In-process backend used by the client tests.

    use axum::Router;
    use std::net::SocketAddr;

    pub async fn spawn(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::{MemorySessionStore, Session};
    use axum::{
        http::{HeaderMap as AxumHeaders, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    fn echo_auth(headers: AxumHeaders) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Json(json!({ "authorization": auth, "content_type": content_type }))
    }

    async fn client_for(router: Router, store: Arc<MemorySessionStore>) -> ApiClient<MemorySessionStore> {
        let addr = test_server::spawn(router).await;
        let config = ClientConfig::default().with_api_url(format!("http://{}/api/", addr));
        ApiClient::new(&config, store)
    }

    fn router() -> Router {
        Router::new()
            .route("/api/whoami/", get(|h: AxumHeaders| async move { echo_auth(h) }))
            .route(
                "/api/upload/",
                post(|h: AxumHeaders| async move { echo_auth(h) }),
            )
            .route(
                "/api/expired/",
                get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Token expired"}))) }),
            )
            .route(
                "/api/form/",
                post(|| async {
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(json!({"errors": {"email": "invalid"}})),
                    )
                }),
            )
            .route(
                "/api/crash/",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "<html>Server Error</html>") }),
            )
            .route("/api/plain/", get(|| async { "pong" }))
            .route("/api/empty/", post(|| async { StatusCode::NO_CONTENT }))
    }

    #[tokio::test]
    async fn test_token_read_at_call_time() {
        let store = Arc::new(MemorySessionStore::new());
        let client = client_for(router(), Arc::clone(&store)).await;

        let anonymous: Value = client.get("/whoami/").await.unwrap();
        assert_eq!(anonymous["authorization"], Value::Null);

        store.set(&Session::with_token("abc")).unwrap();
        let authed: Value = client.get("whoami/").await.unwrap();
        assert_eq!(authed["authorization"], "Bearer abc");
        assert_eq!(authed["content_type"], "application/json");

        store.clear().unwrap();
        let cleared: Value = client.get("/whoami/").await.unwrap();
        assert_eq!(cleared["authorization"], Value::Null);
    }

    #[tokio::test]
    async fn test_multipart_keeps_auth() {
        let store = Arc::new(MemorySessionStore::with_session(Session::with_token("tok")));
        let client = client_for(router(), store).await;

        let form = Form::new().text("token", "invite-1");
        let echoed: Value = client.post_multipart("/upload/", form).await.unwrap();
        assert_eq!(echoed["authorization"], "Bearer tok");
        assert!(echoed["content_type"]
            .as_str()
            .unwrap()
            .starts_with("multipart/form-data"));
    }

    #[tokio::test]
    async fn test_failures_are_normalized() {
        let client = client_for(router(), Arc::new(MemorySessionStore::new())).await;

        let err = client.get::<Value>("/expired/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
        assert_eq!(err.message, "Token expired");
        assert!(err.requires_login());

        let err = client
            .post::<_, Value>("/form/", &json!({"email": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.field_errors.unwrap()["email"], "invalid");

        let err = client.get::<Value>("/crash/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServerError);
        assert_eq!(err.message, "Server error. Please try again later.");

        let err = client.get::<Value>("/missing/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig::default().with_api_url(format!("http://{}/api", addr));
        let client = ApiClient::new(&config, Arc::new(MemorySessionStore::new()));
        let err = client.get::<Value>("/whoami/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NetworkError);
    }

    #[tokio::test]
    async fn test_undecodable_success_is_unknown_error() {
        let client = client_for(router(), Arc::new(MemorySessionStore::new())).await;
        let err = client.get::<Vec<u32>>("/plain/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownError);
    }

    #[tokio::test]
    async fn test_send_raw_wraps_text_and_empty_bodies() {
        let client = client_for(router(), Arc::new(MemorySessionStore::new())).await;
        let plain = client.send_raw(Method::GET, "/plain/", None).await.unwrap();
        assert_eq!(plain, json!({"data": "pong"}));

        let empty = client
            .send_raw(Method::POST, "/empty/", Some(json!({})))
            .await
            .unwrap();
        assert_eq!(empty, Value::Null);

        let err = client.send_raw(Method::GET, "/expired/", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
    }

    #[test]
    fn test_decode_empty_body_as_null() {
        let unit: () = decode_body(b"  ").unwrap();
        assert_eq!(unit, ());
        let value: Value = decode_body(b"").unwrap();
        assert_eq!(value, Value::Null);
    }
}
