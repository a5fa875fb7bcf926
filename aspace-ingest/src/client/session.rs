//! Backend session
//!
//! Owns the HTTP client, base URL and the session token. The token is
//! acquired once (explicitly via [`Session::authorize`] or lazily by the first
//! authenticated call) and then only read.

use aspace_common::config::TomlConfig;
use aspace_common::{Error, Result};
use reqwest::{Method, RequestBuilder, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Header carrying the session token on every authenticated call
pub const SESSION_HEADER: &str = "X-ArchivesSpace-Session";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=UTF-8";

const USER_AGENT: &str = concat!("aspace-ingest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct LoginResponse {
    session: Option<String>,
}

pub struct Session {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: String,
    token: OnceCell<String>,
}

impl Session {
    pub fn new(
        backend_uri: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(backend_uri)
            .map_err(|e| Error::Config(format!("Invalid backend_uri '{}': {}", backend_uri, e)))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            username: username.into(),
            password: password.into(),
            token: OnceCell::new(),
        })
    }

    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        Self::new(
            &config.backend_uri,
            config.username.clone(),
            config.password()?.to_string(),
            config.request_timeout(),
        )
    }

    /// Acquire the session token, logging in if none is held yet
    ///
    /// Failure is fatal: nothing can be ingested without a token.
    pub async fn authorize(&self) -> Result<&str> {
        self.token
            .get_or_try_init(|| self.login())
            .await
            .map(String::as_str)
    }

    pub fn is_authorized(&self) -> bool {
        self.token.initialized()
    }

    async fn login(&self) -> Result<String> {
        let url = self.url(&format!("/users/{}/login", self.username))?;
        tracing::debug!(user = %self.username, url = %url, "Requesting session token");

        let token = match self
            .http
            .post(url)
            .form(&[("password", self.password.as_str())])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response
                .json::<LoginResponse>()
                .await
                .ok()
                .and_then(|body| body.session)
                .filter(|token| !token.is_empty()),
            Ok(response) => {
                tracing::error!(status = %response.status(), "Login rejected");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Login request failed");
                None
            }
        };

        match token {
            Some(token) => {
                tracing::info!(user = %self.username, "Session token acquired");
                Ok(token)
            }
            None => {
                tracing::error!(user = %self.username, "Failed to acquire auth");
                Err(Error::Auth(format!("Failed to acquire auth for user '{}'", self.username)))
            }
        }
    }

    /// Resolve an absolute path against the backend base URL
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::InvalidInput(format!("Invalid request path '{}': {}", path, e)))
    }

    /// The token, if one has been acquired
    pub fn token(&self) -> Option<&str> {
        self.token.get().map(String::as_str)
    }

    /// Request builder carrying an already acquired token
    pub fn request_with(&self, method: Method, path: &str, token: &str) -> Result<RequestBuilder> {
        let url = self.url(path)?;
        Ok(self.http.request(method, url).header(SESSION_HEADER, token))
    }

    /// Request builder carrying the session header, logging in first if needed
    pub async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.authorize().await?;
        self.request_with(method, path, token)
    }

    pub async fn get(&self, path: &str) -> Result<RequestBuilder> {
        self.request(Method::GET, path).await
    }

    /// POST with a JSON body already encoded by the caller
    pub fn post_json_with(&self, path: &str, token: &str, body: String) -> Result<RequestBuilder> {
        Ok(self
            .request_with(Method::POST, path, token)?
            .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body))
    }

    pub async fn post_json(&self, path: &str, body: String) -> Result<RequestBuilder> {
        let token = self.authorize().await?;
        self.post_json_with(path, token, body)
    }
}
