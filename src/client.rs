// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Release API client.
//!
//! The filesystem only needs one capability from the hosting service: an
//! authenticated GET that yields a status code and a byte stream. That is the
//! [`ApiClient`] trait. [`HttpClient`] implements it over `reqwest::blocking`.
//!
//! Metadata lives on the API host while asset downloads are served from a
//! different host, so a request names either a path on the API host or an
//! absolute URL on its own host.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Url;

use crate::error::FsError;
use crate::utils::mask_sensitive;

/// Timeout for establishing connections (in seconds).
const CONNECTION_TIMEOUT_SECS: u64 = 10;

/// Environment variables checked for an API token, in order.
const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// What a GET request points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget<'a> {
    /// Path resolved against the API host (`/repos/o/r/releases/latest`)
    Path(&'a str),
    /// Absolute URL resolved against its own host
    Url(&'a str),
}

impl fmt::Display for RequestTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path),
            Self::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Status and body of a response.
pub struct ApiResponse {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }

    /// True for statuses in 200..=399.
    pub fn is_success(&self) -> bool {
        (200..=399).contains(&self.status)
    }

    /// Fail with [`FsError::HttpStatus`] unless the status is a success.
    pub fn error_for_status(self, target: RequestTarget<'_>) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(anyhow!(FsError::HttpStatus {
                status: self.status,
                target: target.to_string(),
            }))
        }
    }
}

impl fmt::Debug for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResponse").field("status", &self.status).finish_non_exhaustive()
    }
}

/// Issues GET requests against the release host.
///
/// Implementations are shared with the cache workers, hence `Send + Sync`.
/// Errors that mean the request could not be made should be
/// [`FsError::Transport`]; a non-success status is *not* an error here.
pub trait ApiClient: Send + Sync {
    fn get(&self, target: RequestTarget<'_>) -> Result<ApiResponse>;
}

/// [`ApiClient`] backed by a blocking reqwest client.
#[derive(Clone)]
pub struct HttpClient {
    base_url: Url,
    client: reqwest::blocking::Client,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient").field("base_url", &self.base_url.as_str()).finish()
    }
}

impl HttpClient {
    /// Create a client for `host`, picking up a token from the environment.
    ///
    /// `host` may carry a scheme and a path prefix; `https://` is assumed otherwise.
    pub fn new(host: &str) -> Result<Self> {
        let token = TOKEN_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty());
        Self::with_token(host, token.as_deref())
    }

    /// Create a client for `host` with an explicit token (or none).
    pub fn with_token(host: &str, token: Option<&str>) -> Result<Self> {
        let base_url = base_url(host)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("releasefs/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token {
            tracing::debug!("Using API token {}", mask_sensitive(token, 4));
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| anyhow!(FsError::Transport("API token is not a valid header".into())))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
            // Asset downloads can be large
            .timeout(None)
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow!(FsError::Transport(format!("building HTTP client: {}", e))))?;

        Ok(Self { base_url, client })
    }

    /// Base URL requests with [`RequestTarget::Path`] are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resolve(&self, target: RequestTarget<'_>) -> Result<Url> {
        match target {
            RequestTarget::Path(path) => {
                let joined = format!(
                    "{}/{}",
                    self.base_url.as_str().trim_end_matches('/'),
                    path.trim_start_matches('/')
                );
                Url::parse(&joined).map_err(|e| anyhow!(FsError::InvalidUrl(format!("{}: {}", joined, e))))
            }
            RequestTarget::Url(url) => {
                Url::parse(url).map_err(|e| anyhow!(FsError::InvalidUrl(format!("{}: {}", url, e))))
            }
        }
    }
}

impl ApiClient for HttpClient {
    fn get(&self, target: RequestTarget<'_>) -> Result<ApiResponse> {
        let url = self.resolve(target)?;
        tracing::debug!("GET {}", url);

        let response = self.client.get(url.clone()).send().map_err(|e| {
            if e.is_connect() {
                anyhow!(FsError::Transport(format!("cannot connect to {}", url.host_str().unwrap_or_default())))
            } else if e.is_timeout() {
                anyhow!(FsError::Transport(format!("request to {} timed out", url)))
            } else {
                anyhow!(FsError::Transport(e.to_string()))
            }
        })?;

        Ok(ApiResponse::new(response.status().as_u16(), response))
    }
}

/// Turn a configured host into a base URL.
fn base_url(host: &str) -> Result<Url> {
    let host = host.trim();
    if host.is_empty() {
        return Err(anyhow!(FsError::InvalidHost("host is empty".into())));
    }

    let candidate = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };

    let url = Url::parse(&candidate).map_err(|e| anyhow!(FsError::InvalidHost(format!("{}: {}", host, e))))?;
    if url.host_str().is_none() {
        return Err(anyhow!(FsError::InvalidHost(host.to_string())));
    }
    Ok(url)
}
