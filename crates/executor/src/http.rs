//! HTTP-backed executor.
//!
//! [`HttpExecutor`] either fetches the target directly (`GET target`) or
//! asks a browser session on a grid to render it (`POST <endpoint>/fetch`
//! with `{"url": target}`, answered by `{"content": "..."}`). Transport and
//! status failures are mapped onto [`FetchErrorKind`] so the engine only
//! ever sees data.

use std::time::Duration;

use async_trait::async_trait;
use crawlgrid_core::{FetchErrorKind, Payload, Target};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::remote::RemoteExecutor;

/// Where requests go.
#[derive(Debug, Clone)]
enum Route {
    Direct,
    Grid { fetch_url: String },
}

/// HTTP executor for a single pool slot.
pub struct HttpExecutor {
    client: reqwest::Client,
    route: Route,
    name: String,
}

#[derive(Debug, Serialize)]
struct GridFetchRequest<'a> {
    url: &'a str,
}

/// Body returned by a grid session after rendering the page.
#[derive(Debug, Deserialize)]
struct GridFetchResponse {
    content: String,
}

/// Errors from the HTTP executor layer, before classification.
#[derive(Debug, thiserror::Error)]
pub enum HttpExecutorError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote side returned a non-2xx status code.
    #[error("Remote returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The target is not an absolute http(s) URL.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
}

impl HttpExecutor {
    /// Executor that fetches targets directly.
    pub fn direct(name: impl Into<String>, timeout: Duration) -> Result<Self, HttpExecutorError> {
        Ok(Self {
            client: build_client(timeout)?,
            route: Route::Direct,
            name: name.into(),
        })
    }

    /// Executor backed by a browser session on a grid.
    ///
    /// * `endpoint` - base URL of the session, e.g. `http://grid:4444/session/7`.
    pub fn grid(
        name: impl Into<String>,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, HttpExecutorError> {
        Ok(Self {
            client: build_client(timeout)?,
            route: Route::Grid {
                fetch_url: format!("{}/fetch", endpoint.trim_end_matches('/')),
            },
            name: name.into(),
        })
    }

    fn via_grid(&self) -> bool {
        matches!(self.route, Route::Grid { .. })
    }

    async fn fetch(&self, target: &str) -> Result<Payload, HttpExecutorError> {
        let url = validate_target(target)?;

        match &self.route {
            Route::Direct => {
                let response = self.client.get(url).send().await?;
                let response = ensure_success(response).await?;
                Ok(Payload::new(response.text().await?))
            }
            Route::Grid { fetch_url } => {
                let response = self
                    .client
                    .post(fetch_url.as_str())
                    .json(&GridFetchRequest { url: target })
                    .send()
                    .await?;
                let response = ensure_success(response).await?;
                let body: GridFetchResponse = response.json().await?;
                Ok(Payload::new(body.content))
            }
        }
    }
}

#[async_trait]
impl RemoteExecutor for HttpExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, target: &Target) -> Result<Payload, FetchErrorKind> {
        self.fetch(target).await.map_err(|e| {
            let kind = classify_error(&e, self.via_grid());
            tracing::debug!(executor = %self.name, target = %target, error = %e, ?kind, "Fetch failed");
            kind
        })
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Map an executor error onto the fetch error kinds missions see.
pub fn classify_error(error: &HttpExecutorError, via_grid: bool) -> FetchErrorKind {
    match error {
        HttpExecutorError::InvalidTarget(_) => FetchErrorKind::MalformedTarget,
        HttpExecutorError::Status { status, .. } => classify_status(*status, via_grid),
        HttpExecutorError::Request(e) if e.is_timeout() => FetchErrorKind::Timeout,
        HttpExecutorError::Request(e) if e.is_builder() => FetchErrorKind::MalformedTarget,
        HttpExecutorError::Request(_) if via_grid => FetchErrorKind::ExecutorUnavailable,
        HttpExecutorError::Request(_) => FetchErrorKind::TargetUnreachable,
    }
}

/// Map a non-2xx status onto a fetch error kind.
///
/// A grid reports upstream trouble with gateway codes (502 bad gateway,
/// 504 gateway timeout); any other 5xx means the session itself is broken.
pub fn classify_status(status: u16, via_grid: bool) -> FetchErrorKind {
    match (status, via_grid) {
        (408, _) | (504, true) => FetchErrorKind::Timeout,
        (400 | 422, true) => FetchErrorKind::MalformedTarget,
        (502, true) => FetchErrorKind::TargetUnreachable,
        (500..=599, true) => FetchErrorKind::ExecutorUnavailable,
        _ => FetchErrorKind::TargetUnreachable,
    }
}

// ---- private helpers ----

fn build_client(timeout: Duration) -> Result<reqwest::Client, HttpExecutorError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Accept only absolute `http`/`https` URLs with a host.
fn validate_target(target: &str) -> Result<Url, HttpExecutorError> {
    let url =
        Url::parse(target).map_err(|e| HttpExecutorError::InvalidTarget(format!("{target}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(HttpExecutorError::InvalidTarget(target.to_string()));
    }
    Ok(url)
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or a [`HttpExecutorError::Status`] containing the
/// status and body text on failure.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, HttpExecutorError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(HttpExecutorError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
