// src/core/scanner/context.rs

//! Shared plumbing for analyzers: cancellation, paced outbound HTTP and the
//! lazily fetched landing page of a web target.

use crate::core::errors::ScanError;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, ACCEPT, SET_COOKIE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OnceCell};
use tracing::debug;
use url::Url;

// --- Cancellation ---

/// Cloneable cancellation flag. Every clone observes the same state.
#[derive(Clone, Debug)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self { sender: Arc::new(sender), receiver }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Returns a guard that cancels the token when dropped, e.g. when an HTTP
    /// handler future is dropped because the client went away.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop { token: self.clone(), armed: true }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CancelOnDrop {
    token: CancelToken,
    armed: bool,
}

impl CancelOnDrop {
    /// Leaves the token untouched on drop.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.token.cancel();
        }
    }
}

// --- Outbound HTTP ---

/// Per-host request pacing shared by every scan of one engine.
pub type TargetLimiter = DefaultKeyedRateLimiter<String>;

pub fn target_limiter(requests_per_second: u32) -> Arc<TargetLimiter> {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_second(rate)))
}

/// One fetched page.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl PageSnapshot {
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect()
    }
}

/// HTTP client wrapper that every analyzer goes through. Applies the probe
/// timeout, per-host pacing, cancellation and the body size cap.
#[derive(Clone)]
pub struct Prober {
    client: Client,
    limiter: Arc<TargetLimiter>,
    probe_timeout: Duration,
    max_body_bytes: usize,
    cancel: CancelToken,
}

impl Prober {
    pub fn new(
        client: Client,
        limiter: Arc<TargetLimiter>,
        probe_timeout: Duration,
        max_body_bytes: usize,
        cancel: CancelToken,
    ) -> Self {
        Self { client, limiter, probe_timeout, max_body_bytes, cancel }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Waits for the host's rate-limit slot, or fails if the scan is cancelled first.
    pub async fn pace(&self, host: &str) -> Result<(), ScanError> {
        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        let key = host.to_ascii_lowercase();
        tokio::select! {
            _ = self.limiter.until_key_ready(&key) => Ok(()),
            _ = self.cancel.cancelled() => Err(ScanError::Cancelled),
        }
    }

    pub async fn fetch(&self, url: &Url) -> Result<PageSnapshot, ScanError> {
        let response = self.send(Method::GET, url, host_key(url), None).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let body = self.read_body(url, response).await?;
        debug!(url = %final_url, status, bytes = body.len(), "Fetched page.");
        Ok(PageSnapshot { url: final_url, status, headers, body })
    }

    pub async fn head_status(&self, url: &Url) -> Result<StatusCode, ScanError> {
        Ok(self.send(Method::HEAD, url, host_key(url), None).await?.status())
    }

    /// Paced under `pace_key` rather than the URL's host, for shared
    /// services queried on behalf of a target.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        pace_key: &str,
        accept: &'static str,
    ) -> Result<T, ScanError> {
        let response = self.send(Method::GET, url, pace_key, Some(accept)).await?;
        let body = self.read_body(url, response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        pace_key: &str,
        accept: Option<&'static str>,
    ) -> Result<Response, ScanError> {
        self.pace(pace_key).await?;

        let mut request = self.client.request(method, url.clone()).timeout(self.probe_timeout);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        tokio::select! {
            result = request.send() => result.map_err(|e| self.classify(url, e)),
            _ = self.cancel.cancelled() => Err(ScanError::Cancelled),
        }
    }

    async fn read_body(&self, url: &Url, mut response: Response) -> Result<String, ScanError> {
        let mut body = Vec::new();
        loop {
            let chunk = tokio::select! {
                chunk = response.chunk() => chunk.map_err(|e| self.classify(url, e))?,
                _ = self.cancel.cancelled() => return Err(ScanError::Cancelled),
            };
            let Some(bytes) = chunk else { break };
            let room = self.max_body_bytes.saturating_sub(body.len());
            body.extend_from_slice(&bytes[..bytes.len().min(room)]);
            if body.len() >= self.max_body_bytes {
                debug!(url = %url, cap = self.max_body_bytes, "Body truncated at size cap.");
                break;
            }
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn classify(&self, url: &Url, error: reqwest::Error) -> ScanError {
        if error.is_timeout() {
            ScanError::Timeout(self.probe_timeout)
        } else {
            ScanError::http(url, error)
        }
    }
}

fn host_key(url: &Url) -> &str {
    url.host_str().unwrap_or_default()
}

// --- Web context ---

/// Everything a web analyzer needs. The landing page is fetched at most once
/// and shared by every analyzer that reads it.
pub struct WebContext {
    pub target: Url,
    pub scan_depth: u32,
    pub prober: Prober,
    page: OnceCell<Arc<PageSnapshot>>,
}

impl WebContext {
    pub fn new(target: Url, scan_depth: u32, prober: Prober) -> Self {
        Self { target, scan_depth, prober, page: OnceCell::new() }
    }

    pub async fn landing_page(&self) -> Result<Arc<PageSnapshot>, ScanError> {
        self.page
            .get_or_try_init(|| async { self.prober.fetch(&self.target).await.map(Arc::new) })
            .await
            .cloned()
    }
}
