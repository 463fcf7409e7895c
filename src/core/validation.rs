// src/core/validation.rs

//! Syntactic checks run before any network I/O.

use crate::core::errors::ScanError;
use crate::core::models::{DnsScanRequest, WebScanRequest};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

/// One or more 1-63 char alphanumeric/hyphen labels followed by an alphabetic TLD.
static RE_DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$").unwrap()
});

const MAX_DOMAIN_LEN: usize = 253;

/// Default crawl depth when the caller does not send one. Advisory only.
pub const DEFAULT_SCAN_DEPTH: u32 = 2;

/// A web scan request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidWebTarget {
    pub url: Url,
    pub raw: String,
    pub user_id: String,
    pub scan_depth: u32,
}

/// A DNS scan request that passed validation.
#[derive(Debug, Clone)]
pub struct ValidDomain {
    pub domain: String,
    pub user_id: String,
}

fn require_user(user_id: &str) -> Result<String, ScanError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ScanError::InvalidInput("Missing required fields: user_id".into()));
    }
    Ok(user_id.to_string())
}

pub fn validate_web_request(request: &WebScanRequest) -> Result<ValidWebTarget, ScanError> {
    let raw = request.target_url.trim();
    if raw.is_empty() {
        return Err(ScanError::InvalidInput("Missing required fields: target_url".into()));
    }
    let user_id = require_user(&request.user_id)?;

    let url = Url::parse(raw).map_err(|e| {
        debug!(target = raw, error = %e, "Rejected malformed URL.");
        ScanError::InvalidInput(format!("Invalid URL format: {e}"))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScanError::InvalidInput(format!("Unsupported URL scheme: {}", url.scheme())));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ScanError::InvalidInput("Invalid URL format: missing host".into()));
    }

    Ok(ValidWebTarget {
        url,
        raw: raw.to_string(),
        user_id,
        scan_depth: request.scan_depth.unwrap_or(DEFAULT_SCAN_DEPTH),
    })
}

pub fn validate_dns_request(request: &DnsScanRequest) -> Result<ValidDomain, ScanError> {
    let domain = request.domain.trim().trim_end_matches('.');
    if domain.is_empty() {
        return Err(ScanError::InvalidInput("Missing required fields: domain".into()));
    }
    let user_id = require_user(&request.user_id)?;

    if domain.len() > MAX_DOMAIN_LEN || !RE_DOMAIN.is_match(domain) {
        debug!(domain, "Rejected malformed domain.");
        return Err(ScanError::InvalidInput("Invalid domain format".into()));
    }

    Ok(ValidDomain { domain: domain.to_ascii_lowercase(), user_id })
}
