// src/core/scanner/path_scanner.rs

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};
use url::Url;

use super::context::WebContext;
use super::{Analyzer, AnalyzerOutput};
use crate::core::errors::ScanError;
use crate::core::knowledge_base::{OWASP_BROKEN_ACCESS_CONTROL, OWASP_SECURITY_MISCONFIGURATION};
use crate::core::models::{Finding, FindingKind, Severity};

/// Administrative and development paths that should never be reachable.
pub const SENSITIVE_PATHS: &[&str] = &[
    "/admin",
    "/administrator",
    "/wp-admin",
    "/phpmyadmin",
    "/.git",
    "/.env",
    "/config.php",
    "/backup",
    "/test",
    "/debug",
];

/// 200 means the path is exposed, 403 means it exists behind access control.
pub fn analyze_path_status(path: &str, probe: &Url, status: StatusCode) -> Option<Finding> {
    let (severity, category) = match status {
        StatusCode::OK => (Severity::Medium, OWASP_BROKEN_ACCESS_CONTROL),
        StatusCode::FORBIDDEN => (Severity::Low, OWASP_SECURITY_MISCONFIGURATION),
        _ => return None,
    };
    Some(
        Finding::new(
            FindingKind::SensitivePathExposure,
            severity,
            format!("Sensitive path accessible: {path}"),
            probe.as_str(),
            "Restrict access to sensitive directories and files",
        )
        .with_proof(format!("HTTP {} - {probe}", status.as_u16()))
        .with_category(category),
    )
}

pub struct SensitivePathAnalyzer;

#[async_trait]
impl Analyzer<WebContext> for SensitivePathAnalyzer {
    fn name(&self) -> &'static str {
        "sensitive_paths"
    }

    async fn analyze(&self, ctx: &WebContext) -> Result<AnalyzerOutput, ScanError> {
        let mut findings = Vec::new();
        for path in SENSITIVE_PATHS {
            let Ok(probe) = ctx.target.join(path) else { continue };
            match ctx.prober.head_status(&probe).await {
                Ok(status) => findings.extend(analyze_path_status(path, &probe, status)),
                Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
                Err(e) => debug!(path, error = %e, "Path probe failed."),
            }
        }
        info!(findings = findings.len(), probed = SENSITIVE_PATHS.len(), "Sensitive path probe finished.");
        Ok(AnalyzerOutput::findings(findings))
    }
}
