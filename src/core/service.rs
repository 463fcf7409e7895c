// src/core/service.rs

//! Request-level flow shared by the HTTP server and the CLI:
//! validate, scan, recommend, persist, respond.

use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::core::errors::ScanError;
use crate::core::knowledge_base::{dns_recommendations, web_recommendations};
use crate::core::models::{
    DnsScanRequest, DnsScanResponse, DnsScanResult, SeveritySummary, WebScanRequest, WebScanResponse,
    WebScanResult, WebSummary,
};
use crate::core::persistence::{persist_with_retry, RetryPolicy, ScanRecord, ScanStore};
use crate::core::scanner::context::CancelToken;
use crate::core::scanner::ScanEngine;
use crate::core::validation::{validate_dns_request, validate_web_request};

pub struct ScanService {
    engine: ScanEngine,
    store: Option<Arc<dyn ScanStore>>,
    retry: RetryPolicy,
    preview_limit: usize,
}

impl ScanService {
    /// `store: None` runs scans without persisting them.
    pub fn new(engine: ScanEngine, store: Option<Arc<dyn ScanStore>>, retry: RetryPolicy, preview_limit: usize) -> Self {
        Self { engine, store, retry, preview_limit }
    }

    pub async fn web_scan(&self, request: &WebScanRequest, cancel: &CancelToken) -> Result<WebScanResponse, ScanError> {
        let target = validate_web_request(request)?;
        let result = self.engine.scan_web(&target, cancel).await?;
        let recommendations = web_recommendations(&result.vulnerabilities);
        let scan_id = self.persist(ScanRecord::web(&target.user_id, &result)?).await;
        Ok(web_response(result, scan_id, recommendations, self.preview_limit))
    }

    pub async fn dns_scan(&self, request: &DnsScanRequest, cancel: &CancelToken) -> Result<DnsScanResponse, ScanError> {
        let target = validate_dns_request(request)?;
        let result = self.engine.scan_dns(&target, cancel).await?;
        let recommendations = dns_recommendations(&result.vulnerabilities, &result.security_features);
        let analysis_id = self.persist(ScanRecord::dns(&target.user_id, &result)?).await;
        Ok(dns_response(result, analysis_id, recommendations, self.preview_limit))
    }

    /// The record id once stored, `None` when persistence is off or failed.
    async fn persist(&self, record: ScanRecord) -> Option<Uuid> {
        let store = self.store.as_ref()?;
        match persist_with_retry(store.as_ref(), &record, self.retry).await {
            Ok(()) => Some(record.id),
            Err(e) => {
                error!(target = %record.target, error = %e, "Scan result not persisted.");
                None
            }
        }
    }
}

pub fn web_response(
    result: WebScanResult,
    scan_id: Option<Uuid>,
    recommendations: Vec<String>,
    preview_limit: usize,
) -> WebScanResponse {
    let summary = WebSummary {
        pages_scanned: result.stats.pages_scanned,
        forms_found: result.stats.forms_found,
        inputs_tested: result.stats.inputs_tested,
        severities: SeveritySummary::from_findings(&result.vulnerabilities),
    };
    info!(target = %result.target_url, persisted = scan_id.is_some(), "Web scan response ready.");
    WebScanResponse {
        success: true,
        scan_id,
        persisted: scan_id.is_some(),
        vulnerabilities_found: result.vulnerabilities.len(),
        risk_score: result.risk_score,
        scan_duration: result.scan_duration,
        summary,
        vulnerabilities: result.vulnerabilities.into_iter().take(preview_limit).collect(),
        recommendations,
        diagnostics: result.diagnostics,
        target_url: result.target_url,
    }
}

pub fn dns_response(
    result: DnsScanResult,
    analysis_id: Option<Uuid>,
    recommendations: Vec<String>,
    preview_limit: usize,
) -> DnsScanResponse {
    info!(domain = %result.domain, persisted = analysis_id.is_some(), "DNS analysis response ready.");
    DnsScanResponse {
        success: true,
        analysis_id,
        persisted: analysis_id.is_some(),
        vulnerabilities_found: result.vulnerabilities.len(),
        risk_score: result.risk_score,
        analysis_duration: result.analysis_duration,
        dns_records: result.dns_records.len(),
        security_features: result.security_features,
        nameservers: result.nameservers.len(),
        summary: SeveritySummary::from_findings(&result.vulnerabilities),
        vulnerabilities: result.vulnerabilities.into_iter().take(preview_limit).collect(),
        recommendations,
        diagnostics: result.diagnostics,
        domain: result.domain,
    }
}
