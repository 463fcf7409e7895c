// src/core/scanner/headers_scanner.rs

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_SECURITY_POLICY};
use tracing::{debug, info, warn};

use super::context::WebContext;
use super::{Analyzer, AnalyzerOutput};
use crate::core::errors::ScanError;
use crate::core::knowledge_base::OWASP_SECURITY_MISCONFIGURATION;
use crate::core::models::{Finding, FindingKind, Severity, WebStats};

/// Headers that reveal server software, with the finding text for each.
const DISCLOSURE_HEADERS: &[(&str, &str, &str)] = &[
    (
        "Server",
        "Server version information disclosed in headers",
        "Configure server to hide version information",
    ),
    (
        "X-Powered-By",
        "Technology stack information disclosed",
        "Remove or obfuscate X-Powered-By header",
    ),
];

struct SecurityHeaderRule {
    name: &'static str,
    severity: Severity,
    purpose: &'static str,
}

/// Security headers every response is expected to carry.
static SECURITY_HEADERS: &[SecurityHeaderRule] = &[
    SecurityHeaderRule { name: "X-Frame-Options", severity: Severity::Medium, purpose: "Clickjacking protection" },
    SecurityHeaderRule { name: "X-XSS-Protection", severity: Severity::Low, purpose: "XSS filter" },
    SecurityHeaderRule { name: "X-Content-Type-Options", severity: Severity::Low, purpose: "MIME type sniffing protection" },
    SecurityHeaderRule { name: "Strict-Transport-Security", severity: Severity::High, purpose: "HTTPS enforcement" },
    SecurityHeaderRule { name: "Content-Security-Policy", severity: Severity::High, purpose: "XSS and injection protection" },
    SecurityHeaderRule { name: "Referrer-Policy", severity: Severity::Low, purpose: "Referrer information control" },
];

const UNSAFE_CSP_SOURCES: &[&str] = &["unsafe-inline", "unsafe-eval"];

/// Reads a header as text.
///
/// # Returns
/// `Some(value)` when present. A value that is not valid UTF-8 is reported as
/// a placeholder so that its presence is still visible to the caller.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    match value.to_str() {
        Ok(s) => {
            debug!(header_name = name, value = s, "Header found.");
            Some(s.to_string())
        }
        Err(_) => {
            warn!(header_name = name, "Header found but contained invalid UTF-8.");
            Some("[Invalid UTF-8]".to_string())
        }
    }
}

// --- Information disclosure ---

/// Flags response headers that advertise server software or the framework stack.
pub fn analyze_disclosure(headers: &HeaderMap) -> Vec<Finding> {
    DISCLOSURE_HEADERS
        .iter()
        .filter_map(|(name, description, remediation)| {
            let value = header_value(headers, name)?;
            Some(
                Finding::new(FindingKind::InformationDisclosure, Severity::Low, *description, "HTTP Headers", *remediation)
                    .with_proof(format!("{name}: {value}"))
                    .with_category(OWASP_SECURITY_MISCONFIGURATION),
            )
        })
        .collect()
}

pub struct HttpInfoAnalyzer;

#[async_trait]
impl Analyzer<WebContext> for HttpInfoAnalyzer {
    fn name(&self) -> &'static str {
        "http_headers"
    }

    async fn analyze(&self, ctx: &WebContext) -> Result<AnalyzerOutput, ScanError> {
        let page = ctx.landing_page().await?;
        info!(status = page.status, headers = page.headers.len(), "Analyzing response headers.");
        let stats = WebStats { headers_checked: page.headers.len() as u32, ..Default::default() };
        Ok(AnalyzerOutput::findings(analyze_disclosure(&page.headers)).with_stats(stats))
    }
}

// --- Security headers ---

/// Reports each missing security header and a Content-Security-Policy that
/// allows inline or eval'd script.
///
/// An empty header value counts as missing.
pub fn analyze_security_headers(headers: &HeaderMap) -> Vec<Finding> {
    let mut findings: Vec<Finding> = SECURITY_HEADERS
        .iter()
        .filter(|rule| header_value(headers, rule.name).is_none_or(|v| v.trim().is_empty()))
        .map(|rule| {
            debug!(header_name = rule.name, "Security header missing.");
            Finding::new(
                FindingKind::MissingSecurityHeader,
                rule.severity,
                format!("Missing {} header - {}", rule.name, rule.purpose),
                "HTTP Response Headers",
                format!("Add {} header to all responses", rule.name),
            )
            .with_category(OWASP_SECURITY_MISCONFIGURATION)
        })
        .collect();

    if let Some(csp) = header_value(headers, CONTENT_SECURITY_POLICY.as_str()) {
        if UNSAFE_CSP_SOURCES.iter().any(|source| csp.contains(source)) {
            debug!(csp = %csp, "CSP allows unsafe script sources.");
            findings.push(
                Finding::new(
                    FindingKind::WeakContentSecurityPolicy,
                    Severity::Medium,
                    "CSP contains unsafe directives",
                    "Content-Security-Policy header",
                    "Remove unsafe-inline and unsafe-eval from CSP",
                )
                .with_proof(format!("Content-Security-Policy: {csp}"))
                .with_category(OWASP_SECURITY_MISCONFIGURATION),
            );
        }
    }

    findings
}

pub struct SecurityHeaderAnalyzer;

#[async_trait]
impl Analyzer<WebContext> for SecurityHeaderAnalyzer {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    async fn analyze(&self, ctx: &WebContext) -> Result<AnalyzerOutput, ScanError> {
        let page = ctx.landing_page().await?;
        let findings = analyze_security_headers(&page.headers);
        info!(findings = findings.len(), "Security header check finished.");
        Ok(AnalyzerOutput::findings(findings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn hardened() -> HeaderMap {
        headers(&[
            ("x-frame-options", "DENY"),
            ("x-xss-protection", "1; mode=block"),
            ("x-content-type-options", "nosniff"),
            ("strict-transport-security", "max-age=63072000"),
            ("content-security-policy", "default-src 'self'"),
            ("referrer-policy", "no-referrer"),
        ])
    }

    #[test]
    fn server_and_powered_by_are_disclosures() {
        let findings = analyze_disclosure(&headers(&[("server", "Apache/2.4.1"), ("x-powered-by", "PHP/7.4")]));
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.kind == FindingKind::InformationDisclosure && f.severity == Severity::Low));
        assert_eq!(findings[0].proof_of_concept.as_deref(), Some("Server: Apache/2.4.1"));
        assert_eq!(findings[1].proof_of_concept.as_deref(), Some("X-Powered-By: PHP/7.4"));
    }

    #[test]
    fn quiet_headers_disclose_nothing() {
        assert!(analyze_disclosure(&hardened()).is_empty());
    }

    #[test]
    fn all_six_missing_on_bare_response() {
        let findings = analyze_security_headers(&HeaderMap::new());
        assert_eq!(findings.len(), 6);
        let high: Vec<&str> = findings
            .iter()
            .filter(|f| f.severity == Severity::High)
            .map(|f| f.description.as_str())
            .collect();
        assert_eq!(high.len(), 2);
        assert!(high.iter().any(|d| d.contains("Strict-Transport-Security")));
        assert!(high.iter().any(|d| d.contains("Content-Security-Policy")));
    }

    #[test]
    fn hardened_response_passes() {
        assert!(analyze_security_headers(&hardened()).is_empty());
    }

    #[test]
    fn empty_header_counts_as_missing() {
        let mut map = hardened();
        map.insert("referrer-policy", HeaderValue::from_static(""));
        let findings = analyze_security_headers(&map);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].description.contains("Referrer-Policy"));
    }

    #[test]
    fn unsafe_csp_is_weak() {
        let mut map = hardened();
        map.insert("content-security-policy", HeaderValue::from_static("script-src 'self' 'unsafe-inline'"));
        let findings = analyze_security_headers(&map);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::WeakContentSecurityPolicy);
        assert_eq!(findings[0].severity, Severity::Medium);
    }
}
