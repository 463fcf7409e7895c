// src/core/scanner/probe_scanner.rs

//! Active probes for common injection flaws, driven by a table of rules.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

use super::context::WebContext;
use super::{Analyzer, AnalyzerOutput};
use crate::core::errors::ScanError;
use crate::core::knowledge_base::{OWASP_BROKEN_ACCESS_CONTROL, OWASP_INJECTION};
use crate::core::models::{Finding, FindingKind, Severity};

static RE_TRAVERSAL_LEAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"root:|\[drivers\]").unwrap());

/// Where a payload is placed in the request.
#[derive(Debug, Clone, Copy)]
pub enum Injection {
    /// Appended as `name=payload` to the target's query string.
    QueryParameter(&'static str),
}

impl Injection {
    pub fn apply(&self, target: &Url, payload: &str) -> Url {
        match self {
            Injection::QueryParameter(name) => {
                let mut url = target.clone();
                url.query_pairs_mut().append_pair(name, payload);
                url
            }
        }
    }
}

/// How a response is judged vulnerable.
#[derive(Debug, Clone, Copy)]
pub enum Detection {
    /// Any of the literal signatures appears in the body.
    BodyContainsAny(&'static [&'static str]),
    BodyMatches(&'static Lazy<Regex>),
}

impl Detection {
    pub fn matches(&self, body: &str) -> bool {
        match self {
            Detection::BodyContainsAny(signatures) => signatures.iter().any(|s| body.contains(s)),
            Detection::BodyMatches(pattern) => pattern.is_match(body),
        }
    }
}

pub struct ProbeRule {
    pub name: &'static str,
    pub kind: FindingKind,
    pub severity: Severity,
    pub description: &'static str,
    pub location: &'static str,
    pub remediation: &'static str,
    pub category: &'static str,
    pub injection: Injection,
    pub payloads: &'static [&'static str],
    pub detection: Detection,
    /// Only probe targets that already carry a query string.
    pub requires_query: bool,
}

impl ProbeRule {
    pub fn applies_to(&self, target: &Url) -> bool {
        !self.requires_query || target.query().is_some_and(|q| !q.is_empty())
    }

    fn finding(&self, probe: &Url) -> Finding {
        Finding::new(self.kind, self.severity, self.description, self.location, self.remediation)
            .with_proof(probe.as_str())
            .with_category(self.category)
    }
}

pub static PROBE_RULES: &[ProbeRule] = &[
    ProbeRule {
        name: "sql_injection",
        kind: FindingKind::SqlInjection,
        severity: Severity::Critical,
        description: "Potential SQL injection vulnerability detected",
        location: "URL Parameters",
        remediation: "Use parameterized queries and input validation",
        category: OWASP_INJECTION,
        injection: Injection::QueryParameter("test"),
        payloads: &["'"],
        detection: Detection::BodyContainsAny(&["SQL", "mysql", "ORA-", "PostgreSQL"]),
        requires_query: true,
    },
    ProbeRule {
        name: "directory_traversal",
        kind: FindingKind::DirectoryTraversal,
        severity: Severity::High,
        description: "Directory traversal vulnerability detected",
        location: "File parameter",
        remediation: "Implement proper file path validation and sanitization",
        category: OWASP_BROKEN_ACCESS_CONTROL,
        injection: Injection::QueryParameter("file"),
        payloads: &["../../../etc/passwd", "..\\..\\..\\windows\\system32\\drivers\\etc\\hosts"],
        detection: Detection::BodyMatches(&RE_TRAVERSAL_LEAK),
        requires_query: false,
    },
];

/// Runs one rule: payloads in order, stopping at the first hit. Individual
/// probe failures count as "not vulnerable".
async fn run_rule(ctx: &WebContext, rule: &ProbeRule) -> Result<Option<Finding>, ScanError> {
    for payload in rule.payloads {
        let probe = rule.injection.apply(&ctx.target, payload);
        match ctx.prober.fetch(&probe).await {
            Ok(page) if rule.detection.matches(&page.body) => {
                info!(rule = rule.name, url = %probe, "Probe signature matched.");
                return Ok(Some(rule.finding(&probe)));
            }
            Ok(_) => debug!(rule = rule.name, url = %probe, "Probe clean."),
            Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
            Err(e) => debug!(rule = rule.name, url = %probe, error = %e, "Probe failed, treating as not vulnerable."),
        }
    }
    Ok(None)
}

pub struct CommonVulnerabilityAnalyzer;

#[async_trait]
impl Analyzer<WebContext> for CommonVulnerabilityAnalyzer {
    fn name(&self) -> &'static str {
        "common_vulnerabilities"
    }

    async fn analyze(&self, ctx: &WebContext) -> Result<AnalyzerOutput, ScanError> {
        let mut findings = Vec::new();
        for rule in PROBE_RULES.iter().filter(|rule| rule.applies_to(&ctx.target)) {
            if let Some(finding) = run_rule(ctx, rule).await? {
                findings.push(finding);
            }
        }
        Ok(AnalyzerOutput::findings(findings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> &'static ProbeRule {
        PROBE_RULES.iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn sql_rule_needs_an_existing_query() {
        let sql = rule("sql_injection");
        assert!(!sql.applies_to(&Url::parse("https://a.test/").unwrap()));
        assert!(!sql.applies_to(&Url::parse("https://a.test/?").unwrap()));
        assert!(sql.applies_to(&Url::parse("https://a.test/?id=1").unwrap()));
        assert!(rule("directory_traversal").applies_to(&Url::parse("https://a.test/").unwrap()));
    }

    #[test]
    fn query_injection_appends_an_encoded_pair() {
        let url = Injection::QueryParameter("test").apply(&Url::parse("https://a.test/p?id=1").unwrap(), "'");
        assert_eq!(url.as_str(), "https://a.test/p?id=1&test=%27");

        let url = Injection::QueryParameter("file").apply(&Url::parse("https://a.test/").unwrap(), "../etc/passwd");
        assert_eq!(url.query(), Some("file=..%2Fetc%2Fpasswd"));
    }

    #[test]
    fn detections_match_their_signatures() {
        let sql = rule("sql_injection");
        assert!(sql.detection.matches("You have an error in your SQL syntax"));
        assert!(sql.detection.matches("ORA-00933: command not properly ended"));
        assert!(!sql.detection.matches("<html>welcome</html>"));

        let traversal = rule("directory_traversal");
        assert!(traversal.detection.matches("root:x:0:0:root:/root:/bin/bash"));
        assert!(traversal.detection.matches("; for 16-bit app support\n[drivers]\nwave=mmdrv.dll"));
        assert!(!traversal.detection.matches("drivers"));
    }
}
