// src/core/models.rs

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};
use uuid::Uuid;

// --- Finding Taxonomy ---

/// Severity of a single finding. Ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
    Display, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Points contributed to the risk score by one finding of this severity.
    pub const fn weight(self) -> u32 {
        match self {
            Severity::Critical => 25,
            Severity::High => 15,
            Severity::Medium => 8,
            Severity::Low => 3,
        }
    }
}

/// The `type` tag of a finding. Several findings may share one kind
/// (e.g. one `InsecureCookie` per offending cookie flag).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum FindingKind {
    // Web
    #[serde(rename = "Information Disclosure")]
    #[strum(serialize = "Information Disclosure")]
    InformationDisclosure,
    #[serde(rename = "Insecure Cookie")]
    #[strum(serialize = "Insecure Cookie")]
    InsecureCookie,
    #[serde(rename = "Missing Security Header")]
    #[strum(serialize = "Missing Security Header")]
    MissingSecurityHeader,
    #[serde(rename = "Weak Content Security Policy")]
    #[strum(serialize = "Weak Content Security Policy")]
    WeakContentSecurityPolicy,
    #[serde(rename = "Insecure Protocol")]
    #[strum(serialize = "Insecure Protocol")]
    InsecureProtocol,
    #[serde(rename = "Invalid Certificate")]
    #[strum(serialize = "Invalid Certificate")]
    InvalidCertificate,
    #[serde(rename = "Certificate Expiring Soon")]
    #[strum(serialize = "Certificate Expiring Soon")]
    CertificateExpiringSoon,
    #[serde(rename = "TLS Handshake Failed")]
    #[strum(serialize = "TLS Handshake Failed")]
    TlsHandshakeFailed,
    #[serde(rename = "Weak Protocol Support")]
    #[strum(serialize = "Weak Protocol Support")]
    WeakProtocolSupport,
    #[serde(rename = "Potential XSS")]
    #[strum(serialize = "Potential XSS")]
    PotentialXss,
    #[serde(rename = "Missing CSRF Protection")]
    #[strum(serialize = "Missing CSRF Protection")]
    MissingCsrfProtection,
    #[serde(rename = "SQL Injection")]
    #[strum(serialize = "SQL Injection")]
    SqlInjection,
    #[serde(rename = "Directory Traversal")]
    #[strum(serialize = "Directory Traversal")]
    DirectoryTraversal,
    #[serde(rename = "Sensitive Directory/File Exposure")]
    #[strum(serialize = "Sensitive Directory/File Exposure")]
    SensitivePathExposure,

    // DNS
    #[serde(rename = "DNSSEC Not Configured")]
    #[strum(serialize = "DNSSEC Not Configured")]
    DnssecNotConfigured,
    #[serde(rename = "Missing SPF Record")]
    #[strum(serialize = "Missing SPF Record")]
    MissingSpfRecord,
    #[serde(rename = "Multiple SPF Records")]
    #[strum(serialize = "Multiple SPF Records")]
    MultipleSpfRecords,
    #[serde(rename = "Weak SPF Policy")]
    #[strum(serialize = "Weak SPF Policy")]
    WeakSpfPolicy,
    #[serde(rename = "Missing DMARC Record")]
    #[strum(serialize = "Missing DMARC Record")]
    MissingDmarcRecord,
    #[serde(rename = "Weak DMARC Policy")]
    #[strum(serialize = "Weak DMARC Policy")]
    WeakDmarcPolicy,
    #[serde(rename = "Wildcard DNS Records")]
    #[strum(serialize = "Wildcard DNS Records")]
    WildcardDnsRecords,
    #[serde(rename = "High TTL Values")]
    #[strum(serialize = "High TTL Values")]
    HighTtlValues,
    #[serde(rename = "Insufficient Nameserver Redundancy")]
    #[strum(serialize = "Insufficient Nameserver Redundancy")]
    InsufficientNameserverRedundancy,
    #[serde(rename = "Zone Transfer Allowed")]
    #[strum(serialize = "Zone Transfer Allowed")]
    ZoneTransferAllowed,
    #[serde(rename = "DNS Response Inconsistency")]
    #[strum(serialize = "DNS Response Inconsistency")]
    DnsResponseInconsistency,
}

/// One detected issue. Built by an analyzer and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub severity: Severity,
    pub description: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_of_concept: Option<String>,
    pub remediation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Finding {
    pub fn new(
        kind: FindingKind,
        severity: Severity,
        description: impl Into<String>,
        location: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            location: location.into(),
            proof_of_concept: None,
            remediation: remediation.into(),
            category: None,
        }
    }

    pub fn with_proof(self, proof: impl Into<String>) -> Self {
        Self { proof_of_concept: Some(proof.into()), ..self }
    }

    pub fn with_category(self, category: &str) -> Self {
        Self { category: Some(category.to_string()), ..self }
    }
}

/// Marks which pipeline produced a scan record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanKind {
    WebApplication,
    DnsSecurity,
}

/// Records an analyzer (or lookup) that degraded to an empty result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzerDiagnostic {
    pub analyzer: String,
    pub error: String,
}

// --- Web Scan Models ---

/// Counters accumulated by the web analyzers. Each analyzer reports only the
/// counters it owns; the orchestrator sums them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebStats {
    pub pages_scanned: u32,
    pub forms_found: u32,
    pub inputs_tested: u32,
    pub cookies_analyzed: u32,
    pub headers_checked: u32,
}

impl WebStats {
    pub fn merge(self, other: WebStats) -> WebStats {
        WebStats {
            pages_scanned: self.pages_scanned + other.pages_scanned,
            forms_found: self.forms_found + other.forms_found,
            inputs_tested: self.inputs_tested + other.inputs_tested,
            cookies_analyzed: self.cookies_analyzed + other.cookies_analyzed,
            headers_checked: self.headers_checked + other.headers_checked,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebScanResult {
    pub target_url: String,
    pub vulnerabilities: Vec<Finding>,
    #[serde(flatten)]
    pub stats: WebStats,
    /// Whole seconds from the first to the last analyzer.
    pub scan_duration: u64,
    pub risk_score: u8,
    #[serde(default)]
    pub diagnostics: Vec<AnalyzerDiagnostic>,
}

// --- DNS Scan Models ---

/// A raw resolver answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

/// Security mechanisms detected for a domain. Derived, never persisted on its own.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityFeatureSet {
    pub dnssec_enabled: bool,
    pub spf_configured: bool,
    pub dkim_configured: bool,
    pub dmarc_configured: bool,
    pub caa_configured: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsScanResult {
    pub domain: String,
    pub dns_records: Vec<DnsRecord>,
    pub vulnerabilities: Vec<Finding>,
    pub security_features: SecurityFeatureSet,
    pub nameservers: Vec<String>,
    pub analysis_duration: u64,
    pub risk_score: u8,
    #[serde(default)]
    pub diagnostics: Vec<AnalyzerDiagnostic>,
}

// --- Requests ---

/// Missing fields deserialize as empty strings so the validator can reject
/// them with a proper `InvalidInput` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebScanRequest {
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub scan_depth: Option<u32>,
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsScanRequest {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub user_id: String,
}

// --- Responses ---

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeveritySummary {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeveritySummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count();
        Severity::iter().fold(Self::default(), |summary, severity| match severity {
            Severity::Critical => Self { critical: count(severity), ..summary },
            Severity::High => Self { high: count(severity), ..summary },
            Severity::Medium => Self { medium: count(severity), ..summary },
            Severity::Low => Self { low: count(severity), ..summary },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSummary {
    pub pages_scanned: u32,
    pub forms_found: u32,
    pub inputs_tested: u32,
    #[serde(flatten)]
    pub severities: SeveritySummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebScanResponse {
    pub success: bool,
    pub scan_id: Option<Uuid>,
    pub persisted: bool,
    pub target_url: String,
    pub vulnerabilities_found: usize,
    pub risk_score: u8,
    pub scan_duration: u64,
    pub summary: WebSummary,
    pub vulnerabilities: Vec<Finding>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<AnalyzerDiagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsScanResponse {
    pub success: bool,
    pub analysis_id: Option<Uuid>,
    pub persisted: bool,
    pub domain: String,
    pub vulnerabilities_found: usize,
    pub risk_score: u8,
    pub analysis_duration: u64,
    pub dns_records: usize,
    pub security_features: SecurityFeatureSet,
    pub nameservers: usize,
    pub summary: SeveritySummary,
    pub vulnerabilities: Vec<Finding>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<AnalyzerDiagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_weights_are_strictly_ordered() {
        assert!(Severity::Critical.weight() > Severity::High.weight());
        assert!(Severity::High.weight() > Severity::Medium.weight());
        assert!(Severity::Medium.weight() > Severity::Low.weight());
        assert_eq!(
            [Severity::Critical, Severity::High, Severity::Medium, Severity::Low].map(Severity::weight),
            [25, 15, 8, 3]
        );
    }

    #[test]
    fn finding_serializes_with_type_tag_and_lowercase_severity() {
        let finding = Finding::new(
            FindingKind::MultipleSpfRecords,
            Severity::High,
            "two records",
            "TXT Records",
            "merge them",
        )
        .with_proof("a, b");

        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["type"], "Multiple SPF Records");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["proof_of_concept"], "a, b");
        assert!(json.get("category").is_none());
    }

    #[test]
    fn summary_counts_each_severity() {
        let f = |severity| Finding::new(FindingKind::InsecureCookie, severity, "", "", "");
        let findings = vec![f(Severity::Low), f(Severity::Low), f(Severity::High), f(Severity::Critical)];
        let summary = SeveritySummary::from_findings(&findings);
        assert_eq!(summary, SeveritySummary { critical: 1, high: 1, medium: 0, low: 2 });
    }

    #[test]
    fn web_request_tolerates_missing_fields() {
        let request: WebScanRequest = serde_json::from_str(r#"{"target_url":"https://a.test"}"#).unwrap();
        assert_eq!(request.user_id, "");
        assert_eq!(request.scan_depth, None);
    }
}
