// src/core/knowledge_base.rs

//! Static, read-only advice tables.
//!
//! Holds the OWASP Top-10 (2021) labels attached to web findings and the fixed
//! advisory strings the recommendation generator picks from.

use crate::core::models::{Finding, FindingKind, SecurityFeatureSet};
use std::collections::HashSet;

// --- OWASP Top 10 (2021) ---

pub const OWASP_BROKEN_ACCESS_CONTROL: &str = "A01:2021 – Broken Access Control";
pub const OWASP_CRYPTOGRAPHIC_FAILURES: &str = "A02:2021 – Cryptographic Failures";
pub const OWASP_INJECTION: &str = "A03:2021 – Injection";
pub const OWASP_SECURITY_MISCONFIGURATION: &str = "A05:2021 – Security Misconfiguration";
pub const OWASP_LOGGING_FAILURES: &str = "A09:2021 – Security Logging and Monitoring Failures";

// --- Advisories ---

/// One advisory emitted when a finding of `kind` is present.
struct KindAdvice {
    kind: FindingKind,
    advice: &'static str,
}

/// Web advisories, checked in this order.
static WEB_ADVICE: &[KindAdvice] = &[
    KindAdvice {
        kind: FindingKind::SqlInjection,
        advice: "Implement parameterized queries and input validation to prevent SQL injection",
    },
    KindAdvice {
        kind: FindingKind::PotentialXss,
        advice: "Implement proper output encoding and Content Security Policy to prevent XSS",
    },
    KindAdvice {
        kind: FindingKind::MissingSecurityHeader,
        advice: "Configure all recommended security headers (CSP, HSTS, X-Frame-Options, etc.)",
    },
    KindAdvice {
        kind: FindingKind::InsecureCookie,
        advice: "Configure cookies with Secure, HttpOnly, and SameSite attributes",
    },
    KindAdvice {
        kind: FindingKind::MissingCsrfProtection,
        advice: "Implement CSRF tokens in all state-changing forms",
    },
];

const WEB_ALL_CLEAR: &str =
    "Continue monitoring for new vulnerabilities and keep security measures up to date";

/// DNS advisories triggered by specific finding kinds, checked after the
/// feature-gap advisories.
static DNS_ADVICE: &[KindAdvice] = &[
    KindAdvice {
        kind: FindingKind::ZoneTransferAllowed,
        advice: "Restrict DNS zone transfers to authorized servers only",
    },
    KindAdvice {
        kind: FindingKind::MultipleSpfRecords,
        advice: "Consolidate multiple SPF records into a single record",
    },
    KindAdvice {
        kind: FindingKind::WeakSpfPolicy,
        advice: "Replace '+all' in the SPF record with '~all' or '-all'",
    },
];

/// One advisory per security feature, paired with whether it is enabled.
fn feature_advice(features: &SecurityFeatureSet) -> [(bool, &'static str); 5] {
    [
        (features.dnssec_enabled, "Enable DNSSEC to protect against DNS spoofing and cache poisoning"),
        (features.spf_configured, "Configure SPF records to prevent email spoofing"),
        (features.dmarc_configured, "Implement DMARC policy for email authentication enforcement"),
        (features.dkim_configured, "Set up DKIM signing for email authentication"),
        (features.caa_configured, "Configure CAA records to control certificate issuance"),
    ]
}

const DNS_ALL_CLEAR: &str = "DNS configuration appears secure, continue monitoring for changes";

fn kinds(findings: &[Finding]) -> HashSet<FindingKind> {
    findings.iter().map(|f| f.kind).collect()
}

fn kind_advice<'a>(table: &'a [KindAdvice], present: &'a HashSet<FindingKind>) -> impl Iterator<Item = String> + 'a {
    table
        .iter()
        .filter(|entry| present.contains(&entry.kind))
        .map(|entry| entry.advice.to_string())
}

/// Maps the distinct finding kinds of a web scan to advisories.
pub fn web_recommendations(findings: &[Finding]) -> Vec<String> {
    let present = kinds(findings);
    let advice: Vec<String> = kind_advice(WEB_ADVICE, &present).collect();
    if advice.is_empty() {
        vec![WEB_ALL_CLEAR.to_string()]
    } else {
        advice
    }
}

/// Feature gaps first, then kind-triggered advisories.
pub fn dns_recommendations(findings: &[Finding], features: &SecurityFeatureSet) -> Vec<String> {
    let present = kinds(findings);
    let advice: Vec<String> = feature_advice(features)
        .into_iter()
        .filter(|(enabled, _)| !enabled)
        .map(|(_, text)| text.to_string())
        .chain(kind_advice(DNS_ADVICE, &present))
        .collect();
    if advice.is_empty() {
        vec![DNS_ALL_CLEAR.to_string()]
    } else {
        advice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Severity;

    fn finding(kind: FindingKind) -> Finding {
        Finding::new(kind, Severity::Medium, "", "", "")
    }

    #[test]
    fn web_advice_is_deduplicated_and_ordered_by_table() {
        let findings = vec![
            finding(FindingKind::InsecureCookie),
            finding(FindingKind::InsecureCookie),
            finding(FindingKind::SqlInjection),
        ];
        let recs = web_recommendations(&findings);
        assert_eq!(recs.len(), 2);
        assert!(recs[0].contains("SQL injection"));
        assert!(recs[1].contains("cookies"));
    }

    #[test]
    fn web_without_triggers_gets_monitoring_advice() {
        assert_eq!(web_recommendations(&[]), vec![WEB_ALL_CLEAR.to_string()]);
        assert_eq!(
            web_recommendations(&[finding(FindingKind::InsecureProtocol)]),
            vec![WEB_ALL_CLEAR.to_string()]
        );
    }

    #[test]
    fn dns_lists_every_missing_feature() {
        let recs = dns_recommendations(&[], &SecurityFeatureSet::default());
        assert_eq!(recs.len(), 5);
        assert!(recs[0].contains("DNSSEC"));
    }

    #[test]
    fn dns_adds_kind_advice_after_features() {
        let features = SecurityFeatureSet { dnssec_enabled: true, ..Default::default() };
        let recs = dns_recommendations(&[finding(FindingKind::ZoneTransferAllowed)], &features);
        assert_eq!(recs.len(), 5);
        assert_eq!(recs.last().unwrap(), "Restrict DNS zone transfers to authorized servers only");
    }

    #[test]
    fn dns_fully_configured_gets_all_clear() {
        let features = SecurityFeatureSet {
            dnssec_enabled: true,
            spf_configured: true,
            dkim_configured: true,
            dmarc_configured: true,
            caa_configured: true,
        };
        assert_eq!(dns_recommendations(&[], &features), vec![DNS_ALL_CLEAR.to_string()]);
    }
}
