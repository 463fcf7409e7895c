// src/core/scanner/content_scanner.rs

//! Pattern checks over the landing page body: inline script sinks, forms
//! without anti-forgery tokens and credentials left in the markup.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};

use super::context::WebContext;
use super::{Analyzer, AnalyzerOutput};
use crate::core::errors::ScanError;
use crate::core::knowledge_base::{OWASP_BROKEN_ACCESS_CONTROL, OWASP_INJECTION, OWASP_LOGGING_FAILURES};
use crate::core::models::{Finding, FindingKind, Severity, WebStats};

const XSS_PROOF_CHARS: usize = 100;
const FORM_PROOF_CHARS: usize = 200;

static XSS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)<script[^>]*>.*?</script>",
        r"(?i)javascript:",
        r"(?i)\bon[a-z]+\s*=",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static RE_FORM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<form[^>]*>.*?</form>").unwrap());

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)password\s*[:=]\s*['"][^'"]+['"]"#,
        r#"(?i)api[_-]?key\s*[:=]\s*['"][^'"]+['"]"#,
        r#"(?i)secret\s*[:=]\s*['"][^'"]+['"]"#,
        r#"(?i)token\s*[:=]\s*['"][^'"]+['"]"#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static INPUT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("input").unwrap());

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Keeps the first three characters of the quoted value.
fn mask_secret(matched: &str) -> String {
    let Some(open) = matched.find(['\'', '"']) else {
        return matched.to_string();
    };
    let (key, value) = matched.split_at(open + 1);
    let kept: String = value.chars().take(3).collect();
    format!("{key}{kept}***")
}

fn xss_findings(body: &str) -> Vec<Finding> {
    XSS_PATTERNS
        .iter()
        .filter_map(|pattern| pattern.find(body))
        .map(|m| {
            Finding::new(
                FindingKind::PotentialXss,
                Severity::Medium,
                "Potential XSS vulnerability detected in page content",
                "Page Content",
                "Implement proper input sanitization and output encoding",
            )
            .with_proof(truncate_chars(m.as_str(), XSS_PROOF_CHARS))
            .with_category(OWASP_INJECTION)
        })
        .collect()
}

/// Inputs are only counted inside matched form blocks.
fn form_findings(body: &str) -> (Vec<Finding>, u32, u32) {
    let mut findings = Vec::new();
    let mut forms = 0;
    let mut inputs = 0;
    for form in RE_FORM.find_iter(body) {
        forms += 1;
        inputs += count_inputs(form.as_str());
        if !form.as_str().contains("csrf") && !form.as_str().contains("token") {
            findings.push(
                Finding::new(
                    FindingKind::MissingCsrfProtection,
                    Severity::Medium,
                    "Form without CSRF protection detected",
                    "HTML Forms",
                    "Implement CSRF tokens for all forms",
                )
                .with_proof(truncate_chars(form.as_str(), FORM_PROOF_CHARS))
                .with_category(OWASP_BROKEN_ACCESS_CONTROL),
            );
        }
    }
    (findings, forms, inputs)
}

fn secret_findings(body: &str) -> Vec<Finding> {
    SECRET_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.find_iter(body))
        .map(|m| {
            Finding::new(
                FindingKind::InformationDisclosure,
                Severity::High,
                "Sensitive information exposed in page source",
                "Page Source",
                "Remove sensitive information from client-side code",
            )
            .with_proof(mask_secret(m.as_str()))
            .with_category(OWASP_LOGGING_FAILURES)
        })
        .collect()
}

fn count_inputs(body: &str) -> u32 {
    Html::parse_fragment(body).select(&INPUT_SELECTOR).count() as u32
}

/// Runs every content check against one page body.
pub fn analyze_content(body: &str) -> (Vec<Finding>, WebStats) {
    let mut findings = xss_findings(body);
    let (form_issues, forms_found, inputs_tested) = form_findings(body);
    findings.extend(form_issues);
    findings.extend(secret_findings(body));

    let stats = WebStats {
        pages_scanned: 1,
        forms_found,
        inputs_tested,
        ..Default::default()
    };
    (findings, stats)
}

pub struct ContentAnalyzer;

#[async_trait]
impl Analyzer<WebContext> for ContentAnalyzer {
    fn name(&self) -> &'static str {
        "content"
    }

    async fn analyze(&self, ctx: &WebContext) -> Result<AnalyzerOutput, ScanError> {
        let page = ctx.landing_page().await?;
        debug!(bytes = page.body.len(), depth = ctx.scan_depth, "Scanning page content.");
        let (findings, stats) = analyze_content(&page.body);
        info!(findings = findings.len(), forms = stats.forms_found, inputs = stats.inputs_tested, "Content scan finished.");
        Ok(AnalyzerOutput::findings(findings).with_stats(stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_xss_pattern_reports_once() {
        let body = r#"<script>a()</script><script>b()</script><a href="javascript:void(0)" onclick="x()">"#;
        let findings = xss_findings(body);
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].proof_of_concept.as_deref(), Some("<script>a()</script>"));
        assert!(findings.iter().all(|f| f.severity == Severity::Medium));
    }

    #[test]
    fn xss_proof_is_truncated() {
        let body = format!("<script>{}</script>", "x".repeat(500));
        let findings = xss_findings(&body);
        assert_eq!(findings[0].proof_of_concept.as_ref().map(|p| p.chars().count()), Some(XSS_PROOF_CHARS));
    }

    #[test]
    fn plain_words_are_not_event_handlers() {
        assert!(xss_findings("<p>money = online</p>").is_empty());
    }

    #[test]
    fn forms_without_tokens_are_flagged() {
        let body = r#"
            <form action="/login"><input name="user"><input name="pass"></form>
            <form action="/pay"><input type="hidden" name="csrf_token" value="x"></form>
        "#;
        let (findings, forms, inputs) = form_findings(body);
        assert_eq!(forms, 2);
        assert_eq!(inputs, 3);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].proof_of_concept.as_deref().unwrap().contains("/login"));
    }

    #[test]
    fn secrets_are_reported_per_match_and_masked() {
        let body = r#"var password = "hunter2"; var api_key='abcdef123';"#;
        let findings = secret_findings(body);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.severity == Severity::High));
        assert!(findings.iter().all(|f| f.category.as_deref() == Some(OWASP_LOGGING_FAILURES)));
        assert_eq!(findings[0].proof_of_concept.as_deref(), Some(r#"password = "hun***"#));
    }

    #[test]
    fn stats_count_forms_and_inputs() {
        let body = r#"<form><input name="a"><input name="b"><input name="csrf"></form><input name="q">"#;
        let (_, stats) = analyze_content(body);
        assert_eq!(stats.pages_scanned, 1);
        assert_eq!(stats.forms_found, 1);
        assert_eq!(stats.inputs_tested, 3);
    }

    #[test]
    fn inputs_outside_forms_are_not_counted() {
        let (_, stats) = analyze_content(r#"<input name="search"><form><input name="a"></form>"#);
        assert_eq!(stats.inputs_tested, 1);
    }

    #[test]
    fn inline_script_scores_as_medium() {
        let (findings, _) = analyze_content("<script>alert(1)</script>");
        let xss = findings.iter().find(|f| f.kind == FindingKind::PotentialXss).unwrap();
        assert_eq!(xss.severity, Severity::Medium);
    }

    #[test]
    fn token_match_is_case_sensitive() {
        let (findings, _, _) = form_findings(r#"<form><input name="CSRF"></form>"#);
        assert_eq!(findings.len(), 1);
        let (findings, _, _) = form_findings(r#"<form><input name="csrf"></form>"#);
        assert!(findings.is_empty());
    }

    #[test]
    fn clean_page_has_no_findings() {
        let (findings, _) = analyze_content("<html><body><h1>Hello</h1></body></html>");
        assert!(findings.is_empty());
    }
}
