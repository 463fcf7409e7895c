// src/core/scanner/cookie_scanner.rs

use async_trait::async_trait;
use tracing::{debug, info};

use super::context::WebContext;
use super::{Analyzer, AnalyzerOutput};
use crate::core::errors::ScanError;
use crate::core::knowledge_base::OWASP_SECURITY_MISCONFIGURATION;
use crate::core::models::{Finding, FindingKind, Severity, WebStats};

/// Attribute flags of one `Set-Cookie` header. Attribute names are matched
/// case-insensitively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CookieFlags {
    pub secure: bool,
    pub http_only: bool,
    pub same_site: bool,
}

pub fn cookie_flags(set_cookie: &str) -> CookieFlags {
    set_cookie
        .split(';')
        .skip(1)
        .map(|attr| attr.split('=').next().unwrap_or_default().trim().to_ascii_lowercase())
        .fold(CookieFlags::default(), |flags, attr| match attr.as_str() {
            "secure" => CookieFlags { secure: true, ..flags },
            "httponly" => CookieFlags { http_only: true, ..flags },
            "samesite" => CookieFlags { same_site: true, ..flags },
            _ => flags,
        })
}

/// The cookie with its value masked, so stored proofs do not carry session tokens.
fn redacted(set_cookie: &str) -> String {
    let mut parts = set_cookie.splitn(2, ';');
    let pair = parts.next().unwrap_or_default();
    let name = pair.split('=').next().unwrap_or_default().trim();
    match parts.next() {
        Some(attrs) => format!("{name}=[redacted];{attrs}"),
        None => format!("{name}=[redacted]"),
    }
}

/// One finding per missing flag per cookie.
pub fn analyze_cookies(cookies: &[String]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for cookie in cookies {
        let flags = cookie_flags(cookie);
        debug!(?flags, "Parsed Set-Cookie attributes.");
        let proof = redacted(cookie);

        let missing = [
            (!flags.secure, Severity::Medium, "Cookie without Secure flag", "Add Secure flag to all cookies"),
            (!flags.http_only, Severity::Medium, "Cookie without HttpOnly flag", "Add HttpOnly flag to prevent XSS access"),
            (!flags.same_site, Severity::Low, "Cookie without SameSite attribute", "Add SameSite attribute to prevent CSRF"),
        ];
        for (_, severity, description, remediation) in missing.into_iter().filter(|(absent, ..)| *absent) {
            findings.push(
                Finding::new(FindingKind::InsecureCookie, severity, description, "Set-Cookie header", remediation)
                    .with_proof(proof.clone())
                    .with_category(OWASP_SECURITY_MISCONFIGURATION),
            );
        }
    }
    findings
}

pub struct CookieAnalyzer;

#[async_trait]
impl Analyzer<WebContext> for CookieAnalyzer {
    fn name(&self) -> &'static str {
        "cookies"
    }

    async fn analyze(&self, ctx: &WebContext) -> Result<AnalyzerOutput, ScanError> {
        let page = ctx.landing_page().await?;
        let cookies = page.set_cookies();
        info!(cookies = cookies.len(), "Analyzing cookies.");
        let stats = WebStats { cookies_analyzed: cookies.len() as u32, ..Default::default() };
        Ok(AnalyzerOutput::findings(analyze_cookies(&cookies)).with_stats(stats))
    }
}
