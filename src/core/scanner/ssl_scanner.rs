// src/core/scanner/ssl_scanner.rs

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::context::WebContext;
use super::{Analyzer, AnalyzerOutput};
use crate::core::errors::ScanError;
use crate::core::knowledge_base::OWASP_CRYPTOGRAPHIC_FAILURES;
use crate::core::models::{Finding, FindingKind, Severity};
use chrono::{DateTime, Utc};
use native_tls::{Protocol, TlsConnector};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tokio::task::spawn_blocking;
use url::Url;
use x509_parser::prelude::*;

const EXPIRY_WARNING_DAYS: i64 = 30;
const EXPIRY_CRITICAL_DAYS: i64 = 7;

// --- Protocol ---

/// Any scheme other than `https` transmits data in clear text.
pub fn analyze_protocol(url: &Url) -> Vec<Finding> {
    if url.scheme() == "https" {
        return Vec::new();
    }
    debug!(scheme = url.scheme(), "Target is not served over HTTPS.");
    vec![Finding::new(
        FindingKind::InsecureProtocol,
        Severity::High,
        "Website not using HTTPS encryption",
        "Protocol",
        "Implement HTTPS with valid SSL/TLS certificate",
    )
    .with_proof(format!("URL: {url}"))
    .with_category(OWASP_CRYPTOGRAPHIC_FAILURES)]
}

pub struct ProtocolAnalyzer;

#[async_trait]
impl Analyzer<WebContext> for ProtocolAnalyzer {
    fn name(&self) -> &'static str {
        "protocol"
    }

    async fn analyze(&self, ctx: &WebContext) -> Result<AnalyzerOutput, ScanError> {
        Ok(AnalyzerOutput::findings(analyze_protocol(&ctx.target)))
    }
}

// --- Certificate ---

#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// What the TLS handshake against the target produced.
#[derive(Debug, Clone)]
pub enum TlsObservation {
    Certificate(CertificateInfo),
    NoCertificate,
    /// TCP connected but the handshake failed, usually an untrusted or
    /// mismatched certificate.
    HandshakeRejected(String),
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, ScanError> {
    let tls_error = |reason: String| ScanError::Tls { host: host.to_string(), reason };

    debug!(host, port, "Connecting TCP stream.");
    let address = (host, port)
        .to_socket_addrs()
        .map_err(|e| tls_error(format!("Address resolution failed: {e}")))?
        .next()
        .ok_or_else(|| tls_error("No address found".to_string()))?;
    let stream = TcpStream::connect_timeout(&address, timeout)
        .map_err(|e| tls_error(format!("TCP Connection Error: {e}")))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| tls_error(format!("Socket configuration failed: {e}")))?;
    Ok(stream)
}

/// Blocking handshake. Runs on the blocking pool.
fn perform_tls_handshake(host: &str, port: u16, timeout: Duration) -> Result<TlsObservation, ScanError> {
    let tls_error = |reason: String| ScanError::Tls { host: host.to_string(), reason };

    let connector = TlsConnector::new().map_err(|e| {
        error!(error = %e, "Failed to create TlsConnector");
        tls_error(format!("TlsConnector Error: {e}"))
    })?;
    let stream = connect_tcp(host, port, timeout)?;

    debug!(host, "Performing TLS handshake.");
    let stream = match connector.connect(host, stream) {
        Ok(stream) => stream,
        Err(e) => {
            info!(host, error = %e, "TLS handshake rejected.");
            return Ok(TlsObservation::HandshakeRejected(e.to_string()));
        }
    };

    let cert = match stream.peer_certificate() {
        Ok(Some(c)) => c,
        Ok(None) => {
            debug!("TLS connection successful, but no peer certificate provided.");
            return Ok(TlsObservation::NoCertificate);
        }
        Err(e) => return Err(tls_error(format!("Could not get peer certificate: {e}"))),
    };

    let cert_der = cert
        .to_der()
        .map_err(|e| tls_error(format!("Could not convert certificate to DER: {e}")))?;
    let (_, x509) =
        parse_x509_certificate(&cert_der).map_err(|e| tls_error(format!("X.509 Parse Error: {e}")))?;

    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");
    let validity = x509.validity();
    Ok(TlsObservation::Certificate(CertificateInfo {
        subject: x509.subject().to_string(),
        issuer: x509.issuer().to_string(),
        not_before: asn1_time_to_chrono_utc(&validity.not_before),
        not_after: asn1_time_to_chrono_utc(&validity.not_after),
    }))
}

/// Blocking. Whether the server completes a handshake pinned to TLS 1.0.
/// Certificate checks are off; only the protocol is under test.
fn accepts_tls10(host: &str, port: u16, timeout: Duration) -> Result<bool, ScanError> {
    let connector = TlsConnector::builder()
        .min_protocol_version(Some(Protocol::Tlsv10))
        .max_protocol_version(Some(Protocol::Tlsv10))
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| ScanError::Tls { host: host.to_string(), reason: format!("TlsConnector Error: {e}") })?;
    let stream = connect_tcp(host, port, timeout)?;
    match connector.connect(host, stream) {
        Ok(_) => Ok(true),
        Err(e) => {
            debug!(host, error = %e, "TLS 1.0 handshake refused.");
            Ok(false)
        }
    }
}

pub fn analyze_protocol_support(host: &str, tls10_accepted: bool) -> Vec<Finding> {
    if !tls10_accepted {
        return Vec::new();
    }
    vec![Finding::new(
        FindingKind::WeakProtocolSupport,
        Severity::Medium,
        "Supports weak protocol: TLS 1.0",
        format!("TLS endpoint {host}"),
        "Disable SSL and TLS 1.0; require TLS 1.2 or newer",
    )
    .with_proof("TLS 1.0 handshake accepted")
    .with_category(OWASP_CRYPTOGRAPHIC_FAILURES)]
}

/// Turns a handshake observation into findings, relative to `now`.
pub fn analyze_certificate(host: &str, observation: &TlsObservation, now: DateTime<Utc>) -> Vec<Finding> {
    let location = format!("TLS certificate for {host}");
    let finding = |kind, severity, description: String, remediation: &str, proof: String| {
        Finding::new(kind, severity, description, location.clone(), remediation)
            .with_proof(proof)
            .with_category(OWASP_CRYPTOGRAPHIC_FAILURES)
    };

    match observation {
        TlsObservation::HandshakeRejected(reason) => vec![finding(
            FindingKind::TlsHandshakeFailed,
            Severity::High,
            "TLS handshake failed; the certificate is not trusted by standard clients".to_string(),
            "Install a certificate issued by a trusted CA that matches the host name",
            reason.clone(),
        )],
        TlsObservation::NoCertificate => Vec::new(),
        TlsObservation::Certificate(cert) => {
            let window = format!("valid {} to {} ({})", cert.not_before, cert.not_after, cert.subject);
            if now < cert.not_before || now > cert.not_after {
                return vec![finding(
                    FindingKind::InvalidCertificate,
                    Severity::High,
                    "Certificate is outside its validity period".to_string(),
                    "Renew the certificate and deploy it to all endpoints",
                    window,
                )];
            }
            let days_left = cert.not_after.signed_duration_since(now).num_days();
            if days_left <= EXPIRY_WARNING_DAYS {
                debug!(days_left, "Certificate is expiring soon.");
                let severity = if days_left < EXPIRY_CRITICAL_DAYS { Severity::High } else { Severity::Medium };
                return vec![finding(
                    FindingKind::CertificateExpiringSoon,
                    severity,
                    format!("Certificate expires in {days_left} days"),
                    "Renew the certificate and automate renewal",
                    window,
                )];
            }
            Vec::new()
        }
    }
}

/// Inspects the leaf certificate of `https` targets.
pub struct CertificateAnalyzer;

#[async_trait]
impl Analyzer<WebContext> for CertificateAnalyzer {
    fn name(&self) -> &'static str {
        "certificate"
    }

    async fn analyze(&self, ctx: &WebContext) -> Result<AnalyzerOutput, ScanError> {
        let target = &ctx.target;
        let Some(host) = target.host_str().filter(|_| target.scheme() == "https") else {
            return Ok(AnalyzerOutput::default());
        };
        let host = host.to_string();
        let port = target.port_or_known_default().unwrap_or(443);
        let timeout = ctx.prober.probe_timeout();
        ctx.prober.pace(&host).await?;

        info!(target = %host, port, "Starting TLS certificate inspection.");
        let handshake_host = host.clone();
        let observation = spawn_blocking(move || perform_tls_handshake(&handshake_host, port, timeout))
            .await
            .map_err(|e| {
                error!(panic = %e, "Blocking TLS task panicked!");
                ScanError::Internal(format!("TLS task failed: {e}"))
            })??;
        let mut findings = analyze_certificate(&host, &observation, Utc::now());

        ctx.prober.pace(&host).await?;
        let legacy_host = host.clone();
        match spawn_blocking(move || accepts_tls10(&legacy_host, port, timeout)).await {
            Ok(Ok(accepted)) => findings.extend(analyze_protocol_support(&host, accepted)),
            Ok(Err(e)) => debug!(target = %host, error = %e, "TLS 1.0 check skipped."),
            Err(e) => error!(panic = %e, "Blocking TLS task panicked!"),
        }

        info!(findings = findings.len(), "TLS certificate inspection finished.");
        Ok(AnalyzerOutput::findings(findings))
    }
}
