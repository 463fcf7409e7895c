// src/core/scanner/dns_scanner.rs

use async_trait::async_trait;
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use super::context::{CancelToken, Prober};
use super::{join_ordered, Analyzer, AnalyzerOutput};
use crate::core::errors::ScanError;
use crate::core::models::{AnalyzerDiagnostic, DnsRecord, Finding, FindingKind, SecurityFeatureSet, Severity};

/// Record types collected for the apex of every analyzed domain.
pub const ZONE_RECORD_TYPES: [RecordType; 8] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::MX,
    RecordType::NS,
    RecordType::TXT,
    RecordType::CNAME,
    RecordType::SOA,
    RecordType::CAA,
];

/// The one DKIM selector probed. A domain signing with another selector
/// reads as "no DKIM".
pub const DKIM_SELECTOR: &str = "default";

const DNS_JSON: &str = "application/dns-json";
const MAX_TTL_SECS: u32 = 86_400;
const MIN_NAMESERVERS: usize = 2;

/// DoH status codes (RCODE).
const RCODE_NOERROR: u32 = 0;
const RCODE_NXDOMAIN: u32 = 3;

static RE_TXT_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).unwrap());

// --- DNS-over-HTTPS ---

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    name: String,
    #[serde(rename = "type")]
    record_type: u16,
    #[serde(rename = "TTL", default)]
    ttl: Option<u32>,
    data: String,
}

/// TXT data arrives as one or more quoted character-strings; these are
/// unquoted and concatenated.
pub fn normalize_txt(data: &str) -> String {
    let segments: Vec<&str> = RE_TXT_SEGMENT
        .captures_iter(data)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if segments.is_empty() {
        data.to_string()
    } else {
        segments.concat()
    }
}

/// Resolves records through a JSON DNS-over-HTTPS endpoint.
#[derive(Debug, Clone)]
pub struct DohResolver {
    endpoint: Url,
}

impl DohResolver {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    /// Answers of `record_type` only; CNAME hops the resolver followed are
    /// dropped. NXDOMAIN is an empty answer, other failures are errors.
    /// Paced under the queried name, not the resolver host.
    pub async fn query(&self, prober: &Prober, name: &str, record_type: RecordType) -> Result<Vec<DnsRecord>, ScanError> {
        let type_name = record_type.to_string();
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("name", name).append_pair("type", &type_name);
        debug!(name, record_type = %type_name, "DoH query.");

        let response: DohResponse = prober.fetch_json(&url, name, DNS_JSON).await.map_err(|e| match e {
            ScanError::Cancelled => e,
            other => ScanError::dns(name, &type_name, other),
        })?;

        match response.status {
            RCODE_NOERROR => {}
            RCODE_NXDOMAIN => return Ok(Vec::new()),
            code => return Err(ScanError::dns(name, &type_name, format!("resolver returned status {code}"))),
        }

        let wanted = u16::from(record_type);
        Ok(response
            .answer
            .into_iter()
            .filter(|answer| answer.record_type == wanted)
            .map(|answer| DnsRecord {
                record_type: type_name.clone(),
                name: answer.name.trim_end_matches('.').to_string(),
                value: if record_type == RecordType::TXT { normalize_txt(&answer.data) } else { answer.data },
                ttl: answer.ttl,
            })
            .collect())
    }
}

// --- Snapshot ---

/// Everything resolved for one domain before the analyzers run.
#[derive(Debug, Clone, Default)]
pub struct DnsSnapshot {
    /// Apex records, grouped by type in [`ZONE_RECORD_TYPES`] order.
    pub records: Vec<DnsRecord>,
    pub nameservers: Vec<String>,
    pub ds_records: Vec<DnsRecord>,
    pub dmarc_records: Vec<String>,
    pub dkim_records: Vec<String>,
    /// Lookups that failed. Their records are unknown, not absent.
    pub failed: HashSet<LookupSlot>,
}

impl DnsSnapshot {
    pub fn values_of<'a>(&'a self, record_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.records
            .iter()
            .filter(move |r| r.record_type == record_type)
            .map(|r| r.value.as_str())
    }

    pub fn spf_records(&self) -> Vec<&str> {
        self.values_of("TXT").filter(|v| v.contains("v=spf1")).collect()
    }

    pub fn dmarc_policies(&self) -> Vec<&str> {
        self.dmarc_records
            .iter()
            .map(String::as_str)
            .filter(|v| v.contains("v=DMARC1"))
            .collect()
    }

    /// Errors when any of `slots` failed to resolve, so a check never reads a
    /// failed lookup as a missing record.
    pub fn require(&self, domain: &str, slots: &[LookupSlot]) -> Result<(), ScanError> {
        match slots.iter().find(|slot| self.failed.contains(*slot)) {
            Some(slot) => {
                let (name, record_type) = slot.query(domain);
                Err(ScanError::dns(&name, &record_type.to_string(), "lookup failed, check skipped"))
            }
            None => Ok(()),
        }
    }
}

/// One DoH lookup of the resolution phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupSlot {
    Zone(RecordType),
    Ds,
    Dmarc,
    Dkim,
}

impl LookupSlot {
    /// Name and type queried for `domain`.
    pub fn query(self, domain: &str) -> (String, RecordType) {
        match self {
            LookupSlot::Zone(record_type) => (domain.to_string(), record_type),
            LookupSlot::Ds => (domain.to_string(), RecordType::DS),
            LookupSlot::Dmarc => (format!("_dmarc.{domain}"), RecordType::TXT),
            LookupSlot::Dkim => (format!("{DKIM_SELECTOR}._domainkey.{domain}"), RecordType::TXT),
        }
    }
}

struct Lookup {
    slot: LookupSlot,
    name: String,
    record_type: RecordType,
}

fn planned_lookups(domain: &str) -> Vec<Lookup> {
    ZONE_RECORD_TYPES
        .iter()
        .map(|&record_type| LookupSlot::Zone(record_type))
        .chain([LookupSlot::Ds, LookupSlot::Dmarc, LookupSlot::Dkim])
        .map(|slot| {
            let (name, record_type) = slot.query(domain);
            Lookup { slot, name, record_type }
        })
        .collect()
}

/// Runs every lookup concurrently. A failed lookup contributes one diagnostic
/// and is marked in [`DnsSnapshot::failed`]; only cancellation fails the whole
/// phase.
pub async fn resolve_snapshot(
    doh: &DohResolver,
    prober: &Prober,
    domain: &str,
    deadline: Instant,
    cancel: &CancelToken,
) -> Result<(DnsSnapshot, Vec<AnalyzerDiagnostic>), ScanError> {
    let lookups = planned_lookups(domain);
    info!(domain, lookups = lookups.len(), "Resolving DNS records.");

    let mut set = JoinSet::new();
    for (index, lookup) in lookups.iter().enumerate() {
        let doh = doh.clone();
        let prober = prober.clone();
        let name = lookup.name.clone();
        let record_type = lookup.record_type;
        set.spawn(async move {
            let outcome = tokio::time::timeout_at(deadline, doh.query(&prober, &name, record_type))
                .await
                .unwrap_or_else(|_| Err(ScanError::DeadlineExceeded));
            (index, outcome)
        });
    }
    let slots = join_ordered(set, lookups.len(), cancel).await?;

    let mut snapshot = DnsSnapshot::default();
    let mut diagnostics = Vec::new();
    for (lookup, slot) in lookups.iter().zip(slots) {
        let records = match slot {
            Some(Ok(records)) => records,
            failed => {
                let error = match failed {
                    Some(Err(e)) => e.to_string(),
                    _ => "lookup task panicked".to_string(),
                };
                warn!(name = %lookup.name, record_type = %lookup.record_type, error = %error, "DNS lookup failed.");
                diagnostics.push(AnalyzerDiagnostic {
                    analyzer: format!("dns_lookup {} {}", lookup.record_type, lookup.name),
                    error,
                });
                snapshot.failed.insert(lookup.slot);
                continue;
            }
        };
        match lookup.slot {
            LookupSlot::Zone(_) => snapshot.records.extend(records),
            LookupSlot::Ds => snapshot.ds_records = records,
            LookupSlot::Dmarc => snapshot.dmarc_records = records.into_iter().map(|r| r.value).collect(),
            LookupSlot::Dkim => snapshot.dkim_records = records.into_iter().map(|r| r.value).collect(),
        }
    }

    snapshot.nameservers = snapshot
        .values_of("NS")
        .map(|ns| ns.trim_end_matches('.').to_ascii_lowercase())
        .collect();
    info!(
        domain,
        records = snapshot.records.len(),
        nameservers = snapshot.nameservers.len(),
        failed = snapshot.failed.len(),
        "DNS records resolved."
    );
    Ok((snapshot, diagnostics))
}

pub fn detect_features(snapshot: &DnsSnapshot) -> SecurityFeatureSet {
    SecurityFeatureSet {
        dnssec_enabled: !snapshot.ds_records.is_empty(),
        spf_configured: !snapshot.spf_records().is_empty(),
        dkim_configured: !snapshot.dkim_records.is_empty(),
        dmarc_configured: !snapshot.dmarc_policies().is_empty(),
        caa_configured: snapshot.values_of("CAA").next().is_some(),
    }
}

/// Shared, read-only input of the DNS analyzers.
pub struct DnsContext {
    pub domain: String,
    pub snapshot: DnsSnapshot,
    pub prober: Prober,
    /// Independent recursive resolver, used for nameserver addresses and
    /// cross-checking.
    pub resolver: TokioAsyncResolver,
}

// --- DNSSEC ---

pub fn analyze_dnssec(snapshot: &DnsSnapshot) -> Vec<Finding> {
    if !snapshot.ds_records.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        FindingKind::DnssecNotConfigured,
        Severity::Medium,
        "DNSSEC is not enabled for this domain",
        "DNS Security",
        "Enable DNSSEC to protect against DNS spoofing attacks",
    )]
}

pub struct DnssecAnalyzer;

#[async_trait]
impl Analyzer<DnsContext> for DnssecAnalyzer {
    fn name(&self) -> &'static str {
        "dnssec"
    }

    async fn analyze(&self, ctx: &DnsContext) -> Result<AnalyzerOutput, ScanError> {
        ctx.snapshot.require(&ctx.domain, &[LookupSlot::Ds])?;
        Ok(AnalyzerOutput::findings(analyze_dnssec(&ctx.snapshot)))
    }
}

// --- Email authentication ---

/// Value of the `p=` tag of a DMARC record, lowercased.
pub fn dmarc_policy(record: &str) -> Option<String> {
    record
        .split(';')
        .find(|tag| tag.trim().starts_with("p="))
        .and_then(|tag| tag.trim().split('=').nth(1))
        .map(|policy| policy.trim().to_ascii_lowercase())
}

pub fn analyze_email_auth(snapshot: &DnsSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();

    let spf = snapshot.spf_records();
    debug!(count = spf.len(), "SPF records found.");
    match spf.len() {
        0 => findings.push(Finding::new(
            FindingKind::MissingSpfRecord,
            Severity::Medium,
            "No SPF record found",
            "TXT Records",
            "Add SPF record to prevent email spoofing",
        )),
        1 => {}
        _ => findings.push(
            Finding::new(
                FindingKind::MultipleSpfRecords,
                Severity::High,
                "Multiple SPF records found (invalid configuration)",
                "TXT Records",
                "Consolidate into a single SPF record",
            )
            .with_proof(spf.join(", ")),
        ),
    }
    for record in spf.iter().filter(|r| r.contains("+all")) {
        findings.push(
            Finding::new(
                FindingKind::WeakSpfPolicy,
                Severity::High,
                "SPF record allows all senders (+all)",
                "SPF Record",
                "Use ~all or -all instead of +all",
            )
            .with_proof(*record),
        );
    }

    let dmarc = snapshot.dmarc_policies();
    if dmarc.is_empty() {
        findings.push(Finding::new(
            FindingKind::MissingDmarcRecord,
            Severity::Medium,
            "No DMARC record found",
            "_dmarc TXT Record",
            "Add DMARC record to enforce email authentication policies",
        ));
    }
    for record in dmarc.iter().filter(|r| dmarc_policy(r).as_deref() == Some("none")) {
        debug!("DMARC analysis: Found policy 'none'.");
        findings.push(
            Finding::new(
                FindingKind::WeakDmarcPolicy,
                Severity::Low,
                "DMARC policy set to none (monitoring only)",
                "_dmarc TXT Record",
                "Upgrade DMARC policy to quarantine or reject",
            )
            .with_proof(*record),
        );
    }

    findings
}

pub struct EmailAuthAnalyzer;

#[async_trait]
impl Analyzer<DnsContext> for EmailAuthAnalyzer {
    fn name(&self) -> &'static str {
        "email_auth"
    }

    async fn analyze(&self, ctx: &DnsContext) -> Result<AnalyzerOutput, ScanError> {
        ctx.snapshot.require(&ctx.domain, &[LookupSlot::Zone(RecordType::TXT), LookupSlot::Dmarc])?;
        Ok(AnalyzerOutput::findings(analyze_email_auth(&ctx.snapshot)))
    }
}

// --- Configuration hygiene ---

pub fn analyze_config(snapshot: &DnsSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();

    let wildcards: Vec<&str> = snapshot
        .records
        .iter()
        .filter(|r| r.name.contains('*'))
        .map(|r| r.name.as_str())
        .collect();
    if !wildcards.is_empty() {
        findings.push(
            Finding::new(
                FindingKind::WildcardDnsRecords,
                Severity::Low,
                "Wildcard DNS records detected",
                "DNS Records",
                "Review wildcard DNS records for security implications",
            )
            .with_proof(wildcards.join(", ")),
        );
    }

    let long_lived: Vec<String> = snapshot
        .records
        .iter()
        .filter(|r| r.ttl.is_some_and(|ttl| ttl > MAX_TTL_SECS))
        .map(|r| format!("{} {} TTL={}", r.name, r.record_type, r.ttl.unwrap_or_default()))
        .collect();
    if !long_lived.is_empty() {
        findings.push(
            Finding::new(
                FindingKind::HighTtlValues,
                Severity::Low,
                "Some DNS records have very high TTL values",
                "DNS Records",
                "Consider reducing TTL values for better flexibility",
            )
            .with_proof(long_lived.join(", ")),
        );
    }

    if snapshot.nameservers.len() < MIN_NAMESERVERS {
        findings.push(
            Finding::new(
                FindingKind::InsufficientNameserverRedundancy,
                Severity::Medium,
                "Insufficient nameserver redundancy",
                "NS Records",
                "Configure at least 2 nameservers for redundancy",
            )
            .with_proof(format!("{} nameserver(s) configured", snapshot.nameservers.len())),
        );
    }

    findings
}

pub struct ConfigHygieneAnalyzer;

#[async_trait]
impl Analyzer<DnsContext> for ConfigHygieneAnalyzer {
    fn name(&self) -> &'static str {
        "config_hygiene"
    }

    async fn analyze(&self, ctx: &DnsContext) -> Result<AnalyzerOutput, ScanError> {
        ctx.snapshot.require(&ctx.domain, &[LookupSlot::Zone(RecordType::NS)])?;
        Ok(AnalyzerOutput::findings(analyze_config(&ctx.snapshot)))
    }
}
