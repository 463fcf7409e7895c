// src/core/scanner/zone_scanner.rs

//! Active DNS checks against the domain's own nameservers and an independent
//! recursive resolver.

use async_trait::async_trait;
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_resolver::proto::rr::{Name, RecordType};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::dns_scanner::{DnsContext, LookupSlot};
use super::{Analyzer, AnalyzerOutput};
use crate::core::errors::ScanError;
use crate::core::models::{Finding, FindingKind, Severity};

const DNS_PORT: u16 = 53;

// --- Zone transfer ---

/// A transfer is open when the server answers NOERROR with at least one record.
pub fn transfer_allowed(code: ResponseCode, answers: usize) -> bool {
    code == ResponseCode::NoError && answers > 0
}

fn query_id() -> u16 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    u16::from_be_bytes([bytes[0], bytes[1]])
}

pub fn axfr_request(domain: &str) -> Result<Vec<u8>, ScanError> {
    let name = Name::from_ascii(format!("{domain}.")).map_err(|e| ScanError::dns(domain, "AXFR", e))?;
    let mut message = Message::new();
    message
        .set_id(query_id())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(false);
    message.add_query(Query::query(name, RecordType::AXFR));
    message.to_vec().map_err(|e| ScanError::dns(domain, "AXFR", e))
}

/// Sends one AXFR query over TCP and reads the first response message.
async fn attempt_axfr(address: SocketAddr, domain: &str, timeout: Duration) -> Result<(ResponseCode, usize), ScanError> {
    let request = axfr_request(domain)?;
    let length = u16::try_from(request.len()).map_err(|_| ScanError::dns(domain, "AXFR", "request too large"))?;

    let exchange = async {
        let mut stream = TcpStream::connect(address).await?;
        stream.write_u16(length).await?;
        stream.write_all(&request).await?;
        let response_length = stream.read_u16().await? as usize;
        let mut buffer = vec![0u8; response_length];
        stream.read_exact(&mut buffer).await?;
        Ok::<_, std::io::Error>(buffer)
    };

    let buffer = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| ScanError::Timeout(timeout))?
        .map_err(|e| ScanError::dns(domain, "AXFR", e))?;
    let response = Message::from_vec(&buffer).map_err(|e| ScanError::dns(domain, "AXFR", e))?;
    Ok((response.response_code(), response.answers().len()))
}

async fn nameserver_address(ctx: &DnsContext, nameserver: &str) -> Result<IpAddr, ScanError> {
    let timeout = ctx.prober.probe_timeout();
    let lookup = tokio::time::timeout(timeout, ctx.resolver.lookup_ip(format!("{nameserver}.")))
        .await
        .map_err(|_| ScanError::Timeout(timeout))?
        .map_err(|e| ScanError::dns(nameserver, "A/AAAA", e))?;
    lookup
        .iter()
        .next()
        .ok_or_else(|| ScanError::dns(nameserver, "A/AAAA", "no address"))
}

fn zone_transfer_finding(domain: &str, nameserver: &str, answers: usize) -> Finding {
    Finding::new(
        FindingKind::ZoneTransferAllowed,
        Severity::High,
        format!("Nameserver {nameserver} allows zone transfers of {domain}"),
        format!("NS {nameserver}"),
        "Restrict AXFR to authorized secondary nameservers",
    )
    .with_proof(format!("AXFR {domain} @{nameserver}: NOERROR with {answers} records"))
}

pub struct ZoneTransferAnalyzer;

#[async_trait]
impl Analyzer<DnsContext> for ZoneTransferAnalyzer {
    fn name(&self) -> &'static str {
        "zone_transfer"
    }

    async fn analyze(&self, ctx: &DnsContext) -> Result<AnalyzerOutput, ScanError> {
        ctx.snapshot.require(&ctx.domain, &[LookupSlot::Zone(RecordType::NS)])?;
        let mut findings = Vec::new();
        for nameserver in &ctx.snapshot.nameservers {
            ctx.prober.pace(nameserver).await?;
            let attempt = async {
                let ip = nameserver_address(ctx, nameserver).await?;
                attempt_axfr(SocketAddr::new(ip, DNS_PORT), &ctx.domain, ctx.prober.probe_timeout()).await
            };
            match attempt.await {
                Ok((code, answers)) if transfer_allowed(code, answers) => {
                    warn!(nameserver = %nameserver, answers, "Zone transfer allowed.");
                    findings.push(zone_transfer_finding(&ctx.domain, nameserver, answers));
                }
                Ok((code, _)) => debug!(nameserver = %nameserver, %code, "Zone transfer refused."),
                Err(e) => debug!(nameserver = %nameserver, error = %e, "Zone transfer attempt failed."),
            }
        }
        info!(nameservers = ctx.snapshot.nameservers.len(), findings = findings.len(), "Zone transfer test finished.");
        Ok(AnalyzerOutput::findings(findings))
    }
}

// --- Cache consistency ---

/// Flags answers that share no address. Both sides empty is consistent.
pub fn compare_answers(domain: &str, doh: &BTreeSet<String>, independent: &BTreeSet<String>) -> Option<Finding> {
    if doh.is_empty() && independent.is_empty() {
        return None;
    }
    if !doh.is_disjoint(independent) {
        return None;
    }
    let list = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(", ");
    Some(
        Finding::new(
            FindingKind::DnsResponseInconsistency,
            Severity::Low,
            "DNS resolvers return different A records for this domain",
            format!("A Records of {domain}"),
            "Check for stale caches, split-horizon leaks or DNS hijacking",
        )
        .with_proof(format!("DoH: [{}]; recursive resolver: [{}]", list(doh), list(independent))),
    )
}

pub struct CacheConsistencyAnalyzer;

#[async_trait]
impl Analyzer<DnsContext> for CacheConsistencyAnalyzer {
    fn name(&self) -> &'static str {
        "cache_consistency"
    }

    async fn analyze(&self, ctx: &DnsContext) -> Result<AnalyzerOutput, ScanError> {
        ctx.snapshot.require(&ctx.domain, &[LookupSlot::Zone(RecordType::A)])?;
        let doh: BTreeSet<String> = ctx.snapshot.values_of("A").map(str::to_string).collect();

        let timeout = ctx.prober.probe_timeout();
        let lookup = tokio::time::timeout(timeout, ctx.resolver.ipv4_lookup(format!("{}.", ctx.domain)))
            .await
            .map_err(|_| ScanError::Timeout(timeout))?;
        let independent: BTreeSet<String> = match lookup {
            Ok(answers) => answers.iter().map(|a| a.0.to_string()).collect(),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => BTreeSet::new(),
            Err(e) => return Err(ScanError::dns(&ctx.domain, "A", e)),
        };
        debug!(doh = doh.len(), independent = independent.len(), "Comparing resolver answers.");

        Ok(AnalyzerOutput::findings(compare_answers(&ctx.domain, &doh, &independent).into_iter().collect()))
    }
}
