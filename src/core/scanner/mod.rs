// src/core/scanner/mod.rs

// Public interface of the `scanner` module: the analyzer trait, the bounded
// fan-out that runs analyzers concurrently, and the engine that wires both
// pipelines together.
pub mod content_scanner;
pub mod context;
pub mod cookie_scanner;
pub mod dns_scanner;
pub mod headers_scanner;
pub mod path_scanner;
pub mod probe_scanner;
pub mod ssl_scanner;
pub mod zone_scanner;

use crate::config::{CrossCheckResolver, ScannerSettings};
use crate::core::errors::ScanError;
use crate::core::models::{AnalyzerDiagnostic, DnsScanResult, Finding, WebScanResult, WebStats};
use crate::core::scoring::{dns_risk_score, web_risk_score};
use crate::core::validation::{ValidDomain, ValidWebTarget};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use self::content_scanner::ContentAnalyzer;
use self::context::{target_limiter, CancelToken, Prober, TargetLimiter, WebContext};
use self::cookie_scanner::CookieAnalyzer;
use self::dns_scanner::{
    detect_features, resolve_snapshot, ConfigHygieneAnalyzer, DnsContext, DnssecAnalyzer, DohResolver,
    EmailAuthAnalyzer,
};
use self::headers_scanner::{HttpInfoAnalyzer, SecurityHeaderAnalyzer};
use self::path_scanner::SensitivePathAnalyzer;
use self::probe_scanner::CommonVulnerabilityAnalyzer;
use self::ssl_scanner::{CertificateAnalyzer, ProtocolAnalyzer};
use self::zone_scanner::{CacheConsistencyAnalyzer, ZoneTransferAnalyzer};

const MAX_REDIRECTS: usize = 5;

// --- Analyzer contract ---

/// What one analyzer contributes to a scan.
#[derive(Debug, Default, Clone)]
pub struct AnalyzerOutput {
    pub findings: Vec<Finding>,
    pub stats: WebStats,
}

impl AnalyzerOutput {
    pub fn findings(findings: Vec<Finding>) -> Self {
        Self { findings, stats: WebStats::default() }
    }

    pub fn with_stats(self, stats: WebStats) -> Self {
        Self { stats, ..self }
    }
}

/// A single independent check run against a shared, read-only context.
#[async_trait]
pub trait Analyzer<C: Send + Sync>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, ctx: &C) -> Result<AnalyzerOutput, ScanError>;
}

// --- Fan-out ---

pub struct FanOutLimits {
    pub max_concurrent: usize,
    pub deadline: Instant,
}

/// Findings, counters and diagnostics of every analyzer, in registration order.
#[derive(Debug, Default)]
pub struct Merged {
    pub findings: Vec<Finding>,
    pub stats: WebStats,
    pub diagnostics: Vec<AnalyzerDiagnostic>,
}

/// Runs all analyzers concurrently, at most `max_concurrent` at a time, each
/// bounded by the shared deadline.
///
/// A failing or late analyzer degrades to an empty result plus a diagnostic.
/// Cancellation aborts every in-flight task and is the only error returned.
pub async fn fan_out<C>(
    analyzers: &[Arc<dyn Analyzer<C>>],
    ctx: Arc<C>,
    limits: &FanOutLimits,
    cancel: &CancelToken,
) -> Result<Merged, ScanError>
where
    C: Send + Sync + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limits.max_concurrent.max(1)));
    let mut set = JoinSet::new();

    for (index, analyzer) in analyzers.iter().enumerate() {
        let analyzer = Arc::clone(analyzer);
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        let deadline = limits.deadline;
        set.spawn(async move {
            let outcome = tokio::time::timeout_at(deadline, async {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| ScanError::Internal("analyzer pool closed".into()))?;
                debug!(analyzer = analyzer.name(), "Analyzer started.");
                analyzer.analyze(&ctx).await
            })
            .await
            .unwrap_or_else(|_| Err(ScanError::DeadlineExceeded));
            (index, outcome)
        });
    }

    let slots = join_ordered(set, analyzers.len(), cancel).await?;
    Ok(merge_outcomes(analyzers.iter().map(|a| a.name()), slots))
}

/// Drains `set` into slots indexed by the task's own index. Slots of tasks that
/// panicked stay `None`.
pub(crate) async fn join_ordered<T: Send + 'static>(
    mut set: JoinSet<(usize, T)>,
    len: usize,
    cancel: &CancelToken,
) -> Result<Vec<Option<T>>, ScanError> {
    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(len).collect();
    loop {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                set.abort_all();
                warn!(pending = set.len(), "Scan cancelled, aborting in-flight tasks.");
                return Err(ScanError::Cancelled);
            }
            joined = set.join_next() => joined,
        };
        match joined {
            Some(Ok((index, value))) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(value);
                }
            }
            Some(Err(e)) => error!(error = %e, "Scan task did not complete."),
            None => break,
        }
    }
    Ok(slots)
}

fn merge_outcomes(
    names: impl Iterator<Item = &'static str>,
    slots: Vec<Option<Result<AnalyzerOutput, ScanError>>>,
) -> Merged {
    let mut merged = Merged::default();
    for (name, slot) in names.zip(slots) {
        match slot {
            Some(Ok(output)) => {
                debug!(analyzer = name, findings = output.findings.len(), "Analyzer finished.");
                merged.findings.extend(output.findings);
                merged.stats = merged.stats.merge(output.stats);
            }
            Some(Err(e)) => {
                warn!(analyzer = name, error = %e, "Analyzer degraded to an empty result.");
                merged.diagnostics.push(AnalyzerDiagnostic { analyzer: name.to_string(), error: e.to_string() });
            }
            None => {
                merged.diagnostics.push(AnalyzerDiagnostic {
                    analyzer: name.to_string(),
                    error: "analyzer task panicked".to_string(),
                });
            }
        }
    }
    merged
}

// --- Engine ---

/// Owns the shared HTTP client, rate limiter and resolver, plus the ordered
/// analyzer lists of both pipelines.
pub struct ScanEngine {
    settings: ScannerSettings,
    client: Client,
    limiter: Arc<TargetLimiter>,
    resolver: TokioAsyncResolver,
    doh: DohResolver,
    web_analyzers: Vec<Arc<dyn Analyzer<WebContext>>>,
    dns_analyzers: Vec<Arc<dyn Analyzer<DnsContext>>>,
}

impl ScanEngine {
    pub fn new(settings: ScannerSettings) -> Result<Self, ScanError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.probe_timeout())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| ScanError::Internal(format!("failed to build HTTP client: {e}")))?;

        let doh_endpoint = Url::parse(&settings.doh_endpoint)
            .map_err(|e| ScanError::Config(format!("invalid doh_endpoint: {e}")))?;

        let resolver_config = match settings.cross_check_resolver {
            CrossCheckResolver::Google => ResolverConfig::google(),
            CrossCheckResolver::Cloudflare => ResolverConfig::cloudflare(),
            CrossCheckResolver::Quad9 => ResolverConfig::quad9(),
        };
        let mut resolver_opts = ResolverOpts::default();
        resolver_opts.timeout = settings.probe_timeout();
        let resolver = TokioAsyncResolver::tokio(resolver_config, resolver_opts);

        let web_analyzers: Vec<Arc<dyn Analyzer<WebContext>>> = vec![
            Arc::new(HttpInfoAnalyzer),
            Arc::new(CookieAnalyzer),
            Arc::new(SecurityHeaderAnalyzer),
            Arc::new(ProtocolAnalyzer),
            Arc::new(CertificateAnalyzer),
            Arc::new(ContentAnalyzer),
            Arc::new(CommonVulnerabilityAnalyzer),
            Arc::new(SensitivePathAnalyzer),
        ];
        let dns_analyzers: Vec<Arc<dyn Analyzer<DnsContext>>> = vec![
            Arc::new(DnssecAnalyzer),
            Arc::new(EmailAuthAnalyzer),
            Arc::new(ConfigHygieneAnalyzer),
            Arc::new(ZoneTransferAnalyzer),
            Arc::new(CacheConsistencyAnalyzer),
        ];

        Ok(Self {
            limiter: target_limiter(settings.requests_per_second),
            doh: DohResolver::new(doh_endpoint),
            settings,
            client,
            resolver,
            web_analyzers,
            dns_analyzers,
        })
    }

    fn prober(&self, cancel: &CancelToken) -> Prober {
        Prober::new(
            self.client.clone(),
            Arc::clone(&self.limiter),
            self.settings.probe_timeout(),
            self.settings.max_body_bytes,
            cancel.clone(),
        )
    }

    fn limits(&self) -> FanOutLimits {
        FanOutLimits {
            max_concurrent: self.settings.max_concurrent_analyzers,
            deadline: Instant::now() + self.settings.scan_deadline(),
        }
    }

    pub async fn scan_web(&self, target: &ValidWebTarget, cancel: &CancelToken) -> Result<WebScanResult, ScanError> {
        info!(target = %target.url, depth = target.scan_depth, "Starting web scan.");
        let started = std::time::Instant::now();

        let ctx = Arc::new(WebContext::new(target.url.clone(), target.scan_depth, self.prober(cancel)));
        let merged = fan_out(&self.web_analyzers, ctx, &self.limits(), cancel).await?;

        let result = WebScanResult {
            target_url: target.raw.clone(),
            risk_score: web_risk_score(&merged.findings),
            vulnerabilities: merged.findings,
            stats: merged.stats,
            scan_duration: started.elapsed().as_secs(),
            diagnostics: merged.diagnostics,
        };
        info!(
            target = %target.url,
            findings = result.vulnerabilities.len(),
            risk_score = result.risk_score,
            "Web scan finished."
        );
        Ok(result)
    }

    pub async fn scan_dns(&self, target: &ValidDomain, cancel: &CancelToken) -> Result<DnsScanResult, ScanError> {
        info!(domain = %target.domain, "Starting DNS analysis.");
        let started = std::time::Instant::now();
        let prober = self.prober(cancel);
        let limits = self.limits();

        let (snapshot, mut diagnostics) =
            resolve_snapshot(&self.doh, &prober, &target.domain, limits.deadline, cancel).await?;
        let features = detect_features(&snapshot);
        debug!(domain = %target.domain, ?features, "Security features detected.");

        let ctx = Arc::new(DnsContext {
            domain: target.domain.clone(),
            snapshot,
            prober,
            resolver: self.resolver.clone(),
        });
        let merged = fan_out(&self.dns_analyzers, Arc::clone(&ctx), &limits, cancel).await?;
        diagnostics.extend(merged.diagnostics);

        let result = DnsScanResult {
            domain: target.domain.clone(),
            dns_records: ctx.snapshot.records.clone(),
            risk_score: dns_risk_score(&merged.findings, &features),
            vulnerabilities: merged.findings,
            security_features: features,
            nameservers: ctx.snapshot.nameservers.clone(),
            analysis_duration: started.elapsed().as_secs(),
            diagnostics,
        };
        info!(
            domain = %target.domain,
            findings = result.vulnerabilities.len(),
            risk_score = result.risk_score,
            "DNS analysis finished."
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{FindingKind, Severity};
    use std::time::Duration;

    struct Fixed {
        name: &'static str,
        delay: Duration,
        kind: FindingKind,
    }

    #[async_trait]
    impl Analyzer<()> for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn analyze(&self, _ctx: &()) -> Result<AnalyzerOutput, ScanError> {
            tokio::time::sleep(self.delay).await;
            let finding = Finding::new(self.kind, Severity::Low, self.name, "", "");
            Ok(AnalyzerOutput::findings(vec![finding]).with_stats(WebStats { pages_scanned: 1, ..Default::default() }))
        }
    }

    struct Failing;

    #[async_trait]
    impl Analyzer<()> for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn analyze(&self, _ctx: &()) -> Result<AnalyzerOutput, ScanError> {
            Err(ScanError::Internal("boom".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Analyzer<()> for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn analyze(&self, _ctx: &()) -> Result<AnalyzerOutput, ScanError> {
            panic!("analyzer bug")
        }
    }

    fn fixed(name: &'static str, millis: u64) -> Arc<dyn Analyzer<()>> {
        Arc::new(Fixed { name, delay: Duration::from_millis(millis), kind: FindingKind::InsecureCookie })
    }

    fn limits(secs: u64) -> FanOutLimits {
        FanOutLimits { max_concurrent: 4, deadline: Instant::now() + Duration::from_secs(secs) }
    }

    #[tokio::test]
    async fn merges_in_registration_order_not_completion_order() {
        let analyzers = vec![fixed("slow", 80), fixed("fast", 0), fixed("middle", 30)];
        let merged = fan_out(&analyzers, Arc::new(()), &limits(5), &CancelToken::new()).await.unwrap();

        let order: Vec<&str> = merged.findings.iter().map(|f| f.description.as_str()).collect();
        assert_eq!(order, ["slow", "fast", "middle"]);
        assert_eq!(merged.stats.pages_scanned, 3);
        assert!(merged.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn failures_and_panics_degrade_to_diagnostics() {
        let analyzers: Vec<Arc<dyn Analyzer<()>>> = vec![fixed("ok", 0), Arc::new(Failing), Arc::new(Panicking)];
        let merged = fan_out(&analyzers, Arc::new(()), &limits(5), &CancelToken::new()).await.unwrap();

        assert_eq!(merged.findings.len(), 1);
        let names: Vec<&str> = merged.diagnostics.iter().map(|d| d.analyzer.as_str()).collect();
        assert_eq!(names, ["failing", "panicking"]);
        assert!(merged.diagnostics[0].error.contains("boom"));
    }

    #[tokio::test]
    async fn late_analyzers_are_cut_at_the_deadline() {
        let analyzers = vec![fixed("quick", 0), fixed("stuck", 5_000)];
        let limits = FanOutLimits { max_concurrent: 2, deadline: Instant::now() + Duration::from_millis(100) };
        let merged = fan_out(&analyzers, Arc::new(()), &limits, &CancelToken::new()).await.unwrap();

        assert_eq!(merged.findings.len(), 1);
        assert_eq!(merged.diagnostics.len(), 1);
        assert_eq!(merged.diagnostics[0].analyzer, "stuck");
        assert_eq!(merged.diagnostics[0].error, ScanError::DeadlineExceeded.to_string());
    }

    #[tokio::test]
    async fn concurrency_limit_of_one_still_runs_everything() {
        let analyzers = vec![fixed("a", 10), fixed("b", 10), fixed("c", 10)];
        let limits = FanOutLimits { max_concurrent: 1, deadline: Instant::now() + Duration::from_secs(5) };
        let merged = fan_out(&analyzers, Arc::new(()), &limits, &CancelToken::new()).await.unwrap();
        assert_eq!(merged.findings.len(), 3);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_scan() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let analyzers = vec![fixed("stuck", 5_000)];
        let started = std::time::Instant::now();
        let outcome = fan_out(&analyzers, Arc::new(()), &limits(10), &cancel).await;

        assert!(matches!(outcome, Err(ScanError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
