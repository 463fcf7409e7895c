// src/core/persistence.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::core::errors::ScanError;
use crate::core::models::{DnsScanResult, Finding, ScanKind, WebScanResult};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS scans (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        target TEXT NOT NULL,
        scan_type TEXT NOT NULL,
        status TEXT NOT NULL,
        completed_at TEXT NOT NULL,
        results TEXT NOT NULL,
        vulnerabilities_found INTEGER NOT NULL,
        risk_score INTEGER NOT NULL,
        duration INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS findings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scan_id TEXT NOT NULL REFERENCES scans(id) ON DELETE CASCADE,
        finding_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        description TEXT NOT NULL,
        location TEXT NOT NULL,
        proof_of_concept TEXT,
        remediation TEXT NOT NULL,
        category TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_findings_scan_id ON findings(scan_id)",
    "CREATE INDEX IF NOT EXISTS idx_scans_user_id ON scans(user_id)",
];

/// One completed scan, ready to be written.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    pub id: Uuid,
    pub user_id: String,
    pub target: String,
    pub scan_type: ScanKind,
    pub completed_at: DateTime<Utc>,
    /// Full result document.
    pub results: serde_json::Value,
    pub risk_score: u8,
    pub duration_secs: u64,
    pub findings: Vec<Finding>,
}

impl ScanRecord {
    pub fn web(user_id: &str, result: &WebScanResult) -> Result<Self, ScanError> {
        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            target: result.target_url.clone(),
            scan_type: ScanKind::WebApplication,
            completed_at: Utc::now(),
            results: serde_json::to_value(result)?,
            risk_score: result.risk_score,
            duration_secs: result.scan_duration,
            findings: result.vulnerabilities.clone(),
        })
    }

    pub fn dns(user_id: &str, result: &DnsScanResult) -> Result<Self, ScanError> {
        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            target: result.domain.clone(),
            scan_type: ScanKind::DnsSecurity,
            completed_at: Utc::now(),
            results: serde_json::to_value(result)?,
            risk_score: result.risk_score,
            duration_secs: result.analysis_duration,
            findings: result.vulnerabilities.clone(),
        })
    }
}

/// Durable storage for completed scans. A save is all-or-nothing.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn save(&self, record: &ScanRecord) -> Result<(), ScanError>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, ScanError> {
        info!(url = %config.url, "Opening scan database.");
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), ScanError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema ready.");
        Ok(())
    }
}

#[async_trait]
impl ScanStore for SqliteStore {
    async fn save(&self, record: &ScanRecord) -> Result<(), ScanError> {
        let scan_type: &'static str = record.scan_type.into();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO scans (id, user_id, target, scan_type, status, completed_at, results,
                vulnerabilities_found, risk_score, duration)
             VALUES (?, ?, ?, ?, 'completed', ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.user_id)
        .bind(&record.target)
        .bind(scan_type)
        .bind(record.completed_at.to_rfc3339())
        .bind(record.results.to_string())
        .bind(record.findings.len() as i64)
        .bind(i64::from(record.risk_score))
        .bind(i64::try_from(record.duration_secs).unwrap_or(i64::MAX))
        .execute(&mut *tx)
        .await?;

        for finding in &record.findings {
            let finding_type: &'static str = finding.kind.into();
            let severity: &'static str = finding.severity.into();
            sqlx::query(
                "INSERT INTO findings (scan_id, finding_type, severity, description, location,
                    proof_of_concept, remediation, category)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.id.to_string())
            .bind(finding_type)
            .bind(severity)
            .bind(&finding.description)
            .bind(&finding.location)
            .bind(finding.proof_of_concept.as_deref())
            .bind(&finding.remediation)
            .bind(finding.category.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(scan_id = %record.id, findings = record.findings.len(), "Scan written.");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay before retry `n` is `n * backoff`.
    pub backoff: Duration,
}

impl From<&DatabaseConfig> for RetryPolicy {
    fn from(config: &DatabaseConfig) -> Self {
        Self { attempts: config.write_attempts, backoff: Duration::from_millis(config.retry_backoff_ms) }
    }
}

pub async fn persist_with_retry(store: &dyn ScanStore, record: &ScanRecord, policy: RetryPolicy) -> Result<(), ScanError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match store.save(record).await {
            Ok(()) => {
                info!(scan_id = %record.id, attempt, "Scan persisted.");
                return Ok(());
            }
            Err(e) if attempt < attempts => {
                warn!(scan_id = %record.id, attempt, error = %e, "Persisting scan failed, retrying.");
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                error!(scan_id = %record.id, attempts, error = %e, "Giving up on persisting scan.");
                return Err(e);
            }
        }
    }
}
