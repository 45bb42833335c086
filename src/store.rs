//! Hypothesis persistence
//! A record is stored as an ordered series of independent inserts: the
//! hypothesis row, each evidence and alert row, then the research snapshot.
//! A failing child insert is logged and skipped.

use crate::evidence::{AlertItem, EvidenceItem, EvidenceKind, HypothesisRecord};
use crate::research::ResearchBundle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_hypothesis(&self, record: &HypothesisRecord, status: &str) -> PersistenceResult<i64>;

    async fn insert_evidence(
        &self,
        hypothesis_id: i64,
        kind: EvidenceKind,
        item: &EvidenceItem,
    ) -> PersistenceResult<i64>;

    async fn insert_alert(&self, hypothesis_id: i64, alert: &AlertItem) -> PersistenceResult<i64>;

    async fn insert_research_snapshot(
        &self,
        hypothesis_id: i64,
        bundle: &ResearchBundle,
    ) -> PersistenceResult<i64>;
}

/// What was actually written
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistReport {
    pub hypothesis_id: i64,
    pub evidence_saved: usize,
    pub alerts_saved: usize,
    pub snapshot_saved: bool,
    pub skipped: usize,
}

/// Persist a record. Only the hypothesis insert can fail the whole call.
pub async fn persist_record(
    store: &dyn RecordStore,
    record: &HypothesisRecord,
    status: &str,
    bundle: Option<&ResearchBundle>,
) -> PersistenceResult<PersistReport> {
    let hypothesis_id = store.insert_hypothesis(record, status).await?;
    let mut report = PersistReport {
        hypothesis_id,
        ..Default::default()
    };

    let evidence = record
        .contradictions
        .iter()
        .map(|item| (EvidenceKind::Contradiction, item))
        .chain(
            record
                .confirmations
                .iter()
                .map(|item| (EvidenceKind::Confirmation, item)),
        );

    for (kind, item) in evidence {
        match store.insert_evidence(hypothesis_id, kind, item).await {
            Ok(_) => report.evidence_saved += 1,
            Err(e) => {
                warn!(hypothesis_id, kind = kind.as_str(), error = %e, "Skipping evidence insert");
                report.skipped += 1;
            }
        }
    }

    for alert in &record.alerts {
        match store.insert_alert(hypothesis_id, alert).await {
            Ok(_) => report.alerts_saved += 1,
            Err(e) => {
                warn!(hypothesis_id, alert_type = %alert.alert_type, error = %e, "Skipping alert insert");
                report.skipped += 1;
            }
        }
    }

    if let Some(bundle) = bundle {
        match store.insert_research_snapshot(hypothesis_id, bundle).await {
            Ok(_) => report.snapshot_saved = true,
            Err(e) => {
                warn!(hypothesis_id, error = %e, "Skipping research snapshot insert");
                report.skipped += 1;
            }
        }
    }

    info!(
        hypothesis_id,
        evidence = report.evidence_saved,
        alerts = report.alerts_saved,
        skipped = report.skipped,
        "Hypothesis persisted"
    );
    Ok(report)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisSummary {
    pub id: i64,
    pub title: String,
    pub direction: String,
    pub confidence: f64,
    pub recommendation: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_hypotheses: i64,
    pub average_confidence: Option<f64>,
    pub unread_alerts: i64,
    pub recent: Vec<HypothesisSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAlert {
    pub id: i64,
    pub hypothesis_id: i64,
    pub alert_type: String,
    pub message: String,
    pub priority: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PgHypothesisStore {
    pool: PgPool,
}

impl PgHypothesisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn dashboard(&self, recent_limit: i64) -> PersistenceResult<DashboardSummary> {
        let totals = sqlx::query(
            "SELECT COUNT(*) AS total, AVG(confidence) AS average_confidence FROM hypotheses",
        )
        .persistent(false)
        .fetch_one(&self.pool)
        .await?;

        let unread = sqlx::query("SELECT COUNT(*) AS unread FROM alerts WHERE is_read = FALSE")
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, title, direction, confidence, recommendation, status, created_at
            FROM hypotheses
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(recent_limit)
        .persistent(false)
        .fetch_all(&self.pool)
        .await?;

        let recent = rows
            .into_iter()
            .map(|row| {
                Ok(HypothesisSummary {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    direction: row.try_get("direction")?,
                    confidence: row.try_get("confidence")?,
                    recommendation: row.try_get("recommendation")?,
                    status: row.try_get("status")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(DashboardSummary {
            total_hypotheses: totals.try_get("total")?,
            average_confidence: totals.try_get("average_confidence")?,
            unread_alerts: unread.try_get("unread")?,
            recent,
        })
    }

    pub async fn list_alerts(&self, unread_only: bool, limit: i64) -> PersistenceResult<Vec<StoredAlert>> {
        let rows = sqlx::query(
            r#"
            SELECT id, hypothesis_id, alert_type, message, priority, is_read, created_at
            FROM alerts
            WHERE ($1 = FALSE OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(unread_only)
        .bind(limit)
        .persistent(false)
        .fetch_all(&self.pool)
        .await?;

        let alerts = rows
            .into_iter()
            .map(|row| {
                Ok(StoredAlert {
                    id: row.try_get("id")?,
                    hypothesis_id: row.try_get("hypothesis_id")?,
                    alert_type: row.try_get("alert_type")?,
                    message: row.try_get("message")?,
                    priority: row.try_get("priority")?,
                    is_read: row.try_get("is_read")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(alerts)
    }

    pub async fn mark_read(&self, alert_id: i64) -> PersistenceResult<()> {
        let result = sqlx::query("UPDATE alerts SET is_read = TRUE WHERE id = $1")
            .bind(alert_id)
            .persistent(false)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("alert {}", alert_id)));
        }

        info!(alert_id, "Alert marked as read");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgHypothesisStore {
    async fn insert_hypothesis(&self, record: &HypothesisRecord, status: &str) -> PersistenceResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO hypotheses
            (title, direction, price_target, timeframe, instruments, confidence, recommendation, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&record.title)
        .bind(record.direction.as_str())
        .bind(record.price_target)
        .bind(&record.timeframe)
        .bind(&record.instruments)
        .bind(record.confidence)
        .bind(&record.recommendation)
        .bind(status)
        .persistent(false)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("id")?)
    }

    async fn insert_evidence(
        &self,
        hypothesis_id: i64,
        kind: EvidenceKind,
        item: &EvidenceItem,
    ) -> PersistenceResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO evidence
            (hypothesis_id, kind, quote, reason, source, strength, origin, similarity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(hypothesis_id)
        .bind(kind.as_str())
        .bind(&item.quote)
        .bind(&item.reason)
        .bind(&item.source)
        .bind(item.strength.as_str())
        .bind(item.origin.as_str())
        .bind(item.similarity)
        .persistent(false)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("id")?)
    }

    async fn insert_alert(&self, hypothesis_id: i64, alert: &AlertItem) -> PersistenceResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO alerts (hypothesis_id, alert_type, message, priority)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(hypothesis_id)
        .bind(&alert.alert_type)
        .bind(&alert.message)
        .bind(alert.priority.as_str())
        .persistent(false)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("id")?)
    }

    async fn insert_research_snapshot(
        &self,
        hypothesis_id: i64,
        bundle: &ResearchBundle,
    ) -> PersistenceResult<i64> {
        let payload = serde_json::to_value(bundle)?;

        let row = sqlx::query(
            r#"
            INSERT INTO research_snapshots (hypothesis_id, bundle, bundle_confidence)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(hypothesis_id)
        .bind(payload)
        .bind(bundle.bundle_confidence)
        .persistent(false)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("id")?)
    }
}
