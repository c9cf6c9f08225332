use std::collections::BTreeSet;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{RiskReport, Severity};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// One stored report per date; re-assessing a date replaces its row.
pub async fn save_report(
    pool: &PgPool,
    report: &RiskReport,
    requires_alert: bool,
) -> anyhow::Result<Uuid> {
    let payload = serde_json::to_string(report).context("failed to serialise risk report")?;

    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO pos_early_warning.risk_reports
        (id, report_date, score, severity, severity_rank, requires_alert, payload)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (report_date) DO UPDATE
        SET score = EXCLUDED.score,
            severity = EXCLUDED.severity,
            severity_rank = EXCLUDED.severity_rank,
            requires_alert = EXCLUDED.requires_alert,
            payload = EXCLUDED.payload,
            updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(report.date)
    .bind(i16::from(report.score))
    .bind(report.severity.as_str())
    .bind(report.severity.rank())
    .bind(requires_alert)
    .bind(payload)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to store report for {}", report.date))?
    .get("id");

    info!(date = %report.date, %id, severity = %report.severity, "report stored");
    Ok(id)
}

/// Dates already reported at or above `min_severity`, kept out of baselines.
pub async fn fetch_flagged_dates(
    pool: &PgPool,
    since_date: NaiveDate,
    min_severity: Severity,
) -> anyhow::Result<BTreeSet<NaiveDate>> {
    let rows = sqlx::query(
        "SELECT report_date FROM pos_early_warning.risk_reports \
         WHERE report_date >= $1 AND severity_rank >= $2",
    )
    .bind(since_date)
    .bind(min_severity.rank())
    .fetch_all(pool)
    .await?;

    let flagged: BTreeSet<NaiveDate> = rows.iter().map(|row| row.get("report_date")).collect();
    debug!(count = flagged.len(), since = %since_date, "loaded flagged dates");
    Ok(flagged)
}

pub async fn fetch_reports(pool: &PgPool, since_date: NaiveDate) -> anyhow::Result<Vec<RiskReport>> {
    let rows = sqlx::query(
        "SELECT report_date, payload FROM pos_early_warning.risk_reports \
         WHERE report_date >= $1 ORDER BY report_date",
    )
    .bind(since_date)
    .fetch_all(pool)
    .await?;

    let mut reports = Vec::with_capacity(rows.len());
    for row in rows {
        let date: NaiveDate = row.get("report_date");
        let payload: String = row.get("payload");
        let report: RiskReport = serde_json::from_str(&payload)
            .with_context(|| format!("stored report for {date} is not valid JSON"))?;
        reports.push(report);
    }

    Ok(reports)
}
