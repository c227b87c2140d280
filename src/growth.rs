//! Cumulative registrations per calendar day.
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;

use crate::{
    error::AppResult,
    models::{RegistrationRow, PROFILES},
    state::GrowthCache,
    store::{RemoteStore, Select},
};

pub const TODAY: &str = "Today";
const PAGE: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrowthPoint {
    pub date:  String,
    pub users: u64,
}

pub type GrowthSeries = Vec<GrowthPoint>;

#[derive(Debug, Clone, Serialize)]
pub struct GrowthReport {
    pub total:        u64,
    pub series:       GrowthSeries,
    pub refreshed_at: DateTime<Utc>,
}

impl GrowthReport {
    /// What charts get before the first successful fetch.
    pub fn placeholder() -> Self {
        Self { total: 0, series: aggregate(&[], Utc.fix()), refreshed_at: Utc::now() }
    }
}

/// Bucket timestamps by day in `tz` and emit a running total per day.
///
/// Never returns an empty series: no rows gives a single `Today` point at 0.
pub fn aggregate(stamps: &[DateTime<Utc>], tz: FixedOffset) -> GrowthSeries {
    let mut sorted = stamps.to_vec();
    sorted.sort();

    let mut series = GrowthSeries::new();
    let mut day: Option<NaiveDate> = None;
    let mut running = 0u64;
    for ts in sorted {
        let local = ts.with_timezone(&tz);
        running += 1;
        match series.last_mut() {
            Some(point) if day == Some(local.date_naive()) => point.users = running,
            _ => {
                day = Some(local.date_naive());
                series.push(GrowthPoint { date: local.format("%b %-d").to_string(), users: running });
            }
        }
    }

    if series.is_empty() {
        series.push(GrowthPoint { date: TODAY.into(), users: 0 });
    }
    series
}

/// Read every registration timestamp, ascending, plus the number of rows that carry one.
///
/// Rows without `updated_at` are skipped and left out of the total.
pub async fn fetch_registrations(store: &dyn RemoteStore) -> AppResult<(Vec<DateTime<Utc>>, u64)> {
    let mut stamps = Vec::new();
    let mut read = 0;
    let mut total = 0;
    loop {
        let q = Select::from(PROFILES)
            .columns("updated_at")
            .exact_count()
            .order("updated_at", true)
            .range(read, read + PAGE - 1);
        let page = store.select(&q).await?;
        let count = page.count;
        let rows: Vec<RegistrationRow> = page.parse()?;
        let got = rows.len() as u64;
        read += got;
        total = count.unwrap_or(read);

        stamps.extend(rows.into_iter().filter_map(|r| r.updated_at));
        if got < PAGE || read >= total {
            break;
        }
    }

    let skipped = read - stamps.len() as u64;
    if skipped > 0 {
        tracing::warn!(skipped, "registrations without updated_at ignored");
    }
    Ok((stamps, total.saturating_sub(skipped)))
}

pub async fn build_report(store: &dyn RemoteStore, tz: FixedOffset) -> AppResult<GrowthReport> {
    let (stamps, total) = fetch_registrations(store).await?;
    if stamps.len() as u64 != total {
        tracing::warn!(rows = stamps.len(), total, "registration count moved while paging");
    }

    let mut series = aggregate(&stamps, tz);
    if stamps.is_empty() {
        series[0].users = total;
    }
    Ok(GrowthReport { total, series, refreshed_at: Utc::now() })
}

/// Re-fetch and swap the cached report. On failure the previous report stays.
pub async fn refresh(store: &dyn RemoteStore, cache: &GrowthCache, tz: FixedOffset) -> AppResult<GrowthReport> {
    match build_report(store, tz).await {
        Ok(report) => {
            let mut slot = cache.write().await;
            slot.report = Some(report.clone());
            slot.stale = false;
            tracing::info!(total = report.total, points = report.series.len(), "growth series refreshed");
            Ok(report)
        }
        Err(e) => {
            tracing::error!(error = %e, "growth fetch failed, keeping previous series");
            cache.write().await.stale = true;
            Err(e)
        }
    }
}
