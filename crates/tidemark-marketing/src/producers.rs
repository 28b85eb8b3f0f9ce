//! Mock analytic data producers with fixed response schemas.
//!
//! Each producer returns the same shape for every query; fields for
//! sources that were not requested (or are unavailable) are absent, never
//! null. Replace with real API integrations (GA4, GSC, Meta Marketing API)
//! when wiring up production data.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use tidemark_engine::{DataProducer, ProducerError};

/// Campaign ids are caller-supplied; keep them to a safe slug alphabet.
pub const CAMPAIGN_ID_PATTERN: &str = "^[a-zA-Z0-9_-]+$";

// ---------------------------------------------------------------------------
// Channel analytics
// ---------------------------------------------------------------------------

/// Aggregated channel analytics for Google Analytics, Search Console,
/// Facebook, and Instagram, keyed by requested sources and date range.
#[derive(Debug)]
pub struct ChannelAnalyticsProducer;

#[async_trait]
impl DataProducer for ChannelAnalyticsProducer {
    fn source(&self) -> &str {
        "channel_analytics"
    }

    async fn fetch(&self, query: Value) -> Result<Value, ProducerError> {
        let date_range = query
            .get("date_range")
            .and_then(Value::as_str)
            .ok_or_else(|| ProducerError::InvalidQuery {
                source_name: self.source().to_string(),
                message: "`date_range` is required".to_string(),
            })?;
        let sources: Vec<&str> = query
            .get("sources")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut result = Map::new();
        result.insert("date_range".to_string(), json!(date_range));
        if sources.contains(&"ga") {
            result.insert(
                "ga".to_string(),
                json!({
                    "users": 12500,
                    "sessions": 18200,
                    "bounce_rate": 0.42,
                    "avg_session_duration": 145,
                }),
            );
        }
        if sources.contains(&"gsc") {
            result.insert(
                "gsc".to_string(),
                json!({
                    "clicks": 3200,
                    "impressions": 89000,
                    "ctr": 0.036,
                    "position": 12.4,
                }),
            );
        }
        if sources.contains(&"facebook") {
            result.insert(
                "facebook".to_string(),
                json!({
                    "reach": 45000,
                    "impressions": 78000,
                    "clicks": 2100,
                    "ctr": 0.027,
                    "spend": 850,
                }),
            );
        }
        if sources.contains(&"instagram") {
            result.insert(
                "instagram".to_string(),
                json!({
                    "reach": 62000,
                    "impressions": 95000,
                    "engagement": 4200,
                    "profile_visits": 1800,
                }),
            );
        }

        Ok(Value::Object(result))
    }
}

// ---------------------------------------------------------------------------
// Campaign KPIs
// ---------------------------------------------------------------------------

/// Per-campaign KPIs simulated deterministically from the campaign id, so
/// repeated monitoring of the same campaign sees consistent figures.
#[derive(Debug)]
pub struct CampaignKpiProducer;

#[async_trait]
impl DataProducer for CampaignKpiProducer {
    fn source(&self) -> &str {
        "campaign_kpis"
    }

    async fn fetch(&self, query: Value) -> Result<Value, ProducerError> {
        let campaign_id = query
            .get("campaign_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .ok_or_else(|| ProducerError::InvalidQuery {
                source_name: self.source().to_string(),
                message: "`campaign_id` is required".to_string(),
            })?;

        if campaign_id.is_empty()
            || campaign_id.len() > 128
            || !campaign_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ProducerError::InvalidQuery {
                source_name: self.source().to_string(),
                message: format!(
                    "campaign id must match {CAMPAIGN_ID_PATTERN} and be 1-128 chars"
                ),
            });
        }

        Ok(simulate_campaign_kpis(campaign_id))
    }
}

/// Seeded KPI simulation: every derived figure is a pure function of the
/// campaign id hash.
fn simulate_campaign_kpis(campaign_id: &str) -> Value {
    let seed = simple_hash(campaign_id);
    let r = |min: u64, max: u64| min + (u64::from(seed) % (max - min + 1));
    let rf = |min: f64, max: f64| min + (f64::from(seed % 10_000) / 10_000.0) * (max - min);

    let impressions = r(5_000, 450_000);
    let target_ctr = round4(rf(0.02, 0.06));
    let ctr = round4(target_ctr * rf(0.6, 1.4));
    let clicks = (impressions as f64 * ctr).round();
    let conversion_rate = rf(0.02, 0.08);
    let conversions = (clicks * conversion_rate).round();
    let cpc = round2(rf(0.35, 2.5));
    let spend = round2(clicks * cpc);

    json!({
        "campaign_id": campaign_id,
        "ctr": ctr,
        "conversions": conversions,
        "target_ctr": target_ctr,
        "impressions": impressions,
        "clicks": clicks,
        "spend": spend,
        "conversion_rate": round4(conversion_rate),
        "period": "last_30_days",
    })
}

/// 32-bit string hash (the `h*31 + c` family) with wraparound.
fn simple_hash(s: &str) -> u32 {
    let mut h: i32 = 0;
    for c in s.chars() {
        h = h
            .wrapping_shl(5)
            .wrapping_sub(h)
            .wrapping_add(c as i32);
    }
    h.unsigned_abs()
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Compare a campaign's current CTR to its target.
pub fn kpi_status(current_ctr: f64, target_ctr: f64) -> &'static str {
    if current_ctr >= target_ctr {
        "above_target"
    } else {
        "below_target"
    }
}

// ---------------------------------------------------------------------------
// Campaign directory
// ---------------------------------------------------------------------------

/// Creates campaigns. Ids are `cmp_<n>` with a process-local counter;
/// status is always `created`.
#[derive(Debug)]
pub struct CampaignDirectory {
    next_id: AtomicU64,
}

impl CampaignDirectory {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for CampaignDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProducer for CampaignDirectory {
    fn source(&self) -> &str {
        "campaign_directory"
    }

    async fn fetch(&self, query: Value) -> Result<Value, ProducerError> {
        let name = query
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProducerError::InvalidQuery {
                source_name: self.source().to_string(),
                message: "`name` is required".to_string(),
            })?;
        let budget = query
            .get("budget")
            .and_then(Value::as_f64)
            .ok_or_else(|| ProducerError::InvalidQuery {
                source_name: self.source().to_string(),
                message: "`budget` is required".to_string(),
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let campaign_id = format!("cmp_{id}");
        tracing::info!(campaign_id = %campaign_id, name = %name, budget, "campaign created");
        Ok(json!({
            "campaign_id": campaign_id,
            "status": "created",
        }))
    }
}
