//! Mock decision units.
//!
//! Each unit stands in for an LLM-backed agent and produces deterministic
//! text derived from the prompt context's data. Units that feed typed steps
//! return JSON documents — the step bodies parse and shape-validate them,
//! so there is no scraping of markdown markers out of free text.

use async_trait::async_trait;
use serde_json::{json, Value};

use tidemark_engine::{DecisionUnit, PromptContext, UnitError};

// ---------------------------------------------------------------------------
// Analytics summariser
// ---------------------------------------------------------------------------

/// Summarises aggregated channel analytics into an overview a strategist
/// can recommend campaigns from.
pub struct AnalyticsSummaryUnit;

#[async_trait]
impl DecisionUnit for AnalyticsSummaryUnit {
    fn name(&self) -> &str {
        "analytics"
    }

    async fn generate(&self, context: PromptContext) -> Result<String, UnitError> {
        let data = &context.data;
        let date_range = data
            .get("date_range")
            .and_then(Value::as_str)
            .unwrap_or("the requested period");

        let mut channels: Vec<String> = Vec::new();
        let mut highlights: Vec<String> = Vec::new();
        let mut top_channel: Option<(&str, f64)> = None;
        let mut consider = |name: &'static str, reach: f64| {
            if top_channel.map_or(true, |(_, best)| reach > best) {
                top_channel = Some((name, reach));
            }
        };

        if let Some(ga) = data.get("ga") {
            let users = ga["users"].as_f64().unwrap_or(0.0);
            channels.push(format!(
                "Google Analytics: {users:.0} users over {:.0} sessions, {:.0}% bounce rate",
                ga["sessions"].as_f64().unwrap_or(0.0),
                ga["bounce_rate"].as_f64().unwrap_or(0.0) * 100.0,
            ));
            consider("ga", users);
        }
        if let Some(gsc) = data.get("gsc") {
            let clicks = gsc["clicks"].as_f64().unwrap_or(0.0);
            channels.push(format!(
                "Search Console: {clicks:.0} clicks from {:.0} impressions ({:.1}% CTR, avg position {:.1})",
                gsc["impressions"].as_f64().unwrap_or(0.0),
                gsc["ctr"].as_f64().unwrap_or(0.0) * 100.0,
                gsc["position"].as_f64().unwrap_or(0.0),
            ));
            consider("gsc", clicks);
            highlights.push("organic search CTR has headroom against its average position".to_string());
        }
        if let Some(fb) = data.get("facebook") {
            let reach = fb["reach"].as_f64().unwrap_or(0.0);
            channels.push(format!(
                "Facebook: {reach:.0} reach, {:.0} clicks on ${:.0} spend ({:.1}% CTR)",
                fb["clicks"].as_f64().unwrap_or(0.0),
                fb["spend"].as_f64().unwrap_or(0.0),
                fb["ctr"].as_f64().unwrap_or(0.0) * 100.0,
            ));
            consider("facebook", reach);
            highlights.push("paid social CTR trails organic; creatives are due a refresh".to_string());
        }
        if let Some(ig) = data.get("instagram") {
            let reach = ig["reach"].as_f64().unwrap_or(0.0);
            channels.push(format!(
                "Instagram: {reach:.0} reach with {:.0} engagements and {:.0} profile visits",
                ig["engagement"].as_f64().unwrap_or(0.0),
                ig["profile_visits"].as_f64().unwrap_or(0.0),
            ));
            consider("instagram", reach);
            highlights.push("Instagram engagement converts to profile visits at a healthy rate".to_string());
        }

        if channels.is_empty() {
            return Err(UnitError::Generation {
                unit: self.name().to_string(),
                message: "no channel data to summarise".to_string(),
            });
        }

        let top = top_channel.map(|(name, _)| name).unwrap_or("ga");
        let summary = format!(
            "Overview for {date_range}: {count} channels reporting. Channel performance — {channels}. \
             Key metrics favour {top} on raw reach. Issues/Opportunities: {issues}. \
             Summary: consolidate spend behind the strongest channel while testing fixes for the laggards.",
            count = channels.len(),
            channels = channels.join("; "),
            issues = if highlights.is_empty() {
                "none flagged".to_string()
            } else {
                highlights.join("; ")
            },
        );

        Ok(json!({
            "summary": summary,
            "top_channel": top,
            "highlights": highlights,
        })
        .to_string())
    }
}

// ---------------------------------------------------------------------------
// Campaign strategist
// ---------------------------------------------------------------------------

/// Recommends campaign ideas from an analytics summary: always three, two
/// running 7 days and one running 14.
pub struct CampaignStrategistUnit;

#[async_trait]
impl DecisionUnit for CampaignStrategistUnit {
    fn name(&self) -> &str {
        "strategist"
    }

    async fn generate(&self, _context: PromptContext) -> Result<String, UnitError> {
        Ok(json!({
            "ideas": [
                {
                    "duration_days": 7,
                    "idea": "Scale top-performing ad sets by 20% and A/B test new creatives.",
                },
                {
                    "duration_days": 7,
                    "idea": "Run a retargeting campaign for cart abandoners with a limited-time offer.",
                },
                {
                    "duration_days": 14,
                    "idea": "Launch a full-funnel campaign with awareness, consideration, and conversion objectives.",
                },
            ],
        })
        .to_string())
    }
}

// ---------------------------------------------------------------------------
// Campaign planner
// ---------------------------------------------------------------------------

/// Expands a selected campaign idea into a detailed execution plan with
/// objectives, audience, creatives, schedule, budget allocation, and
/// success metrics.
pub struct CampaignPlannerUnit;

#[async_trait]
impl DecisionUnit for CampaignPlannerUnit {
    fn name(&self) -> &str {
        "planner"
    }

    async fn generate(&self, context: PromptContext) -> Result<String, UnitError> {
        let idea = context.data.get("idea").cloned().unwrap_or(Value::Null);
        let idea_text = idea
            .get("idea")
            .and_then(Value::as_str)
            .unwrap_or("the selected campaign");
        let duration = idea.get("duration_days").and_then(Value::as_u64).unwrap_or(7);

        let plan = format!(
            "## Objectives\n\
             Deliver on \"{idea_text}\" with a measurable lift in conversions over {duration} days.\n\n\
             ## Audience\n\
             Warm audiences from the analysed channels, plus a 1% lookalike seeded from recent converters.\n\n\
             ## Creatives\n\
             Two ad variants per placement; refresh the weaker variant at the midpoint of the flight.\n\n\
             ## Schedule\n\
             Day 1 launch, daily pacing checks, creative review on day {midpoint}, wrap on day {duration}.\n\n\
             ## Budget allocation\n\
             70% to the proven channel, 20% to the test cell, 10% held back for scaling the winner.\n\n\
             ## Success metrics\n\
             CTR at or above target, cost per conversion within 10% of the trailing average, and positive ROAS by day {duration}.",
            midpoint = duration.div_ceil(2),
        );

        Ok(json!({ "plan": plan }).to_string())
    }
}

// ---------------------------------------------------------------------------
// Daily monitor
// ---------------------------------------------------------------------------

/// Produces a daily performance summary plus concrete optimization
/// suggestions, referencing the actual KPI figures it was given.
pub struct DailyMonitorUnit;

#[async_trait]
impl DecisionUnit for DailyMonitorUnit {
    fn name(&self) -> &str {
        "monitor"
    }

    async fn generate(&self, context: PromptContext) -> Result<String, UnitError> {
        let data = &context.data;
        let kpis = data.get("kpis").cloned().unwrap_or(Value::Null);
        let campaign_id = data
            .get("campaign_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let day_note = data
            .get("day")
            .and_then(Value::as_u64)
            .map(|d| format!(" (day {d} of the flight)"))
            .unwrap_or_default();
        let status = data
            .get("ctr_status")
            .and_then(Value::as_str)
            .unwrap_or("below_target");

        let ctr = kpis["ctr"].as_f64().unwrap_or(0.0);
        let target_ctr = kpis["target_ctr"].as_f64().unwrap_or(0.0);
        let conversions = kpis["conversions"].as_f64().unwrap_or(0.0);
        let spend = kpis["spend"].as_f64().unwrap_or(0.0);
        let clicks = kpis["clicks"].as_f64().unwrap_or(0.0);

        let on_track = status == "above_target";
        let summary = format!(
            "Campaign {campaign_id}{day_note}: CTR {ctr_pct:.2}% against a {target_pct:.2}% target ({status}), \
             {conversions:.0} conversions from {clicks:.0} clicks on ${spend:.2} spend. \
             The campaign is {track}.",
            ctr_pct = ctr * 100.0,
            target_pct = target_ctr * 100.0,
            track = if on_track { "on track" } else { "off track" },
        );

        let suggestions = if on_track {
            vec![
                format!(
                    "Scale the winning ad sets by 20% while CTR holds above the {target_pct:.2}% target.",
                    target_pct = target_ctr * 100.0
                ),
                "Expand lookalike audiences seeded from this campaign's converters.".to_string(),
                format!(
                    "Reinvest part of the ${spend:.2} spend into the top placement before fatigue sets in."
                ),
            ]
        } else {
            vec![
                format!(
                    "Pause ad sets running below the {target_pct:.2}% CTR target and shift budget to the rest.",
                    target_pct = target_ctr * 100.0
                ),
                "Refresh creatives; the current variants are past their engagement peak.".to_string(),
                format!(
                    "Tighten targeting to the segments behind the {conversions:.0} conversions so far."
                ),
            ]
        };

        Ok(json!({
            "summary": summary,
            "suggestions": suggestions,
        })
        .to_string())
    }
}
