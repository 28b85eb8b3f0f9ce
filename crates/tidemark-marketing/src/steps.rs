//! Step handlers for the campaign and daily-monitor workflows.
//!
//! Each step is a thin orchestration layer: it calls the producers and
//! decision units it declared, parses their structured responses, threads
//! results through run state, and produces typed output. The two
//! user-facing steps (`select-campaign`, `approve-plan`) suspend the run
//! and are re-entered with the caller's resume value.

use async_trait::async_trait;
use serde_json::{json, Value};

use tidemark_engine::{
    FieldDef, FieldType, PromptContext, Shape, StepCtx, StepError, StepHandler, StepMeta,
    StepOutcome,
};

use crate::producers::{kpi_status, CAMPAIGN_ID_PATTERN};

// ---------------------------------------------------------------------------
// Shared shapes
// ---------------------------------------------------------------------------

pub(crate) fn campaign_input_shape() -> Shape {
    Shape::object("campaign_input")
        .field("date_range", FieldDef::string().min_length(1))
        .field(
            "sources",
            FieldDef::array(FieldType::String).one_of(["ga", "gsc", "facebook", "instagram"]),
        )
        .field("campaign_name", FieldDef::string().optional())
        .field("budget", FieldDef::number().optional().min(0.0))
}

pub(crate) fn summary_shape(name: &str) -> Shape {
    Shape::object(name).field("summary", FieldDef::string())
}

pub(crate) fn ideas_shape(name: &str) -> Shape {
    Shape::object(name).field("ideas", FieldDef::array(FieldType::Object))
}

pub(crate) fn selection_shape(name: &str) -> Shape {
    Shape::object(name)
        .field("selected_index", FieldDef::integer().min(0.0))
        .field("selected_idea", FieldDef::object())
}

pub(crate) fn plan_shape(name: &str) -> Shape {
    Shape::object(name).field("plan", FieldDef::string())
}

pub(crate) fn approval_shape(name: &str) -> Shape {
    Shape::object(name).field("approved", FieldDef::boolean())
}

pub(crate) fn campaign_result_shape(name: &str) -> Shape {
    Shape::object(name)
        .field("campaign_id", FieldDef::string())
        .field("status", FieldDef::string())
}

pub(crate) fn monitor_input_shape() -> Shape {
    Shape::object("monitor_input")
        .field(
            "campaign_id",
            FieldDef::string()
                .min_length(1)
                .max_length(128)
                .pattern(CAMPAIGN_ID_PATTERN),
        )
        .field("day", FieldDef::integer().optional().min(1.0))
}

pub(crate) fn monitor_output_shape(name: &str) -> Shape {
    Shape::object(name)
        .field("summary", FieldDef::string())
        .field("suggestions", FieldDef::string())
}

/// Parse a decision unit's JSON response, mapping malformed text to a
/// step failure naming the unit.
fn parse_unit_json(unit: &str, text: &str) -> Result<Value, StepError> {
    serde_json::from_str(text)
        .map_err(|e| StepError::fatal(format!("unit `{unit}` returned malformed JSON: {e}")))
}

fn require_str<'a>(doc: &'a Value, field: &str, unit: &str) -> Result<&'a str, StepError> {
    doc.get(field).and_then(Value::as_str).ok_or_else(|| {
        StepError::fatal(format!("unit `{unit}` response is missing `{field}`"))
    })
}

// ---------------------------------------------------------------------------
// analyze-analytics
// ---------------------------------------------------------------------------

/// Fetches channel analytics for the requested sources and has the
/// analytics unit summarise them. Stashes the caller's campaign name and
/// budget into run state for the execute step at the end of the run.
pub struct AnalyzeAnalyticsStep;

#[async_trait]
impl StepHandler for AnalyzeAnalyticsStep {
    fn meta(&self) -> StepMeta {
        StepMeta {
            name: "analyze-analytics".to_string(),
            description: "Fetch and analyze analytics from requested sources".to_string(),
            input: campaign_input_shape(),
            output: summary_shape("analyze_output"),
            resume: None,
            suspend: None,
            requires: vec!["channel_analytics".to_string(), "analytics".to_string()],
        }
    }

    async fn execute(&self, input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError> {
        if let Some(name) = input.get("campaign_name") {
            ctx.state_set("campaign_name", name.clone()).await;
        }
        if let Some(budget) = input.get("budget") {
            ctx.state_set("budget", budget.clone()).await;
        }

        let date_range = input["date_range"].as_str().unwrap_or_default();
        let analytics = ctx
            .producer("channel_analytics")?
            .fetch(json!({
                "date_range": date_range,
                "sources": input["sources"],
            }))
            .await?;
        ctx.emit("analytics_fetched", json!({"date_range": date_range}));

        let prompt = format!(
            "Analyze analytics for date range {date_range} and produce a structured summary \
             covering overview, channel performance, key metrics, and issues."
        );
        let text = ctx
            .unit("analytics")?
            .generate(PromptContext::new(prompt).with_data(analytics))
            .await?;
        let doc = parse_unit_json("analytics", &text)?;
        let summary = require_str(&doc, "summary", "analytics")?;

        ctx.state_set("analytics_summary", json!(summary)).await;
        Ok(StepOutcome::Output(json!({ "summary": summary })))
    }
}

// ---------------------------------------------------------------------------
// recommend-campaigns
// ---------------------------------------------------------------------------

/// Asks the strategist for campaign ideas (three: two 7-day, one 14-day).
pub struct RecommendCampaignsStep;

#[async_trait]
impl StepHandler for RecommendCampaignsStep {
    fn meta(&self) -> StepMeta {
        StepMeta {
            name: "recommend-campaigns".to_string(),
            description: "Recommend 3 campaign ideas (2x7d, 1x14d)".to_string(),
            input: summary_shape("recommend_input"),
            output: ideas_shape("recommend_output"),
            resume: None,
            suspend: None,
            requires: vec!["strategist".to_string()],
        }
    }

    async fn execute(&self, input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError> {
        let text = ctx
            .unit("strategist")?
            .generate(
                PromptContext::new("Recommend campaign ideas from this analytics summary.")
                    .with_data(json!({"analytics_summary": input["summary"]})),
            )
            .await?;
        let doc = parse_unit_json("strategist", &text)?;
        let ideas = doc
            .get("ideas")
            .and_then(Value::as_array)
            .ok_or_else(|| StepError::fatal("unit `strategist` response is missing `ideas`"))?;
        if ideas.is_empty() {
            return Err(StepError::fatal("strategist recommended no ideas"));
        }

        Ok(StepOutcome::Output(json!({ "ideas": ideas })))
    }
}

// ---------------------------------------------------------------------------
// select-campaign
// ---------------------------------------------------------------------------

/// Suspends until the caller picks one of the recommended ideas. An
/// out-of-range selection re-suspends with the same options rather than
/// failing the run.
pub struct SelectCampaignStep;

#[async_trait]
impl StepHandler for SelectCampaignStep {
    fn meta(&self) -> StepMeta {
        StepMeta {
            name: "select-campaign".to_string(),
            description: "Wait for the user to select a campaign".to_string(),
            input: ideas_shape("select_input"),
            output: selection_shape("select_output"),
            resume: Some(
                Shape::object("select_resume")
                    .field("selected_index", FieldDef::integer().min(0.0)),
            ),
            suspend: Some(
                Shape::object("select_suspend")
                    .field("reason", FieldDef::string())
                    .field("ideas", FieldDef::array(FieldType::Object)),
            ),
            requires: vec![],
        }
    }

    async fn execute(&self, input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError> {
        let ideas = input["ideas"].as_array().cloned().unwrap_or_default();

        let selected = ctx
            .resume_value()
            .and_then(|v| v.get("selected_index"))
            .and_then(Value::as_u64);

        let index = match selected {
            None => {
                return Ok(StepOutcome::Suspend(json!({
                    "reason": format!("Please select a campaign (0 to {}).", ideas.len().saturating_sub(1)),
                    "ideas": ideas,
                })));
            }
            Some(index) if index as usize >= ideas.len() => {
                return Ok(StepOutcome::Suspend(json!({
                    "reason": format!(
                        "Selected index {index} is out of range; pick 0 to {}.",
                        ideas.len().saturating_sub(1)
                    ),
                    "ideas": ideas,
                })));
            }
            Some(index) => index as usize,
        };

        let selected_idea = ideas[index].clone();
        ctx.state_set("selected_idea", selected_idea.clone()).await;
        Ok(StepOutcome::Output(json!({
            "selected_index": index,
            "selected_idea": selected_idea,
        })))
    }
}

// ---------------------------------------------------------------------------
// create-plan
// ---------------------------------------------------------------------------

/// Has the planner expand the selected idea into a detailed execution plan.
pub struct CreatePlanStep;

#[async_trait]
impl StepHandler for CreatePlanStep {
    fn meta(&self) -> StepMeta {
        StepMeta {
            name: "create-plan".to_string(),
            description: "Create a detailed execution plan for the selected campaign".to_string(),
            input: selection_shape("plan_input"),
            output: plan_shape("plan_output"),
            resume: None,
            suspend: None,
            requires: vec!["planner".to_string()],
        }
    }

    async fn execute(&self, input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError> {
        let prompt = "Create a detailed execution plan for this campaign idea. Include \
                      objectives, audience, creatives, schedule, budget allocation, and \
                      success metrics in markdown.";
        let text = ctx
            .unit("planner")?
            .generate(
                PromptContext::new(prompt).with_data(json!({"idea": input["selected_idea"]})),
            )
            .await?;
        let doc = parse_unit_json("planner", &text)?;
        let plan = require_str(&doc, "plan", "planner")?;

        ctx.state_set("plan", json!(plan)).await;
        Ok(StepOutcome::Output(json!({ "plan": plan })))
    }
}

// ---------------------------------------------------------------------------
// approve-plan
// ---------------------------------------------------------------------------

/// Suspends until the caller approves or rejects the plan. Rejection bails
/// the run; there is nothing left to execute.
pub struct ApprovePlanStep;

#[async_trait]
impl StepHandler for ApprovePlanStep {
    fn meta(&self) -> StepMeta {
        StepMeta {
            name: "approve-plan".to_string(),
            description: "Wait for the user to approve the plan".to_string(),
            input: plan_shape("approve_input"),
            output: approval_shape("approve_output"),
            resume: Some(Shape::object("approve_resume").field("approved", FieldDef::boolean())),
            suspend: Some(
                Shape::object("approve_suspend")
                    .field("reason", FieldDef::string())
                    .field("plan", FieldDef::string()),
            ),
            requires: vec![],
        }
    }

    async fn execute(&self, input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError> {
        match ctx
            .resume_value()
            .and_then(|v| v.get("approved"))
            .and_then(Value::as_bool)
        {
            Some(false) => Ok(StepOutcome::Bail(json!({"reason": "plan rejected"}))),
            Some(true) => Ok(StepOutcome::Output(json!({"approved": true}))),
            None => Ok(StepOutcome::Suspend(json!({
                "reason": "Please review and approve or reject the plan.",
                "plan": input["plan"],
            }))),
        }
    }
}

// ---------------------------------------------------------------------------
// execute-campaign
// ---------------------------------------------------------------------------

/// Creates the campaign through the directory, using the name and budget
/// stashed in run state at the start of the run (with defaults when the
/// caller supplied neither).
pub struct ExecuteCampaignStep;

#[async_trait]
impl StepHandler for ExecuteCampaignStep {
    fn meta(&self) -> StepMeta {
        StepMeta {
            name: "execute-campaign".to_string(),
            description: "Create the campaign".to_string(),
            input: approval_shape("execute_input"),
            output: campaign_result_shape("execute_output"),
            resume: None,
            suspend: None,
            requires: vec!["campaign_directory".to_string()],
        }
    }

    async fn execute(&self, _input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError> {
        let name = match ctx.state_get("campaign_name").await {
            Some(Value::String(name)) => name,
            _ => format!("campaign-{}", short_run_id(ctx.run_id())),
        };
        let budget = ctx
            .state_get("budget")
            .await
            .and_then(|v| v.as_f64())
            .unwrap_or(500.0);

        let created = ctx
            .producer("campaign_directory")?
            .fetch(json!({"name": name, "budget": budget}))
            .await?;
        let campaign_id = created
            .get("campaign_id")
            .and_then(Value::as_str)
            .ok_or_else(|| StepError::fatal("campaign directory returned no `campaign_id`"))?;

        ctx.state_set("campaign_id", json!(campaign_id)).await;
        ctx.emit("campaign_created", json!({"campaign_id": campaign_id}));
        Ok(StepOutcome::Output(json!({
            "campaign_id": campaign_id,
            "status": created["status"],
        })))
    }
}

fn short_run_id(run_id: &str) -> &str {
    run_id.get(..8).unwrap_or(run_id)
}

// ---------------------------------------------------------------------------
// monitor-daily
// ---------------------------------------------------------------------------

/// Fetches campaign KPIs, compares CTR to target, and has the monitor unit
/// produce a daily summary with 2-4 optimization suggestions.
pub struct MonitorDailyStep;

#[async_trait]
impl StepHandler for MonitorDailyStep {
    fn meta(&self) -> StepMeta {
        StepMeta {
            name: "monitor-daily".to_string(),
            description: "Fetch campaign KPIs, compare to target, and produce a daily summary \
                          with optimization suggestions"
                .to_string(),
            input: monitor_input_shape(),
            output: monitor_output_shape("monitor_output"),
            resume: None,
            suspend: None,
            requires: vec!["campaign_kpis".to_string(), "monitor".to_string()],
        }
    }

    async fn execute(&self, input: Value, ctx: &StepCtx) -> Result<StepOutcome, StepError> {
        let campaign_id = input["campaign_id"].as_str().unwrap_or_default();
        let kpis = ctx
            .producer("campaign_kpis")?
            .fetch(json!({"campaign_id": campaign_id}))
            .await?;

        let ctr = kpis["ctr"].as_f64().unwrap_or(0.0);
        let target_ctr = kpis["target_ctr"].as_f64().unwrap_or(0.0);
        let status = kpi_status(ctr, target_ctr);
        ctx.emit("kpi_compared", json!({"ctr": ctr, "target_ctr": target_ctr, "status": status}));

        let text = ctx
            .unit("monitor")?
            .generate(
                PromptContext::new(
                    "Produce a daily performance summary and 2-4 concrete optimization suggestions.",
                )
                .with_data(json!({
                    "campaign_id": campaign_id,
                    "day": input.get("day"),
                    "kpis": kpis,
                    "ctr_status": status,
                })),
            )
            .await?;
        let doc = parse_unit_json("monitor", &text)?;
        let summary = require_str(&doc, "summary", "monitor")?;
        let suggestions = doc
            .get("suggestions")
            .and_then(Value::as_array)
            .ok_or_else(|| StepError::fatal("unit `monitor` response is missing `suggestions`"))?;

        let numbered = suggestions
            .iter()
            .filter_map(Value::as_str)
            .enumerate()
            .map(|(i, s)| format!("{}. {s}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(StepOutcome::Output(json!({
            "summary": summary,
            "suggestions": numbered,
        })))
    }
}
