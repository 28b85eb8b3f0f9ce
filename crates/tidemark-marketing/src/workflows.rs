//! Workflow definitions for the marketing domain.

use tidemark_engine::{DefinitionError, WorkflowDef};

use crate::steps::{
    campaign_input_shape, campaign_result_shape, monitor_input_shape, monitor_output_shape,
    AnalyzeAnalyticsStep, ApprovePlanStep, CreatePlanStep, ExecuteCampaignStep, MonitorDailyStep,
    RecommendCampaignsStep, SelectCampaignStep,
};

pub const CAMPAIGN_WORKFLOW_ID: &str = "campaign-workflow";
pub const MONITOR_DAILY_WORKFLOW_ID: &str = "monitor-daily-workflow";

/// Analyze analytics, recommend campaigns, get user selection and plan
/// approval, then execute. Suspends twice: once for campaign selection,
/// once for plan approval; a rejected plan bails the run.
pub fn campaign_workflow() -> Result<WorkflowDef, DefinitionError> {
    WorkflowDef::builder(CAMPAIGN_WORKFLOW_ID)
        .input_shape(campaign_input_shape())
        .output_shape(campaign_result_shape("campaign_output"))
        .step(AnalyzeAnalyticsStep)
        .step(RecommendCampaignsStep)
        .step(SelectCampaignStep)
        .step(CreatePlanStep)
        .step(ApprovePlanStep)
        .step(ExecuteCampaignStep)
        .build()
}

/// Monitor daily campaign performance with optimization suggestions. Run
/// per campaign, e.g. from a scheduler or workflow runner.
pub fn monitor_daily_workflow() -> Result<WorkflowDef, DefinitionError> {
    WorkflowDef::builder(MONITOR_DAILY_WORKFLOW_ID)
        .input_shape(monitor_input_shape())
        .output_shape(monitor_output_shape("monitor_workflow_output"))
        .step(MonitorDailyStep)
        .build()
}
