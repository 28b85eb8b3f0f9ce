//! Marketing campaign automation on top of the tidemark engine.
//!
//! Two workflows: a campaign workflow that analyzes channel analytics,
//! recommends campaign ideas, pauses for the user's selection and plan
//! approval, then creates the campaign — and a daily monitor workflow that
//! checks a campaign's KPIs against target and suggests optimizations.
//!
//! The analytic sources and decision units are mock collaborators behind
//! the engine's [`DataProducer`](tidemark_engine::DataProducer) and
//! [`DecisionUnit`](tidemark_engine::DecisionUnit) seams; swap in real
//! integrations without touching the steps.
//!
//! ```rust,ignore
//! let executor = marketing_executor(ExecutorOptions::default())?;
//! let handle = executor.start(CAMPAIGN_WORKFLOW_ID, json!({
//!     "date_range": "last_30_days",
//!     "sources": ["ga", "facebook"],
//! })).await?;
//! ```

pub mod producers;
pub mod scorers;
pub mod steps;
pub mod units;
pub mod workflows;

use tidemark_engine::{DefinitionError, Executor};

pub use producers::{
    kpi_status, CampaignDirectory, CampaignKpiProducer, ChannelAnalyticsProducer,
    CAMPAIGN_ID_PATTERN,
};
pub use scorers::{
    MonitoringRelevancyScorer, PlanStructureScorer, StrategyFormatScorer,
    SummaryCompletenessScorer,
};
pub use units::{
    AnalyticsSummaryUnit, CampaignPlannerUnit, CampaignStrategistUnit, DailyMonitorUnit,
};
pub use workflows::{
    campaign_workflow, monitor_daily_workflow, CAMPAIGN_WORKFLOW_ID, MONITOR_DAILY_WORKFLOW_ID,
};

/// Options for assembling the stock marketing executor.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Sampling ratio for the domain scorers. 0 disables scoring.
    pub score_sampling: f64,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            score_sampling: 0.2,
        }
    }
}

/// Assemble an executor with both marketing workflows, the mock
/// collaborators, and the domain scorers. Uses the in-memory run store;
/// pass a custom store through [`Executor::builder`] directly when
/// durability across restarts is needed.
pub fn marketing_executor(options: ExecutorOptions) -> Result<Executor, DefinitionError> {
    Ok(Executor::builder()
        .workflow(campaign_workflow()?)
        .workflow(monitor_daily_workflow()?)
        .producer(ChannelAnalyticsProducer)
        .producer(CampaignKpiProducer)
        .producer(CampaignDirectory::new())
        .unit(AnalyticsSummaryUnit)
        .unit(CampaignStrategistUnit)
        .unit(CampaignPlannerUnit)
        .unit(DailyMonitorUnit)
        .scorer(SummaryCompletenessScorer)
        .scorer(StrategyFormatScorer)
        .scorer(PlanStructureScorer)
        .scorer(MonitoringRelevancyScorer)
        .score_sampling(options.score_sampling)
        .build())
}
