//! Heuristic evaluation scorers for the marketing workflows.
//!
//! Each scorer judges one sampled (input, output) pair and returns a score
//! in `[0, 1]` with a rationale. They are deterministic re-expressions of
//! the checks an LLM judge would make: section coverage, idea format,
//! plan structure, suggestion relevancy.

use serde_json::Value;

use tidemark_engine::{ScoreOutcome, Scorer};

fn parse(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// Coverage of the analytics summary: overview, channel performance, key
/// metrics, and a closing summary should all be present.
pub struct SummaryCompletenessScorer;

impl Scorer for SummaryCompletenessScorer {
    fn name(&self) -> &str {
        "summary-completeness"
    }

    fn score(&self, _input_text: &str, output_text: &str) -> ScoreOutcome {
        let summary = parse(output_text)
            .and_then(|doc| doc.get("summary").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| output_text.to_string())
            .to_lowercase();

        let markers = ["overview", "channel", "metric", "summary"];
        let missing: Vec<&str> = markers
            .iter()
            .copied()
            .filter(|m| !summary.contains(m))
            .collect();
        let score = (markers.len() - missing.len()) as f64 / markers.len() as f64;

        ScoreOutcome {
            score,
            rationale: if missing.is_empty() {
                "summary covers every expected section".to_string()
            } else {
                format!("summary is missing: {}", missing.join(", "))
            },
        }
    }
}

/// The strategist must recommend exactly 3 ideas: two for 7 days and one
/// for 14 days.
pub struct StrategyFormatScorer;

impl Scorer for StrategyFormatScorer {
    fn name(&self) -> &str {
        "strategy-format"
    }

    fn score(&self, _input_text: &str, output_text: &str) -> ScoreOutcome {
        let ideas = parse(output_text)
            .and_then(|doc| doc.get("ideas").and_then(Value::as_array).cloned())
            .unwrap_or_default();

        let durations: Vec<u64> = ideas
            .iter()
            .filter_map(|i| i.get("duration_days").and_then(Value::as_u64))
            .collect();
        let seven = durations.iter().filter(|d| **d == 7).count();
        let fourteen = durations.iter().filter(|d| **d == 14).count();
        let ok = ideas.len() == 3 && seven == 2 && fourteen == 1;

        ScoreOutcome {
            score: if ok { 1.0 } else { 0.0 },
            rationale: format!(
                "{} ideas ({seven}x7d, {fourteen}x14d); expected 3 (2x7d, 1x14d)",
                ideas.len()
            ),
        }
    }
}

/// The plan should carry objectives, audience, creatives, schedule, and
/// success metrics sections.
pub struct PlanStructureScorer;

impl Scorer for PlanStructureScorer {
    fn name(&self) -> &str {
        "plan-structure"
    }

    fn score(&self, _input_text: &str, output_text: &str) -> ScoreOutcome {
        let plan = parse(output_text)
            .and_then(|doc| doc.get("plan").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| output_text.to_string())
            .to_lowercase();

        let sections = ["objective", "audience", "creative", "schedule", "metric"];
        let present = sections.iter().filter(|s| plan.contains(**s)).count();
        let score = present as f64 / sections.len() as f64;

        ScoreOutcome {
            score,
            rationale: format!("{present}/{} required plan sections present", sections.len()),
        }
    }
}

/// Suggestions should reference the campaign's actual figures: at least one
/// number from the KPI input must reappear in the output.
pub struct MonitoringRelevancyScorer;

impl Scorer for MonitoringRelevancyScorer {
    fn name(&self) -> &str {
        "monitoring-relevancy"
    }

    fn score(&self, input_text: &str, output_text: &str) -> ScoreOutcome {
        let input_numbers = extract_numbers(input_text);
        let output_numbers = extract_numbers(output_text);
        let shared = output_numbers
            .iter()
            .filter(|n| input_numbers.contains(*n))
            .count();

        if output_numbers.is_empty() {
            return ScoreOutcome {
                score: 0.0,
                rationale: "output references no figures at all".to_string(),
            };
        }

        ScoreOutcome {
            score: if shared > 0 { 1.0 } else { 0.4 },
            rationale: format!("{shared} figures from the KPI context reappear in the output"),
        }
    }
}

/// Digit runs of two or more characters, enough to tell "references the
/// data" apart from counting list markers.
fn extract_numbers(text: &str) -> Vec<String> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else {
            if current.len() >= 2 {
                numbers.push(current.clone());
            }
            current.clear();
        }
    }
    if current.len() >= 2 {
        numbers.push(current);
    }
    numbers
}
