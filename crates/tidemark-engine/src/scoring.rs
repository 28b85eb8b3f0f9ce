//! Sampling harness for the evaluation scorers.
//!
//! Scorers receive (input, output) text pairs sampled at a configured rate
//! and return a numeric score plus rationale. Purely observational: results
//! are recorded as [`RunEvent::ScoreRecorded`](crate::events::RunEvent)
//! events and never affect control flow.

use std::sync::Arc;

use rand::Rng;

use crate::traits::{ScoreOutcome, Scorer};

/// Applies every registered scorer to a sampled fraction of step
/// (input, output) pairs.
#[derive(Clone, Default)]
pub struct ScoreSampler {
    rate: f64,
    scorers: Vec<Arc<dyn Scorer>>,
}

impl ScoreSampler {
    /// A sampler with the given sampling ratio, clamped to `[0.0, 1.0]`.
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            scorers: Vec::new(),
        }
    }

    /// Register a scorer.
    pub fn scorer(mut self, scorer: impl Scorer + 'static) -> Self {
        self.scorers.push(Arc::new(scorer));
        self
    }

    /// Replace the sampling ratio, keeping the registered scorers.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }

    /// Whether this pair is in the sample. `rate >= 1.0` always samples,
    /// `rate == 0.0` (or no scorers) never does.
    pub(crate) fn should_sample(&self) -> bool {
        if self.scorers.is_empty() || self.rate <= 0.0 {
            return false;
        }
        if self.rate >= 1.0 {
            return true;
        }
        rand::rng().random::<f64>() < self.rate
    }

    /// Run every scorer over the pair.
    pub(crate) fn score_all(&self, input_text: &str, output_text: &str) -> Vec<(String, ScoreOutcome)> {
        self.scorers
            .iter()
            .map(|s| (s.name().to_string(), s.score(input_text, output_text)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthScorer;

    impl Scorer for LengthScorer {
        fn name(&self) -> &str {
            "length"
        }

        fn score(&self, _input_text: &str, output_text: &str) -> ScoreOutcome {
            let score = if output_text.len() > 10 { 1.0 } else { 0.0 };
            ScoreOutcome {
                score,
                rationale: format!("output length {}", output_text.len()),
            }
        }
    }

    #[test]
    fn zero_rate_never_samples() {
        let sampler = ScoreSampler::new(0.0).scorer(LengthScorer);
        assert!((0..100).all(|_| !sampler.should_sample()));
    }

    #[test]
    fn full_rate_always_samples() {
        let sampler = ScoreSampler::new(1.0).scorer(LengthScorer);
        assert!((0..100).all(|_| sampler.should_sample()));
    }

    #[test]
    fn empty_sampler_never_samples() {
        let sampler = ScoreSampler::new(1.0);
        assert!(!sampler.should_sample());
    }

    #[test]
    fn rate_is_clamped() {
        let sampler = ScoreSampler::new(7.5).scorer(LengthScorer);
        assert!(sampler.should_sample());
    }

    #[test]
    fn scores_every_registered_scorer() {
        let sampler = ScoreSampler::new(1.0).scorer(LengthScorer);
        let outcomes = sampler.score_all("in", "a long output text");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, "length");
        assert_eq!(outcomes[0].1.score, 1.0);
    }
}
