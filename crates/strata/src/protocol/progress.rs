//! Stage estimation from live prose length
//!
//! The stream carries no stage markers, so progress is a heuristic over how
//! much prose has arrived. Strategies are injectable; [`ProgressTracker`]
//! layers monotonicity and completion on top of whichever one is used.

use std::sync::Arc;

/// Maps live text length to an in-progress stage index
pub trait StageEstimator: Send + Sync {
    /// Number of in-progress stages (N). Index N means complete.
    fn stage_count(&self) -> usize;

    /// Stage for the given live text length, in characters
    fn stage(&self, live_len: usize) -> usize;

    /// Human-readable name of an in-progress stage
    fn stage_name(&self, index: usize) -> Option<&str>;
}

const ANALYSIS_STAGES: [&str; 6] = [
    "Reading the tender document",
    "Identifying mandatory requirements",
    "Checking required documents",
    "Flagging risks and disqualification traps",
    "Weighing evaluation criteria",
    "Compiling final findings",
];

const DRAFTING_STAGES: [&str; 4] = [
    "Reading the tender context",
    "Outlining the section",
    "Writing the section",
    "Listing key commitments",
];

const REWRITING_STAGES: [&str; 3] = [
    "Reading the selection",
    "Rewriting the passage",
    "Summarising the changes",
];

const DEFAULT_CHARS_PER_STAGE: usize = 400;

/// Fixed-width character bands, one per stage
#[derive(Debug, Clone)]
pub struct BandedStages {
    chars_per_stage: usize,
    names: Vec<String>,
}

impl BandedStages {
    pub fn new(chars_per_stage: usize, names: Vec<String>) -> Self {
        Self {
            chars_per_stage: chars_per_stage.max(1),
            names,
        }
    }

    /// The six tender analysis stages
    pub fn analysis(chars_per_stage: usize) -> Self {
        Self::named(chars_per_stage, &ANALYSIS_STAGES)
    }

    /// Stages for drafting a proposal section
    pub fn drafting(chars_per_stage: usize) -> Self {
        Self::named(chars_per_stage, &DRAFTING_STAGES)
    }

    /// Stages for rewriting a passage
    pub fn rewriting(chars_per_stage: usize) -> Self {
        Self::named(chars_per_stage, &REWRITING_STAGES)
    }

    fn named(chars_per_stage: usize, names: &[&str]) -> Self {
        Self::new(chars_per_stage, names.iter().map(|s| s.to_string()).collect())
    }
}

impl Default for BandedStages {
    fn default() -> Self {
        Self::analysis(DEFAULT_CHARS_PER_STAGE)
    }
}

impl StageEstimator for BandedStages {
    fn stage_count(&self) -> usize {
        self.names.len()
    }

    fn stage(&self, live_len: usize) -> usize {
        (live_len / self.chars_per_stage).min(self.stage_count().saturating_sub(1))
    }

    fn stage_name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }
}

/// Adapts a plain function into an estimator
pub struct FnStages<F> {
    count: usize,
    f: F,
}

impl<F> FnStages<F>
where
    F: Fn(usize) -> usize + Send + Sync,
{
    pub fn new(count: usize, f: F) -> Self {
        Self { count, f }
    }
}

impl<F> StageEstimator for FnStages<F>
where
    F: Fn(usize) -> usize + Send + Sync,
{
    fn stage_count(&self) -> usize {
        self.count
    }

    fn stage(&self, live_len: usize) -> usize {
        (self.f)(live_len)
    }

    fn stage_name(&self, _index: usize) -> Option<&str> {
        None
    }
}

/// Monotonic stage state for one session
#[derive(Clone)]
pub struct ProgressTracker {
    estimator: Arc<dyn StageEstimator>,
    current: usize,
}

impl ProgressTracker {
    pub fn new(estimator: Arc<dyn StageEstimator>) -> Self {
        Self {
            estimator,
            current: 0,
        }
    }

    /// Re-evaluate for the new live length. Returns the new stage if it moved.
    pub fn update(&mut self, live_len: usize) -> Option<usize> {
        if self.is_complete() {
            return None;
        }
        let ceiling = self.total().saturating_sub(1);
        let estimate = self.estimator.stage(live_len).min(ceiling);
        if estimate > self.current {
            self.current = estimate;
            Some(estimate)
        } else {
            None
        }
    }

    /// Jump to N on the sentinel
    pub fn complete(&mut self) {
        self.current = self.total();
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.estimator.stage_count()
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.total()
    }

    pub fn label(&self) -> String {
        if self.is_complete() {
            return "Complete".to_string();
        }
        self.estimator
            .stage_name(self.current)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Stage {} of {}", self.current + 1, self.total()))
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current", &self.current)
            .field("total", &self.total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banded_stages() {
        let stages = BandedStages::default();
        assert_eq!(stages.stage_count(), 6);
        assert_eq!(stages.stage(0), 0);
        assert_eq!(stages.stage(399), 0);
        assert_eq!(stages.stage(400), 1);
        assert_eq!(stages.stage(1999), 4);
        // Clamped below completion while streaming
        assert_eq!(stages.stage(100_000), 5);
        assert_eq!(stages.stage_name(1), Some("Identifying mandatory requirements"));
        assert_eq!(stages.stage_name(6), None);
    }

    #[test]
    fn test_zero_band_width_does_not_divide_by_zero() {
        let stages = BandedStages::analysis(0);
        assert_eq!(stages.stage(10), 5);
    }

    #[test]
    fn test_tracker_is_monotonic() {
        // A strategy that goes backwards must not move the tracker backwards
        let wobbly = FnStages::new(4, |len| if len % 2 == 0 { 2 } else { 1 });
        let mut tracker = ProgressTracker::new(Arc::new(wobbly));

        assert_eq!(tracker.update(2), Some(2));
        assert_eq!(tracker.update(3), None);
        assert_eq!(tracker.current(), 2);
    }

    #[test]
    fn test_tracker_clamps_strategy_output() {
        let runaway = FnStages::new(3, |len| len);
        let mut tracker = ProgressTracker::new(Arc::new(runaway));
        assert_eq!(tracker.update(50), Some(2));
        assert!(!tracker.is_complete());
    }

    #[test]
    fn test_tracker_complete_and_reset() {
        let mut tracker = ProgressTracker::new(Arc::new(BandedStages::default()));
        tracker.update(900);
        assert_eq!(tracker.current(), 2);
        assert_eq!(tracker.label(), "Checking required documents");

        tracker.complete();
        assert_eq!(tracker.current(), 6);
        assert_eq!(tracker.label(), "Complete");
        assert_eq!(tracker.update(10_000), None);

        tracker.reset();
        assert_eq!(tracker.current(), 0);
        assert_eq!(tracker.label(), "Reading the tender document");
    }

    #[test]
    fn test_unnamed_stage_label() {
        let tracker = ProgressTracker::new(Arc::new(FnStages::new(3, |_| 0)));
        assert_eq!(tracker.label(), "Stage 1 of 3");
    }
}
