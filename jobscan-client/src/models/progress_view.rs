//! Progress display state driven by accepted progress events

use jobscan_common::events::{DescriptionMode, Step, StepStatus};
use serde::Serialize;

/// Description fragments that mean the backend is waiting out a limit
const RATE_LIMIT_MARKERS: [&str; 7] = [
    "rate limit",
    "rate-limit",
    "429",
    "quota",
    "backoff",
    "api 限制",
    "等待",
];

/// Description fragments that mean the backend is retrying right now
const RETRY_MARKERS: [&str; 4] = ["retrying", "retry", "重試", "重新嘗試"];

/// Classify a description for presentation
///
/// Display-only; control flow never depends on the result. An explicit retry
/// flag from the backend wins over keyword matching.
pub fn classify_description(description: &str, retry_flag: Option<bool>) -> DescriptionMode {
    let lower = description.to_lowercase();
    let waiting = RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m));

    match retry_flag {
        Some(true) if waiting => DescriptionMode::RateLimitWait,
        Some(true) => DescriptionMode::Retrying,
        Some(false) => DescriptionMode::Normal,
        None if waiting => DescriptionMode::RateLimitWait,
        None if RETRY_MARKERS.iter().any(|m| lower.contains(m)) => DescriptionMode::Retrying,
        None => DescriptionMode::Normal,
    }
}

/// Visible progress indicator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    /// Displayed percentage, 0-100
    pub percentage: f64,
    /// Status per step, indexed by `Step::index`
    pub steps: [StepStatus; 4],
    pub current_step: Option<Step>,
    pub description: String,
    pub mode: DescriptionMode,
}

impl Default for ProgressView {
    fn default() -> Self {
        Self {
            percentage: 0.0,
            steps: [StepStatus::Pending; 4],
            current_step: None,
            description: String::new(),
            mode: DescriptionMode::Normal,
        }
    }
}

impl ProgressView {
    /// Initial display for a new submission: upload step active, 0%
    pub fn reset(&mut self) {
        *self = Self::default();
        self.steps[Step::Upload.index()] = StepStatus::Active;
        self.current_step = Some(Step::Upload);
    }

    /// Apply one accepted progress report
    ///
    /// Percentage becomes `max(previous, clamp(reported, 0, 100))`. A step from
    /// the list marks earlier steps completed and itself active; later steps
    /// keep their status. Step names outside the list leave steps alone.
    pub fn apply(&mut self, step_name: &str, reported: f64, description: &str, retry: Option<bool>) {
        let reported = if reported.is_finite() { reported } else { 0.0 };
        self.percentage = self.percentage.max(reported.clamp(0.0, 100.0));

        if let Some(step) = Step::from_wire(step_name) {
            let current = step.index();
            for (index, status) in self.steps.iter_mut().enumerate() {
                if index < current {
                    *status = StepStatus::Completed;
                } else if index == current {
                    *status = StepStatus::Active;
                }
            }
            self.current_step = Some(step);
        }

        if !description.is_empty() {
            self.description = description.to_string();
            self.mode = classify_description(description, retry);
        }
    }

    /// Completion display: 100% and every step completed
    pub fn force_complete(&mut self) {
        self.percentage = 100.0;
        self.steps = [StepStatus::Completed; 4];
        self.current_step = Some(Step::Complete);
        self.mode = DescriptionMode::Normal;
    }

    pub fn step_status(&self, step: Step) -> StepStatus {
        self.steps[step.index()]
    }
}
