//! Quota types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remaining quota for one model on one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelQuota {
    pub model_name: String,

    /// Remaining quota as a fraction in `[0.0, 1.0]`.
    pub remaining_fraction: f64,

    /// When the model's quota resets, if the upstream reported it.
    pub reset_time: Option<DateTime<Utc>>,
}

impl ModelQuota {
    /// Create a model quota entry.
    pub fn new(
        model_name: impl Into<String>,
        remaining_fraction: f64,
        reset_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            remaining_fraction: remaining_fraction.clamp(0.0, 1.0),
            reset_time,
        }
    }

    /// Remaining quota as a percentage in `[0.0, 100.0]`.
    pub fn percentage(&self) -> f64 {
        self.remaining_fraction * 100.0
    }
}

/// The account-level view of a set of model quotas: the tightest model wins.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaSummary {
    /// Minimum remaining fraction across all models.
    pub remaining_fraction: f64,

    /// Earliest reset among the models at that minimum.
    pub reset_time: Option<DateTime<Utc>>,
}

impl QuotaSummary {
    /// Summarize per-model quotas.
    ///
    /// An empty set means the upstream reported nothing to be limited by,
    /// which counts as fully available.
    pub fn from_models(models: &[ModelQuota]) -> Self {
        let Some(min) = models
            .iter()
            .map(|m| m.remaining_fraction)
            .min_by(|a, b| a.total_cmp(b))
        else {
            return Self {
                remaining_fraction: 1.0,
                reset_time: None,
            };
        };

        let reset_time = models
            .iter()
            .filter(|m| m.remaining_fraction == min)
            .filter_map(|m| m.reset_time)
            .min();

        Self {
            remaining_fraction: min,
            reset_time,
        }
    }

    /// Whether the summary is at or below a low-quota threshold fraction.
    pub fn is_low(&self, threshold: f64) -> bool {
        self.remaining_fraction <= threshold
    }
}

/// Result of a successful quota poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaSnapshot {
    /// Remaining quota, rounded, out of `total`.
    pub remaining: u8,

    /// Always 100.
    pub total: u8,

    /// Unrounded remaining percentage.
    pub percentage: f64,
}

impl QuotaSnapshot {
    /// Build a snapshot from a remaining fraction.
    pub fn from_fraction(fraction: f64) -> Self {
        let percentage = fraction.clamp(0.0, 1.0) * 100.0;
        Self {
            remaining: percentage.round() as u8,
            total: 100,
            percentage,
        }
    }
}

impl From<&QuotaSummary> for QuotaSnapshot {
    fn from(summary: &QuotaSummary) -> Self {
        Self::from_fraction(summary.remaining_fraction)
    }
}
