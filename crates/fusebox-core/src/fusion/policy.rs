use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_READY_THRESHOLD;

use super::entry::EntrySummary;

/// What counts towards the ready threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyBasis {
    /// Only successfully fused slices. A pair with a few failed slices still
    /// counts as ready as long as the rest clears the threshold.
    #[default]
    Fused,
    /// Fused and failed slices alike: any finished slice counts.
    Processed,
}

impl fmt::Display for ReadyBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fused => write!(f, "Fused slices"),
            Self::Processed => write!(f, "Processed slices"),
        }
    }
}

/// When a preload request for an already-populated key can be skipped.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadyPolicy {
    /// Fraction in [0, 1]. The completeness must reach it (inclusive).
    pub threshold: f32,
    pub basis: ReadyBasis,
}

impl ReadyPolicy {
    /// Exact completeness: every slice must be fused.
    pub fn exact() -> Self {
        Self {
            threshold: 1.0,
            basis: ReadyBasis::Fused,
        }
    }

    pub fn completeness(&self, summary: &EntrySummary) -> f32 {
        if summary.total == 0 {
            return 1.0;
        }
        let counted = match self.basis {
            ReadyBasis::Fused => summary.fused,
            ReadyBasis::Processed => summary.fused + summary.failed,
        };
        counted as f32 / summary.total as f32
    }

    pub fn is_satisfied(&self, summary: &EntrySummary) -> bool {
        self.completeness(summary) >= self.threshold
    }
}

impl Default for ReadyPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_READY_THRESHOLD,
            basis: ReadyBasis::default(),
        }
    }
}
