//! Traction / dead / neutral classification
//!
//! Signals are derived on demand and never persisted.

use crate::types::MetricsSnapshot;
use serde::Serialize;

/// Visits strictly above this count mean traction
pub const TRACTION_VISITS: i64 = 100;

/// Visits strictly below this count (with no revenue) mean dead
pub const DEAD_VISITS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// More than 100 visits in the trailing week
    Traction,
    /// Fewer than 10 visits and no revenue
    Dead,
    Neutral,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traction => "traction",
            Signal::Dead => "dead",
            Signal::Neutral => "neutral",
        }
    }
}

/// Classify a product from its visit count and revenue
pub fn classify(visits: i64, revenue: i64) -> Signal {
    if visits > TRACTION_VISITS {
        return Signal::Traction;
    }
    if visits < DEAD_VISITS && revenue == 0 {
        return Signal::Dead;
    }
    Signal::Neutral
}

impl MetricsSnapshot {
    pub fn signal(&self) -> Signal {
        classify(self.visits, self.mrr)
    }
}
