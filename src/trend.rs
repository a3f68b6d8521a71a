use serde::{Deserialize, Serialize};

use crate::config::Thresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Improving,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: Direction,
    pub magnitude: f64,
}

impl Trend {
    pub const fn flat() -> Self {
        Self {
            direction: Direction::Stable,
            magnitude: 0.0,
        }
    }
}

/// One side of a trend comparison: a 0-100 score and the feedback count behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observed {
    pub score: Option<f64>,
    pub sample_size: usize,
}

impl Observed {
    pub fn new(score: Option<f64>, sample_size: usize) -> Self {
        Self { score, sample_size }
    }
}

pub fn classify(current: Observed, prior: Observed, thresholds: &Thresholds) -> Trend {
    if current.sample_size < thresholds.min_trend_sample
        || prior.sample_size < thresholds.min_trend_sample
    {
        return Trend::flat();
    }
    let (Some(now), Some(before)) = (current.score, prior.score) else {
        return Trend::flat();
    };

    let delta = now - before;
    let direction = if delta > thresholds.trend_noise_band {
        Direction::Improving
    } else if delta < -thresholds.trend_noise_band {
        Direction::Declining
    } else {
        Direction::Stable
    };

    Trend {
        direction,
        magnitude: delta.abs(),
    }
}

pub fn is_strength(score: Option<f64>, trend: &Trend, thresholds: &Thresholds) -> bool {
    matches!(score, Some(value) if value >= thresholds.strength)
        && trend.direction != Direction::Declining
}

/// A skill with no current score is never flagged.
pub fn is_growth_area(score: Option<f64>, trend: &Trend, thresholds: &Thresholds) -> bool {
    match score {
        Some(value) => value < thresholds.growth_area || trend.direction == Direction::Declining,
        None => false,
    }
}
