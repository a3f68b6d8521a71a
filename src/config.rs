use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::taxonomy::{SkillCategory, SkillTaxonomy, TaxonomyPreset};

pub const CONFIG_ENV: &str = "GROWTH_CONFIG";

/// Score change (0-100 scale) that must be exceeded before a trend registers.
pub const TREND_NOISE_BAND: f64 = 3.0;
/// Feedback records needed on both sides of a comparison.
pub const MIN_TREND_SAMPLE: usize = 2;
pub const STRENGTH_THRESHOLD: f64 = 80.0;
pub const GROWTH_AREA_THRESHOLD: f64 = 60.0;
pub const MIN_COHORT_SIZE: usize = 5;
pub const DEFAULT_HISTORY_DAYS: i64 = 3 * 365;
pub const MAX_HISTORY_DAYS: i64 = 100 * 365;

pub const PROFICIENT_OVERALL: f64 = 70.0;
pub const EXCELLENT_OVERALL: f64 = 85.0;
pub const SUSTAINED_PERIODS: usize = 2;
pub const TERM_ATTENDANCE_RATE: f64 = 0.9;
pub const TERM_DAYS: i64 = 91;
pub const SPEECH_COUNT_MILESTONE: usize = 10;
/// Milestone periods are counted from a student's first observation and do not
/// follow the report timeframe.
pub const MILESTONE_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub trend_noise_band: f64,
    pub min_trend_sample: usize,
    pub strength: f64,
    pub growth_area: f64,
    pub min_cohort_size: usize,
    pub history_days: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            trend_noise_band: TREND_NOISE_BAND,
            min_trend_sample: MIN_TREND_SAMPLE,
            strength: STRENGTH_THRESHOLD,
            growth_area: GROWTH_AREA_THRESHOLD,
            min_cohort_size: MIN_COHORT_SIZE,
            history_days: DEFAULT_HISTORY_DAYS,
        }
    }
}

impl Thresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.trend_noise_band >= 0.0) {
            return Err(ConfigError::Threshold(
                "trend_noise_band must be non-negative".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.strength) || !(0.0..=100.0).contains(&self.growth_area) {
            return Err(ConfigError::Threshold(
                "strength and growth_area must lie within 0-100".into(),
            ));
        }
        if self.growth_area > self.strength {
            return Err(ConfigError::Threshold(
                "growth_area must not exceed strength".into(),
            ));
        }
        if self.min_cohort_size == 0 {
            return Err(ConfigError::Threshold("min_cohort_size must be at least 1".into()));
        }
        if !(1..=MAX_HISTORY_DAYS).contains(&self.history_days) {
            return Err(ConfigError::Threshold(format!(
                "history_days must lie within 1-{MAX_HISTORY_DAYS}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaxonomyConfig {
    #[serde(default)]
    pub preset: TaxonomyPreset,
    /// Replaces the preset entirely when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<SkillCategory>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GrowthConfig {
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
}

impl GrowthConfig {
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: GrowthConfig = toml::from_str(raw)?;
        config.thresholds.validate()?;
        Ok(config)
    }

    /// Missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn build_taxonomy(&self) -> Result<SkillTaxonomy, ConfigError> {
        let taxonomy = match &self.taxonomy.categories {
            Some(categories) => SkillTaxonomy::new(categories.clone())?,
            None => SkillTaxonomy::preset(self.taxonomy.preset)?,
        };
        Ok(taxonomy)
    }
}
