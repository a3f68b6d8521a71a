use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::GrowthError;
use crate::models::{AttendanceObservation, AttendanceStatus, FeedbackObservation};
use crate::taxonomy::SkillTaxonomy;
use crate::window::DateRange;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Tally {
    sum: f64,
    count: usize,
}

impl Tally {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceCounts {
    pub present: usize,
    pub absent: usize,
    pub makeup: usize,
}

impl AttendanceCounts {
    pub fn attended(&self) -> usize {
        self.present + self.makeup
    }

    pub fn recorded(&self) -> usize {
        self.attended() + self.absent
    }

    /// Makeups count as present.
    pub fn rate(&self) -> Option<f64> {
        let recorded = self.recorded();
        (recorded > 0).then(|| self.attended() as f64 / recorded as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionStat {
    pub category: String,
    /// Mean raw rubric value (1-5) over applicable observations.
    pub mean: f64,
    pub observations: usize,
    /// Observations scored at 2 or below.
    pub low_marks: usize,
}

/// Reduction of one window's observations. Every score is on the 0-100 scale
/// and `None` means insufficient data, never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAggregate {
    pub range: DateRange,
    pub overall_score: Option<f64>,
    pub per_skill: BTreeMap<String, Option<f64>>,
    pub dimensions: BTreeMap<String, DimensionStat>,
    pub attendance: AttendanceCounts,
    pub attendance_rate: Option<f64>,
    pub engagement_score: Option<f64>,
    pub sample_size: usize,
    pub mean_speech_seconds: Option<f64>,
}

impl WindowAggregate {
    pub fn skill(&self, category: &str) -> Option<f64> {
        self.per_skill.get(category).copied().flatten()
    }
}

pub const LOW_MARK: u8 = 2;

pub fn aggregate(
    range: DateRange,
    attendance: &[AttendanceObservation],
    feedback: &[FeedbackObservation],
    taxonomy: &SkillTaxonomy,
) -> Result<WindowAggregate, GrowthError> {
    let mut dimension_tallies: BTreeMap<&str, (Tally, usize)> = BTreeMap::new();
    let mut speech_seconds = Tally::default();
    let mut sample_size = 0usize;

    for record in feedback.iter().filter(|r| range.contains(r.session_date)) {
        sample_size += 1;
        if let Some(seconds) = record.speech_duration_seconds {
            speech_seconds.add(f64::from(seconds));
        }

        for (dimension, score) in &record.rubric_scores {
            if taxonomy.category_for(dimension).is_none() {
                tracing::error!(
                    dimension = %dimension,
                    session_date = %record.session_date,
                    "rubric dimension is missing from the skill taxonomy"
                );
                return Err(GrowthError::DataIntegrity {
                    dimension: dimension.clone(),
                });
            }

            let entry = dimension_tallies.entry(dimension.as_str()).or_default();
            if let Some(value) = score.value() {
                entry.0.add(f64::from(value));
                if value <= LOW_MARK {
                    entry.1 += 1;
                }
            }
        }
    }

    let mut dimensions = BTreeMap::new();
    for (dimension, (tally, low_marks)) in dimension_tallies {
        let (Some(mean), Some(category)) = (tally.mean(), taxonomy.category_for(dimension)) else {
            continue;
        };
        dimensions.insert(
            dimension.to_owned(),
            DimensionStat {
                category: category.name.clone(),
                mean,
                observations: tally.count,
                low_marks,
            },
        );
    }

    // Equal weight per dimension, not per observation.
    let mut per_skill = BTreeMap::new();
    for category in taxonomy.categories() {
        let mut category_tally = Tally::default();
        for dimension in &category.dimensions {
            if let Some(stat) = dimensions.get(dimension) {
                category_tally.add(stat.mean);
            }
        }
        per_skill.insert(
            category.name.clone(),
            category_tally.mean().map(|raw| taxonomy.scale(raw)),
        );
    }

    let mut overall = Tally::default();
    for score in per_skill.values().flatten() {
        overall.add(*score);
    }

    let mut counts = AttendanceCounts::default();
    let mut stars = Tally::default();
    for record in attendance.iter().filter(|r| range.contains(r.session_date)) {
        match record.status {
            AttendanceStatus::Present => counts.present += 1,
            AttendanceStatus::Makeup => counts.makeup += 1,
            AttendanceStatus::Absent => {
                counts.absent += 1;
                continue;
            }
        }
        for value in record.ratings.rated() {
            stars.add(f64::from(value));
        }
    }

    Ok(WindowAggregate {
        range,
        overall_score: overall.mean(),
        per_skill,
        dimensions,
        attendance: counts,
        attendance_rate: counts.rate(),
        engagement_score: stars.mean().map(|raw| taxonomy.scale(raw)),
        sample_size,
        mean_speech_seconds: speech_seconds.mean(),
    })
}
