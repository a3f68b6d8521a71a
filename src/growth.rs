use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};

use crate::aggregate::{aggregate, WindowAggregate};
use crate::config::{GrowthConfig, Thresholds};
use crate::error::{ConfigError, GrowthError};
use crate::history::{build_history, trajectory};
use crate::milestone::{detect, standard_milestones, Milestone};
use crate::models::FeedbackObservation;
use crate::patterns::detect_patterns;
use crate::percentile::{compare, CohortComparison};
use crate::report::{
    AttendanceSummary, GrowthLevel, GrowthReport, LessonProgress, OverallGrowth, SampleSizes,
    SkillGrowth, Velocity,
};
use crate::store::RecordStore;
use crate::taxonomy::SkillTaxonomy;
use crate::trend::{self, Observed, Trend};
use crate::window::{program_epoch, DateRange, TimeWindow};

pub const OVERALL_METRIC: &str = "overall";

/// Builds growth reports. Holds only read-only configuration, so one engine can
/// serve concurrent requests.
pub struct GrowthEngine<S> {
    store: S,
    taxonomy: SkillTaxonomy,
    thresholds: Thresholds,
    milestones: Vec<Milestone>,
}

impl<S: RecordStore> GrowthEngine<S> {
    pub fn new(store: S, taxonomy: SkillTaxonomy, thresholds: Thresholds) -> Self {
        Self {
            store,
            taxonomy,
            thresholds,
            milestones: standard_milestones(),
        }
    }

    pub fn from_config(store: S, config: &GrowthConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(store, config.build_taxonomy()?, config.thresholds))
    }

    pub async fn calculate_student_growth(
        &self,
        student_id: &str,
        timeframe: &str,
        as_of: Option<NaiveDate>,
    ) -> Result<GrowthReport, GrowthError> {
        let window = TimeWindow::resolve_symbol(timeframe, as_of)?;
        self.build(student_id, window).await
    }

    async fn build(&self, student_id: &str, window: TimeWindow) -> Result<GrowthReport, GrowthError> {
        let Some(identity) = self.store.fetch_student_identity(student_id).await? else {
            tracing::warn!(student_id, "growth report requested for unknown student");
            return Err(GrowthError::StudentNotFound(student_id.to_owned()));
        };

        // Milestones replay the whole record, so nothing is clipped here.
        let record_range = DateRange {
            start: program_epoch().min(window.prior_window.start),
            end: window.end,
        };
        let (attendance, feedback) = tokio::try_join!(
            self.store.fetch_attendance(student_id, record_range),
            self.store.fetch_feedback(student_id, record_range),
        )?;
        tracing::debug!(
            student_id,
            range = %record_range,
            attendance = attendance.len(),
            feedback = feedback.len(),
            "fetched student history"
        );

        let current = aggregate(window.current(), &attendance, &feedback, &self.taxonomy)?;
        let prior = aggregate(window.prior_window, &attendance, &feedback, &self.taxonomy)?;

        let overall_trend = trend::classify(
            Observed::new(current.overall_score, current.sample_size),
            Observed::new(prior.overall_score, prior.sample_size),
            &self.thresholds,
        );

        let mut skills = BTreeMap::new();
        let mut skill_velocity = BTreeMap::new();
        for category in self.taxonomy.categories() {
            let score = current.skill(&category.name);
            let skill_trend = trend::classify(
                Observed::new(score, current.sample_size),
                Observed::new(prior.skill(&category.name), prior.sample_size),
                &self.thresholds,
            );
            skill_velocity.insert(
                category.name.clone(),
                per_day(&skill_trend, window.days()),
            );
            skills.insert(
                category.name.clone(),
                SkillGrowth {
                    score,
                    trend: skill_trend,
                    is_strength: trend::is_strength(score, &skill_trend, &self.thresholds),
                    is_growth_area: trend::is_growth_area(score, &skill_trend, &self.thresholds),
                },
            );
        }

        let comparisons = self
            .cohort_comparisons(&identity.level, &current, window.current())
            .await?;
        let overall_percentile = comparisons
            .iter()
            .find(|c| c.metric == OVERALL_METRIC)
            .and_then(|c| c.percentile);

        let history = build_history(
            &window,
            self.history_floor(&window),
            &attendance,
            &feedback,
            &self.taxonomy,
        )?;
        let milestones = detect(
            &attendance,
            &feedback,
            window.end,
            &self.taxonomy,
            &self.milestones,
            &self.thresholds,
        )?;
        let patterns = detect_patterns(
            &current,
            &prior,
            &history,
            |raw| self.taxonomy.scale(raw),
            &self.thresholds,
        );

        tracing::info!(
            student_id,
            timeframe = %window.timeframe,
            window = %window.current(),
            current_sample = current.sample_size,
            prior_sample = prior.sample_size,
            periods = history.len(),
            achieved = milestones.achieved.len(),
            "built growth report"
        );

        Ok(GrowthReport {
            student_id: identity.student_id,
            display_name: identity.display_name,
            program_level: identity.level,
            timeframe: window.timeframe,
            window,
            overall: OverallGrowth {
                score: current.overall_score,
                trend: overall_trend,
                level: GrowthLevel::from_score(current.overall_score),
                percentile: overall_percentile,
            },
            skills,
            trajectory: trajectory(&history),
            milestones,
            patterns,
            comparisons,
            velocity: Velocity {
                overall: per_day(&overall_trend, window.days()),
                skills: skill_velocity,
            },
            attendance: AttendanceSummary {
                rate: current.attendance_rate,
                counts: current.attendance,
                engagement_score: current.engagement_score,
            },
            sample: SampleSizes {
                current: current.sample_size,
                prior: prior.sample_size,
            },
            progress: latest_lesson(&feedback),
        })
    }

    /// Oldest date the trajectory reaches back to; never later than the prior
    /// window's start.
    fn history_floor(&self, window: &TimeWindow) -> NaiveDate {
        let days = u64::try_from(self.thresholds.history_days).unwrap_or(0);
        window
            .end
            .checked_sub_days(Days::new(days))
            .unwrap_or(NaiveDate::MIN)
            .min(window.prior_window.start)
    }

    async fn cohort_comparisons(
        &self,
        level: &str,
        current: &WindowAggregate,
        range: DateRange,
    ) -> Result<Vec<CohortComparison>, GrowthError> {
        let mut metrics = vec![(OVERALL_METRIC, current.overall_score)];
        for category in self.taxonomy.categories() {
            metrics.push((category.name.as_str(), current.skill(&category.name)));
        }

        let mut comparisons = Vec::with_capacity(metrics.len());
        for (metric, score) in metrics {
            let cohort = self.store.fetch_cohort_scores(level, metric, range).await?;
            let comparison = compare(metric, score, &cohort, self.thresholds.min_cohort_size);
            if comparison.percentile.is_none() && score.is_some() {
                tracing::debug!(
                    metric,
                    cohort_size = comparison.cohort_size,
                    "cohort too small to rank"
                );
            }
            comparisons.push(comparison);
        }
        Ok(comparisons)
    }
}

fn per_day(trend: &Trend, days: i64) -> f64 {
    if days <= 0 {
        return 0.0;
    }
    trend.magnitude / days as f64
}

fn latest_lesson(feedback: &[FeedbackObservation]) -> Option<LessonProgress> {
    feedback
        .iter()
        .max_by(|a, b| {
            (a.unit_number, &a.lesson_number).cmp(&(b.unit_number, &b.lesson_number))
        })
        .map(|record| LessonProgress {
            unit_number: record.unit_number,
            lesson_number: record.lesson_number.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LessonNumber, Score, StudentIdentity};
    use crate::store::MemoryStore;
    use crate::taxonomy::TaxonomyPreset;
    use crate::trend::Direction;

    fn lesson(unit: u32, number: &str) -> FeedbackObservation {
        FeedbackObservation {
            session_date: NaiveDate::from_ymd_opt(2026, 1, 5).expect("valid date"),
            unit_number: unit,
            lesson_number: LessonNumber::new(number),
            rubric_scores: BTreeMap::from([("rebuttal".to_owned(), Score::NotApplicable)]),
            speech_duration_seconds: None,
            instructor: None,
        }
    }

    #[test]
    fn velocity_is_magnitude_per_day() {
        let trend = Trend {
            direction: Direction::Declining,
            magnitude: 15.0,
        };
        assert!((per_day(&trend, 30) - 0.5).abs() < 1e-9);
        assert_eq!(per_day(&Trend::flat(), 7), 0.0);
    }

    #[test]
    fn latest_lesson_orders_unit_then_lesson() {
        let records = vec![lesson(2, "2.10"), lesson(3, "3.1"), lesson(2, "2.9")];
        let progress = latest_lesson(&records).expect("has feedback");
        assert_eq!(progress.unit_number, 3);
        assert_eq!(progress.lesson_number.as_str(), "3.1");

        let records = vec![lesson(2, "2.9"), lesson(2, "2.10")];
        let progress = latest_lesson(&records).expect("has feedback");
        assert_eq!(progress.lesson_number.as_str(), "2.10");
        assert!(latest_lesson(&[]).is_none());
    }

    #[tokio::test]
    async fn oversized_history_window_does_not_overflow() {
        let thresholds = Thresholds {
            history_days: i64::MAX,
            ..Thresholds::default()
        };
        let store = MemoryStore::new()
            .with_student(StudentIdentity {
                student_id: "s-1".into(),
                display_name: "Sam".into(),
                level: "novice".into(),
            })
            .with_feedback("s-1", lesson(3, "3.1"));
        let engine = GrowthEngine::new(
            store,
            SkillTaxonomy::preset(TaxonomyPreset::General).expect("preset is valid"),
            thresholds,
        );

        let window = TimeWindow::resolve(
            crate::window::Timeframe::Month,
            NaiveDate::from_ymd_opt(2026, 2, 1).expect("valid date"),
        );
        assert_eq!(engine.history_floor(&window), NaiveDate::MIN);

        let report = engine
            .calculate_student_growth("s-1", "month", Some(window.end))
            .await
            .expect("report");
        assert_eq!(report.trajectory.len(), 1);
        assert_eq!(report.sample.current, 1);
    }
}
