use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{
    Thresholds, EXCELLENT_OVERALL, MILESTONE_PERIOD_DAYS, PROFICIENT_OVERALL,
    SPEECH_COUNT_MILESTONE, SUSTAINED_PERIODS, TERM_ATTENDANCE_RATE, TERM_DAYS,
};
use crate::error::GrowthError;
use crate::history::{replay, HistoryPoint};
use crate::models::{AttendanceObservation, FeedbackObservation};
use crate::taxonomy::SkillTaxonomy;
use crate::trend::{self, Observed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Points,
    Periods,
    Speeches,
    PercentagePoints,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Distance {
    pub value: f64,
    pub unit: DistanceUnit,
}

impl Distance {
    fn new(value: f64, unit: DistanceUnit) -> Self {
        Self {
            value: value.max(0.0),
            unit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    Met,
    /// `None` when no meaningful distance exists yet.
    Unmet(Option<Distance>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MilestoneRule {
    SpeechCount { count: usize },
    SustainedOverall { threshold: f64, periods: usize },
    TermAttendance { rate: f64, days: i64 },
    GrowthAreaTurnaround,
}

impl MilestoneRule {
    /// Pure predicate over a history prefix (oldest first).
    pub fn evaluate(&self, history: &[HistoryPoint], thresholds: &Thresholds) -> Evaluation {
        match *self {
            Self::SpeechCount { count } => speech_count(history, count),
            Self::SustainedOverall { threshold, periods } => {
                sustained_overall(history, threshold, periods)
            }
            Self::TermAttendance { rate, days } => term_attendance(history, rate, days),
            Self::GrowthAreaTurnaround => growth_area_turnaround(history, thresholds),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Milestone {
    pub id: &'static str,
    pub title: &'static str,
    pub rule: MilestoneRule,
}

pub fn standard_milestones() -> Vec<Milestone> {
    vec![
        Milestone {
            id: "first_speech",
            title: "First scored speech",
            rule: MilestoneRule::SpeechCount { count: 1 },
        },
        Milestone {
            id: "speech_count",
            title: "Ten scored speeches",
            rule: MilestoneRule::SpeechCount {
                count: SPEECH_COUNT_MILESTONE,
            },
        },
        Milestone {
            id: "sustained_proficiency",
            title: "Overall score of 70+ for two consecutive periods",
            rule: MilestoneRule::SustainedOverall {
                threshold: PROFICIENT_OVERALL,
                periods: SUSTAINED_PERIODS,
            },
        },
        Milestone {
            id: "sustained_excellence",
            title: "Overall score of 85+ for two consecutive periods",
            rule: MilestoneRule::SustainedOverall {
                threshold: EXCELLENT_OVERALL,
                periods: SUSTAINED_PERIODS,
            },
        },
        Milestone {
            id: "term_attendance",
            title: "90% attendance across a full term",
            rule: MilestoneRule::TermAttendance {
                rate: TERM_ATTENDANCE_RATE,
                days: TERM_DAYS,
            },
        },
        Milestone {
            id: "growth_area_turnaround",
            title: "A growth-area skill became a strength",
            rule: MilestoneRule::GrowthAreaTurnaround,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievedMilestone {
    pub id: String,
    pub title: String,
    pub achieved_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingMilestone {
    pub id: String,
    pub title: String,
    pub distance: Option<Distance>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Milestones {
    pub achieved: Vec<AchievedMilestone>,
    pub upcoming: Vec<UpcomingMilestone>,
}

/// Replays the student's whole record before `before` and marks each rule
/// achieved on the first session date at which it held. Periods are anchored at
/// the first observation rather than at the report date, and every check only
/// sees sessions up to its own date, so running a later report can add
/// achievements but never moves or removes one.
pub fn detect(
    attendance: &[AttendanceObservation],
    feedback: &[FeedbackObservation],
    before: NaiveDate,
    taxonomy: &SkillTaxonomy,
    rules: &[Milestone],
    thresholds: &Thresholds,
) -> Result<Milestones, GrowthError> {
    let mut achieved_on: Vec<Option<NaiveDate>> = vec![None; rules.len()];
    let history = replay(
        attendance,
        feedback,
        before,
        MILESTONE_PERIOD_DAYS,
        taxonomy,
        |date, history| {
            for (milestone, slot) in rules.iter().zip(achieved_on.iter_mut()) {
                if slot.is_none() && milestone.rule.evaluate(history, thresholds) == Evaluation::Met
                {
                    *slot = Some(date);
                }
            }
        },
    )?;

    let mut milestones = Milestones::default();
    for (milestone, achieved) in rules.iter().zip(achieved_on) {
        match achieved {
            Some(date) => milestones.achieved.push(AchievedMilestone {
                id: milestone.id.to_owned(),
                title: milestone.title.to_owned(),
                achieved_on: date,
            }),
            None => {
                let distance = match milestone.rule.evaluate(&history, thresholds) {
                    Evaluation::Unmet(distance) => distance,
                    Evaluation::Met => None,
                };
                milestones.upcoming.push(UpcomingMilestone {
                    id: milestone.id.to_owned(),
                    title: milestone.title.to_owned(),
                    distance,
                });
            }
        }
    }

    Ok(milestones)
}

fn speech_count(history: &[HistoryPoint], count: usize) -> Evaluation {
    let total: usize = history.iter().map(|p| p.aggregate.sample_size).sum();
    if total >= count {
        Evaluation::Met
    } else {
        Evaluation::Unmet(Some(Distance::new(
            (count - total) as f64,
            DistanceUnit::Speeches,
        )))
    }
}

fn sustained_overall(history: &[HistoryPoint], threshold: f64, periods: usize) -> Evaluation {
    let streak = history
        .iter()
        .rev()
        .take_while(|p| matches!(p.overall(), Some(score) if score >= threshold))
        .count();
    if streak >= periods {
        return Evaluation::Met;
    }

    // Trailing periods without feedback neither extend nor break the run here.
    let scored: Vec<f64> = history.iter().filter_map(HistoryPoint::overall).collect();
    let distance = match scored.last() {
        None => Distance::new(periods as f64, DistanceUnit::Periods),
        Some(latest) if *latest < threshold => {
            Distance::new(threshold - latest, DistanceUnit::Points)
        }
        Some(_) => {
            let run = scored.iter().rev().take_while(|s| **s >= threshold).count();
            Distance::new(periods.saturating_sub(run).max(1) as f64, DistanceUnit::Periods)
        }
    };
    Evaluation::Unmet(Some(distance))
}

fn term_attendance(history: &[HistoryPoint], rate: f64, days: i64) -> Evaluation {
    let Some(first) = history.first() else {
        return Evaluation::Unmet(None);
    };
    let period_days = first.period.days().max(1);
    let needed = ((days + period_days - 1) / period_days).max(1) as usize;

    if history.len() < needed {
        return Evaluation::Unmet(Some(Distance::new(
            (needed - history.len()) as f64,
            DistanceUnit::Periods,
        )));
    }

    let (attended, recorded) = history[history.len() - needed..]
        .iter()
        .fold((0usize, 0usize), |(attended, recorded), p| {
            (
                attended + p.aggregate.attendance.attended(),
                recorded + p.aggregate.attendance.recorded(),
            )
        });
    if recorded == 0 {
        return Evaluation::Unmet(None);
    }

    let actual = attended as f64 / recorded as f64;
    if actual >= rate {
        Evaluation::Met
    } else {
        Evaluation::Unmet(Some(Distance::new(
            (rate - actual) * 100.0,
            DistanceUnit::PercentagePoints,
        )))
    }
}

fn growth_area_turnaround(history: &[HistoryPoint], thresholds: &Thresholds) -> Evaluation {
    let categories: BTreeSet<&str> = history
        .iter()
        .flat_map(|p| p.aggregate.per_skill.keys().map(String::as_str))
        .collect();

    let mut best_latest: Option<f64> = None;
    for category in categories {
        let mut was_growth_area = false;
        let mut latest = None;
        for (index, point) in history.iter().enumerate() {
            let score = point.aggregate.skill(category);
            let prior = index.checked_sub(1).map(|i| &history[i]);
            let trend = trend::classify(
                Observed::new(score, point.aggregate.sample_size),
                Observed::new(
                    prior.and_then(|p| p.aggregate.skill(category)),
                    prior.map_or(0, |p| p.aggregate.sample_size),
                ),
                thresholds,
            );

            if was_growth_area && trend::is_strength(score, &trend, thresholds) {
                return Evaluation::Met;
            }
            if trend::is_growth_area(score, &trend, thresholds) {
                was_growth_area = true;
            }
            if score.is_some() {
                latest = score;
            }
        }

        if was_growth_area {
            if let Some(score) = latest {
                best_latest = Some(best_latest.map_or(score, |best: f64| best.max(score)));
            }
        }
    }

    Evaluation::Unmet(
        best_latest.map(|score| Distance::new(thresholds.strength - score, DistanceUnit::Points)),
    )
}
