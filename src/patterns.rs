use serde::Serialize;

use crate::aggregate::WindowAggregate;
use crate::config::Thresholds;
use crate::history::HistoryPoint;

const RECURRING_LOW_MIN: usize = 2;
const STANDOUT_AVERAGE: f64 = 90.0;
const STANDOUT_MIN_OBSERVATIONS: usize = 2;
const ATTENDANCE_DECLINE: f64 = 0.15;
const MAKEUP_SHARE: f64 = 0.25;
const MAKEUP_MIN: usize = 2;
const SPEECH_SHIFT_SECONDS: f64 = 30.0;
const PLATEAU_PERIODS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    #[serde(rename_all = "camelCase")]
    RecurringLowDimension {
        dimension: String,
        category: String,
        low_marks: usize,
        average: f64,
    },
    #[serde(rename_all = "camelCase")]
    StandoutDimension {
        dimension: String,
        category: String,
        average: f64,
    },
    #[serde(rename_all = "camelCase")]
    AttendanceDecline { current_rate: f64, prior_rate: f64 },
    #[serde(rename_all = "camelCase")]
    MakeupReliance { makeup_sessions: usize, share: f64 },
    #[serde(rename_all = "camelCase")]
    SpeechDurationShift {
        current_seconds: f64,
        prior_seconds: f64,
    },
    #[serde(rename_all = "camelCase")]
    Plateau { periods: usize, score: f64 },
}

pub fn detect_patterns(
    current: &WindowAggregate,
    prior: &WindowAggregate,
    history: &[HistoryPoint],
    scale: impl Fn(f64) -> f64,
    thresholds: &Thresholds,
) -> Vec<Pattern> {
    let mut patterns = Vec::new();

    for (dimension, stat) in &current.dimensions {
        if stat.low_marks >= RECURRING_LOW_MIN {
            patterns.push(Pattern::RecurringLowDimension {
                dimension: dimension.clone(),
                category: stat.category.clone(),
                low_marks: stat.low_marks,
                average: scale(stat.mean),
            });
        }
    }

    for (dimension, stat) in &current.dimensions {
        let average = scale(stat.mean);
        if stat.observations >= STANDOUT_MIN_OBSERVATIONS && average >= STANDOUT_AVERAGE {
            patterns.push(Pattern::StandoutDimension {
                dimension: dimension.clone(),
                category: stat.category.clone(),
                average,
            });
        }
    }

    if let (Some(current_rate), Some(prior_rate)) = (current.attendance_rate, prior.attendance_rate)
    {
        if prior_rate - current_rate >= ATTENDANCE_DECLINE {
            patterns.push(Pattern::AttendanceDecline {
                current_rate,
                prior_rate,
            });
        }
    }

    let attended = current.attendance.attended();
    if current.attendance.makeup >= MAKEUP_MIN && attended > 0 {
        let share = current.attendance.makeup as f64 / attended as f64;
        if share >= MAKEUP_SHARE {
            patterns.push(Pattern::MakeupReliance {
                makeup_sessions: current.attendance.makeup,
                share,
            });
        }
    }

    if let (Some(current_seconds), Some(prior_seconds)) =
        (current.mean_speech_seconds, prior.mean_speech_seconds)
    {
        if (current_seconds - prior_seconds).abs() >= SPEECH_SHIFT_SECONDS {
            patterns.push(Pattern::SpeechDurationShift {
                current_seconds,
                prior_seconds,
            });
        }
    }

    if history.len() >= PLATEAU_PERIODS {
        let recent: Option<Vec<f64>> = history[history.len() - PLATEAU_PERIODS..]
            .iter()
            .map(HistoryPoint::overall)
            .collect();
        if let Some(scores) = recent {
            let high = scores.iter().copied().fold(f64::MIN, f64::max);
            let low = scores.iter().copied().fold(f64::MAX, f64::min);
            if high - low <= thresholds.trend_noise_band {
                patterns.push(Pattern::Plateau {
                    periods: PLATEAU_PERIODS,
                    score: scores.iter().sum::<f64>() / scores.len() as f64,
                });
            }
        }
    }

    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AttendanceCounts, DimensionStat};
    use crate::window::DateRange;
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeMap;

    fn range(offset: i64) -> DateRange {
        let start = NaiveDate::from_ymd_opt(2026, 2, 1).expect("valid date") + Duration::days(offset);
        DateRange {
            start,
            end: start + Duration::days(30),
        }
    }

    fn empty(offset: i64) -> WindowAggregate {
        WindowAggregate {
            range: range(offset),
            overall_score: None,
            per_skill: BTreeMap::new(),
            dimensions: BTreeMap::new(),
            attendance: AttendanceCounts::default(),
            attendance_rate: None,
            engagement_score: None,
            sample_size: 0,
            mean_speech_seconds: None,
        }
    }

    fn scale(raw: f64) -> f64 {
        (raw - 1.0) / 4.0 * 100.0
    }

    fn stat(mean: f64, observations: usize, low_marks: usize) -> DimensionStat {
        DimensionStat {
            category: "Argumentation".into(),
            mean,
            observations,
            low_marks,
        }
    }

    #[test]
    fn flags_low_and_standout_dimensions() {
        let mut current = empty(30);
        current.dimensions.insert("rebuttal".into(), stat(1.5, 2, 2));
        current.dimensions.insert("evidence".into(), stat(5.0, 3, 0));
        current.dimensions.insert("reasoning".into(), stat(5.0, 1, 0));

        let patterns = detect_patterns(&current, &empty(0), &[], scale, &Thresholds::default());
        assert_eq!(
            patterns,
            vec![
                Pattern::RecurringLowDimension {
                    dimension: "rebuttal".into(),
                    category: "Argumentation".into(),
                    low_marks: 2,
                    average: 12.5,
                },
                Pattern::StandoutDimension {
                    dimension: "evidence".into(),
                    category: "Argumentation".into(),
                    average: 100.0,
                },
            ]
        );
    }

    #[test]
    fn flags_attendance_shifts() {
        let mut current = empty(30);
        current.attendance = AttendanceCounts {
            present: 4,
            absent: 4,
            makeup: 2,
        };
        current.attendance_rate = current.attendance.rate();
        let mut prior = empty(0);
        prior.attendance_rate = Some(0.9);

        let patterns = detect_patterns(&current, &prior, &[], scale, &Thresholds::default());
        assert!(patterns.contains(&Pattern::AttendanceDecline {
            current_rate: 0.6,
            prior_rate: 0.9
        }));
        assert!(patterns
            .iter()
            .any(|p| matches!(p, Pattern::MakeupReliance { makeup_sessions: 2, .. })));
    }

    #[test]
    fn flags_speech_length_shift() {
        let mut current = empty(30);
        current.mean_speech_seconds = Some(300.0);
        let mut prior = empty(0);
        prior.mean_speech_seconds = Some(240.0);
        let patterns = detect_patterns(&current, &prior, &[], scale, &Thresholds::default());
        assert_eq!(
            patterns,
            vec![Pattern::SpeechDurationShift {
                current_seconds: 300.0,
                prior_seconds: 240.0
            }]
        );
    }

    #[test]
    fn plateau_requires_scored_flat_periods() {
        let thresholds = Thresholds::default();
        let history_with = |scores: &[Option<f64>]| -> Vec<HistoryPoint> {
            scores
                .iter()
                .enumerate()
                .map(|(i, score)| {
                    let mut aggregate = empty(30 * i as i64);
                    aggregate.overall_score = *score;
                    HistoryPoint {
                        period: aggregate.range,
                        aggregate,
                    }
                })
                .collect()
        };

        let flat = history_with(&[Some(40.0), Some(61.0), Some(62.0), Some(63.0)]);
        let patterns = detect_patterns(&empty(90), &empty(60), &flat, scale, &thresholds);
        assert_eq!(
            patterns,
            vec![Pattern::Plateau {
                periods: 3,
                score: 62.0
            }]
        );

        let gap = history_with(&[Some(61.0), None, Some(62.0)]);
        assert!(detect_patterns(&empty(60), &empty(30), &gap, scale, &thresholds).is_empty());
    }

    #[test]
    fn quiet_windows_produce_no_patterns() {
        let patterns = detect_patterns(&empty(30), &empty(0), &[], scale, &Thresholds::default());
        assert!(patterns.is_empty());
    }
}
