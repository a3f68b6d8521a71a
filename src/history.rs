use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::aggregate::{aggregate, WindowAggregate};
use crate::error::GrowthError;
use crate::models::{AttendanceObservation, FeedbackObservation};
use crate::taxonomy::SkillTaxonomy;
use crate::window::{DateRange, TimeWindow};

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPoint {
    pub period: DateRange,
    pub aggregate: WindowAggregate,
}

impl HistoryPoint {
    pub fn overall(&self) -> Option<f64> {
        self.aggregate.overall_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrajectoryPoint {
    pub period_start: NaiveDate,
    pub overall_score: Option<f64>,
}

/// Distinct session dates in `[since, before)`, ascending.
fn observation_dates(
    attendance: &[AttendanceObservation],
    feedback: &[FeedbackObservation],
    since: NaiveDate,
    before: NaiveDate,
) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = attendance
        .iter()
        .map(|r| r.session_date)
        .chain(feedback.iter().map(|r| r.session_date))
        .filter(|date| since <= *date && *date < before)
        .collect();
    dates.sort_unstable();
    dates.dedup();
    dates
}

/// Bucket observations in `[since, window.end)` into consecutive periods of the
/// window's length, aligned so the last bucket is the current window. Returned
/// oldest first; empty when there is nothing observed.
pub fn build_history(
    window: &TimeWindow,
    since: NaiveDate,
    attendance: &[AttendanceObservation],
    feedback: &[FeedbackObservation],
    taxonomy: &SkillTaxonomy,
) -> Result<Vec<HistoryPoint>, GrowthError> {
    let dates = observation_dates(attendance, feedback, since, window.end);
    let Some(&earliest) = dates.first() else {
        return Ok(Vec::new());
    };

    let mut periods_back = 0i64;
    while window.period(periods_back).start > earliest {
        periods_back += 1;
    }

    let mut points = Vec::with_capacity(periods_back as usize + 1);
    for k in (0..=periods_back).rev() {
        let period = window.period(k);
        let observed = DateRange {
            start: period.start.max(since),
            end: period.end,
        };
        points.push(HistoryPoint {
            period,
            aggregate: aggregate(observed, attendance, feedback, taxonomy)?,
        });
    }

    tracing::debug!(
        periods = points.len(),
        earliest = %earliest,
        "bucketed student history"
    );
    Ok(points)
}

/// Replays every observation before `before` in date order. Periods are
/// `period_days` long and counted from the first observation, so a session
/// always lands in the same period whatever date a report is run for.
///
/// `visit` sees each observation date together with the history as it stood at
/// the end of that day; the open period only holds sessions up to that day.
/// Returns the history after the last observation.
pub fn replay<F>(
    attendance: &[AttendanceObservation],
    feedback: &[FeedbackObservation],
    before: NaiveDate,
    period_days: i64,
    taxonomy: &SkillTaxonomy,
    mut visit: F,
) -> Result<Vec<HistoryPoint>, GrowthError>
where
    F: FnMut(NaiveDate, &[HistoryPoint]),
{
    let dates = observation_dates(attendance, feedback, NaiveDate::MIN, before);
    let Some(&anchor) = dates.first() else {
        return Ok(Vec::new());
    };
    let period_days = period_days.max(1);
    let period = |k: i64| {
        let start = anchor + Duration::days(k * period_days);
        DateRange {
            start,
            end: start + Duration::days(period_days),
        }
    };

    let mut points: Vec<HistoryPoint> = Vec::new();
    for date in dates {
        let k = (date - anchor).num_days() / period_days;

        // Entering a new period: the previously open one is now complete.
        if let Some(last) = points.len().checked_sub(1) {
            if (last as i64) < k {
                let closed = period(last as i64);
                points[last].aggregate = aggregate(closed, attendance, feedback, taxonomy)?;
            }
        }
        while (points.len() as i64) < k {
            let gap = period(points.len() as i64);
            points.push(HistoryPoint {
                period: gap,
                aggregate: aggregate(gap, attendance, feedback, taxonomy)?,
            });
        }

        let current = period(k);
        let open = DateRange {
            start: current.start,
            end: date.succ_opt().unwrap_or(before),
        };
        let point = HistoryPoint {
            period: current,
            aggregate: aggregate(open, attendance, feedback, taxonomy)?,
        };
        match points.get_mut(k as usize) {
            Some(slot) => *slot = point,
            None => points.push(point),
        }

        visit(date, &points);
    }

    Ok(points)
}

pub fn trajectory(history: &[HistoryPoint]) -> Vec<TrajectoryPoint> {
    history
        .iter()
        .map(|point| TrajectoryPoint {
            period_start: point.period.start,
            overall_score: point.overall(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceStatus, LessonNumber, Score, StarRatings};
    use crate::taxonomy::TaxonomyPreset;
    use crate::window::Timeframe;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).expect("valid date")
    }

    fn feedback_on(session_date: NaiveDate, rebuttal: u8) -> FeedbackObservation {
        FeedbackObservation {
            session_date,
            unit_number: 2,
            lesson_number: LessonNumber::new("2.1"),
            rubric_scores: [(
                "rebuttal".to_owned(),
                Score::numeric(rebuttal).expect("valid score"),
            )]
            .into(),
            speech_duration_seconds: Some(240),
            instructor: None,
        }
    }

    fn feedback(days_ago: i64, rebuttal: u8) -> FeedbackObservation {
        feedback_on(as_of() - Duration::days(days_ago), rebuttal)
    }

    fn taxonomy() -> SkillTaxonomy {
        SkillTaxonomy::preset(TaxonomyPreset::General).expect("preset is valid")
    }

    #[test]
    fn no_records_means_empty_history() {
        let window = TimeWindow::resolve(Timeframe::Week, as_of());
        let history =
            build_history(&window, NaiveDate::MIN, &[], &[], &taxonomy()).expect("history");
        assert!(history.is_empty());
        assert!(trajectory(&history).is_empty());
    }

    #[test]
    fn periods_reach_back_to_earliest_observation() {
        let window = TimeWindow::resolve(Timeframe::Week, as_of());
        // 1 day ago -> current period, 20 days ago -> third period back
        let records = vec![feedback(1, 5), feedback(20, 1)];
        let history =
            build_history(&window, NaiveDate::MIN, &[], &records, &taxonomy()).expect("history");
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].period, window.current());
        assert_eq!(history[0].overall(), Some(0.0));
        assert_eq!(history[1].overall(), None);
        assert_eq!(history[2].overall(), Some(100.0));

        let points = trajectory(&history);
        assert!(points.windows(2).all(|pair| pair[0].period_start < pair[1].period_start));
        assert_eq!(points[0].period_start, window.period(2).start);
    }

    #[test]
    fn history_starts_at_the_floor() {
        let window = TimeWindow::resolve(Timeframe::Week, as_of());
        let records = vec![feedback(1, 5), feedback(20, 1), feedback(300, 1)];
        let since = as_of() - Duration::days(30);
        let history = build_history(&window, since, &[], &records, &taxonomy()).expect("history");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].overall(), Some(0.0));
    }

    #[test]
    fn observations_on_or_after_as_of_are_ignored() {
        let window = TimeWindow::resolve(Timeframe::Week, as_of());
        let records = vec![feedback(0, 5)];
        let history =
            build_history(&window, NaiveDate::MIN, &[], &records, &taxonomy()).expect("history");
        assert!(history.is_empty());
    }

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, day).expect("valid date")
    }

    #[test]
    fn replay_anchors_periods_at_first_observation() {
        let attendance = vec![AttendanceObservation {
            session_date: date(1, 10),
            ratings: StarRatings::new(4, 4, 4, 4),
            status: AttendanceStatus::Present,
        }];
        let records = vec![
            feedback_on(date(1, 20), 5),
            feedback_on(date(1, 25), 1),
            feedback_on(date(3, 1), 3),
        ];

        let mut seen = Vec::new();
        let history = replay(&attendance, &records, date(6, 1), 30, &taxonomy(), |day, points| {
            seen.push((day, points.len(), points.last().and_then(HistoryPoint::overall)));
        })
        .expect("replay");

        // periods: [01-10, 02-09), [02-09, 03-11)
        assert_eq!(
            seen,
            vec![
                (date(1, 10), 1, None),
                (date(1, 20), 1, Some(100.0)),
                (date(1, 25), 1, Some(50.0)),
                (date(3, 1), 2, Some(50.0)),
            ]
        );
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].period.start, date(1, 10));
        assert_eq!(history[1].period.start, date(2, 9));
        assert_eq!(history[0].aggregate.attendance.present, 1);
    }

    #[test]
    fn replay_does_not_depend_on_report_date() {
        let records = vec![
            feedback_on(date(1, 5), 5),
            feedback_on(date(2, 20), 4),
            feedback_on(date(4, 2), 2),
        ];
        let mut early = Vec::new();
        replay(&[], &records, date(2, 21), 30, &taxonomy(), |day, points| {
            early.push((day, points.to_vec()));
        })
        .expect("replay");
        let mut late = Vec::new();
        replay(&[], &records, date(12, 1), 30, &taxonomy(), |day, points| {
            late.push((day, points.to_vec()));
        })
        .expect("replay");

        assert_eq!(early.len(), 2);
        assert_eq!(late[..2], early[..]);
    }

    #[test]
    fn replay_fills_quiet_periods() {
        let records = vec![feedback_on(date(1, 1), 5), feedback_on(date(4, 15), 5)];
        let history = replay(&[], &records, date(6, 1), 30, &taxonomy(), |_, _| {})
            .expect("replay");
        // 01-01 + 3 * 30 days = 04-01, so the second session opens the fourth period
        assert_eq!(history.len(), 4);
        assert_eq!(history[1].overall(), None);
        assert_eq!(history[2].overall(), None);
        assert_eq!(history[3].overall(), Some(100.0));
    }
}
