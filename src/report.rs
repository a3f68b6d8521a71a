use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::aggregate::AttendanceCounts;
use crate::history::TrajectoryPoint;
use crate::milestone::{Distance, DistanceUnit, Milestones};
use crate::models::LessonNumber;
use crate::patterns::Pattern;
use crate::percentile::CohortComparison;
use crate::trend::{Direction, Trend};
use crate::window::{Timeframe, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthLevel {
    InsufficientData,
    Emerging,
    Developing,
    Proficient,
    Advanced,
}

impl GrowthLevel {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            None => Self::InsufficientData,
            Some(value) if value < 40.0 => Self::Emerging,
            Some(value) if value < 60.0 => Self::Developing,
            Some(value) if value < 80.0 => Self::Proficient,
            Some(_) => Self::Advanced,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient data",
            Self::Emerging => "emerging",
            Self::Developing => "developing",
            Self::Proficient => "proficient",
            Self::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallGrowth {
    pub score: Option<f64>,
    pub trend: Trend,
    pub level: GrowthLevel,
    pub percentile: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillGrowth {
    pub score: Option<f64>,
    pub trend: Trend,
    pub is_strength: bool,
    pub is_growth_area: bool,
}

/// Score points per day of window, per metric.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Velocity {
    pub overall: f64,
    pub skills: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub rate: Option<f64>,
    #[serde(flatten)]
    pub counts: AttendanceCounts,
    pub engagement_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleSizes {
    pub current: usize,
    pub prior: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub unit_number: u32,
    pub lesson_number: LessonNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthReport {
    pub student_id: String,
    pub display_name: String,
    pub program_level: String,
    pub timeframe: Timeframe,
    pub window: TimeWindow,
    pub overall: OverallGrowth,
    pub skills: BTreeMap<String, SkillGrowth>,
    pub trajectory: Vec<TrajectoryPoint>,
    pub milestones: Milestones,
    pub patterns: Vec<Pattern>,
    pub comparisons: Vec<CohortComparison>,
    pub velocity: Velocity,
    pub attendance: AttendanceSummary,
    pub sample: SampleSizes,
    pub progress: Option<LessonProgress>,
}

fn score_text(score: Option<f64>) -> String {
    score.map_or_else(|| "insufficient data".to_owned(), |value| format!("{value:.1}"))
}

fn percentile_text(percentile: Option<f64>) -> String {
    percentile.map_or_else(
        || "insufficient cohort data".to_owned(),
        |value| format!("{value:.0}th percentile"),
    )
}

fn trend_text(trend: &Trend) -> String {
    match trend.direction {
        Direction::Improving => format!("improving (+{:.1})", trend.magnitude),
        Direction::Declining => format!("declining (-{:.1})", trend.magnitude),
        Direction::Stable => "stable".to_owned(),
    }
}

fn distance_text(distance: Option<&Distance>) -> String {
    let Some(distance) = distance else {
        return "not yet measurable".to_owned();
    };
    let unit = match distance.unit {
        DistanceUnit::Points => "points",
        DistanceUnit::Periods => "periods",
        DistanceUnit::Speeches => "speeches",
        DistanceUnit::PercentagePoints => "percentage points",
    };
    format!("{:.1} {unit} to go", distance.value)
}

fn pattern_text(pattern: &Pattern) -> String {
    match pattern {
        Pattern::RecurringLowDimension {
            dimension,
            category,
            low_marks,
            average,
        } => format!("{dimension} ({category}) scored low {low_marks} times, average {average:.1}"),
        Pattern::StandoutDimension {
            dimension,
            category,
            average,
        } => format!("{dimension} ({category}) is a standout at {average:.1}"),
        Pattern::AttendanceDecline {
            current_rate,
            prior_rate,
        } => format!(
            "attendance fell from {:.0}% to {:.0}%",
            prior_rate * 100.0,
            current_rate * 100.0
        ),
        Pattern::MakeupReliance {
            makeup_sessions,
            share,
        } => format!(
            "{makeup_sessions} makeup sessions ({:.0}% of attended)",
            share * 100.0
        ),
        Pattern::SpeechDurationShift {
            current_seconds,
            prior_seconds,
        } => format!("average speech length moved from {prior_seconds:.0}s to {current_seconds:.0}s"),
        Pattern::Plateau { periods, score } => {
            format!("overall score flat around {score:.1} for {periods} periods")
        }
    }
}

pub fn render_markdown(report: &GrowthReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Growth Report: {}", report.display_name);
    let _ = writeln!(
        output,
        "Level {} | {} window {} to {} (exclusive)",
        report.program_level, report.timeframe, report.window.start, report.window.end
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall");
    let _ = writeln!(output, "- Score: {}", score_text(report.overall.score));
    let _ = writeln!(output, "- Level: {}", report.overall.level.label());
    let _ = writeln!(output, "- Trend: {}", trend_text(&report.overall.trend));
    let _ = writeln!(
        output,
        "- Cohort standing: {}",
        percentile_text(report.overall.percentile)
    );
    let _ = writeln!(
        output,
        "- Velocity: {:.2} points/day",
        report.velocity.overall
    );
    let _ = writeln!(
        output,
        "- Speeches scored: {} (prior window {})",
        report.sample.current, report.sample.prior
    );
    if let Some(progress) = &report.progress {
        let _ = writeln!(
            output,
            "- Curriculum: unit {} lesson {}",
            progress.unit_number, progress.lesson_number
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Skills");
    for (name, skill) in &report.skills {
        let mut tags = Vec::new();
        if skill.is_strength {
            tags.push("strength");
        }
        if skill.is_growth_area {
            tags.push("growth area");
        }
        let tag_text = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        let _ = writeln!(
            output,
            "- {}: {} ({}){}",
            name,
            score_text(skill.score),
            trend_text(&skill.trend),
            tag_text
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");
    match report.attendance.rate {
        Some(rate) => {
            let _ = writeln!(
                output,
                "- Rate: {:.0}% ({} present, {} makeup, {} absent)",
                rate * 100.0,
                report.attendance.counts.present,
                report.attendance.counts.makeup,
                report.attendance.counts.absent
            );
        }
        None => {
            let _ = writeln!(output, "No attendance recorded for this window.");
        }
    }
    if let Some(engagement) = report.attendance.engagement_score {
        let _ = writeln!(output, "- Engagement: {engagement:.1}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trajectory");
    if report.trajectory.is_empty() {
        let _ = writeln!(output, "No history recorded yet.");
    } else {
        for point in &report.trajectory {
            let _ = writeln!(
                output,
                "- {}: {}",
                point.period_start,
                score_text(point.overall_score)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Milestones");
    for milestone in &report.milestones.achieved {
        let _ = writeln!(
            output,
            "- [x] {} (since {})",
            milestone.title, milestone.achieved_on
        );
    }
    for milestone in &report.milestones.upcoming {
        let _ = writeln!(
            output,
            "- [ ] {} ({})",
            milestone.title,
            distance_text(milestone.distance.as_ref())
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Patterns");
    if report.patterns.is_empty() {
        let _ = writeln!(output, "No notable patterns in this window.");
    } else {
        for pattern in &report.patterns {
            let _ = writeln!(output, "- {}", pattern_text(pattern));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cohort Comparison");
    for comparison in &report.comparisons {
        let _ = writeln!(
            output,
            "- {}: {} vs {} peers, {}",
            comparison.metric,
            score_text(comparison.student_score),
            comparison.cohort_size,
            percentile_text(comparison.percentile)
        );
    }

    output
}

#[derive(Debug, Serialize)]
struct TrajectoryRow<'a> {
    student_id: &'a str,
    timeframe: &'static str,
    period_start: chrono::NaiveDate,
    overall_score: Option<f64>,
}

pub fn write_trajectory_csv<W: std::io::Write>(
    report: &GrowthReport,
    writer: W,
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for point in &report.trajectory {
        csv_writer.serialize(TrajectoryRow {
            student_id: &report.student_id,
            timeframe: report.timeframe.as_str(),
            period_start: point.period_start,
            overall_score: point.overall_score,
        })?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milestone::{AchievedMilestone, UpcomingMilestone};
    use chrono::NaiveDate;

    fn sample_report(overall: Option<f64>, percentile: Option<f64>) -> GrowthReport {
        let as_of = NaiveDate::from_ymd_opt(2026, 4, 1).expect("valid date");
        let window = TimeWindow::resolve(Timeframe::Month, as_of);
        GrowthReport {
            student_id: "s-100".into(),
            display_name: "Avery Lee".into(),
            program_level: "novice".into(),
            timeframe: Timeframe::Month,
            window,
            overall: OverallGrowth {
                score: overall,
                trend: Trend {
                    direction: Direction::Improving,
                    magnitude: 4.0,
                },
                level: GrowthLevel::from_score(overall),
                percentile,
            },
            skills: BTreeMap::from([(
                "Delivery".to_owned(),
                SkillGrowth {
                    score: Some(100.0),
                    trend: Trend::flat(),
                    is_strength: true,
                    is_growth_area: false,
                },
            )]),
            trajectory: vec![
                TrajectoryPoint {
                    period_start: window.prior_window.start,
                    overall_score: None,
                },
                TrajectoryPoint {
                    period_start: window.start,
                    overall_score: overall,
                },
            ],
            milestones: Milestones {
                achieved: vec![AchievedMilestone {
                    id: "first_speech".into(),
                    title: "First scored speech".into(),
                    achieved_on: window.start,
                }],
                upcoming: vec![UpcomingMilestone {
                    id: "speech_count".into(),
                    title: "Ten scored speeches".into(),
                    distance: Some(Distance {
                        value: 8.0,
                        unit: DistanceUnit::Speeches,
                    }),
                }],
            },
            patterns: vec![Pattern::Plateau {
                periods: 3,
                score: 62.0,
            }],
            comparisons: Vec::new(),
            velocity: Velocity::default(),
            attendance: AttendanceSummary {
                rate: None,
                counts: AttendanceCounts::default(),
                engagement_score: None,
            },
            sample: SampleSizes {
                current: 2,
                prior: 0,
            },
            progress: Some(LessonProgress {
                unit_number: 3,
                lesson_number: LessonNumber::new("3.2"),
            }),
        }
    }

    #[test]
    fn levels_band_overall_score() {
        assert_eq!(GrowthLevel::from_score(None), GrowthLevel::InsufficientData);
        assert_eq!(GrowthLevel::from_score(Some(10.0)), GrowthLevel::Emerging);
        assert_eq!(GrowthLevel::from_score(Some(59.9)), GrowthLevel::Developing);
        assert_eq!(GrowthLevel::from_score(Some(75.0)), GrowthLevel::Proficient);
        assert_eq!(GrowthLevel::from_score(Some(80.0)), GrowthLevel::Advanced);
    }

    #[test]
    fn markdown_spells_out_missing_cohort_data() {
        let output = render_markdown(&sample_report(Some(75.0), None));
        assert!(output.contains("# Growth Report: Avery Lee"));
        assert!(output.contains("- Score: 75.0"));
        assert!(output.contains("- Cohort standing: insufficient cohort data"));
        assert!(output.contains("- Delivery: 100.0 (stable) [strength]"));
        assert!(output.contains("- [ ] Ten scored speeches (8.0 speeches to go)"));
        assert!(output.contains("- Curriculum: unit 3 lesson 3.2"));
        assert!(!output.contains("50th percentile"));
    }

    #[test]
    fn markdown_handles_missing_scores() {
        let output = render_markdown(&sample_report(None, None));
        assert!(output.contains("- Score: insufficient data"));
        assert!(output.contains("- Level: insufficient data"));
        assert!(output.contains("No attendance recorded for this window."));
    }

    #[test]
    fn json_uses_camel_case_and_nulls() {
        let value = serde_json::to_value(sample_report(None, None)).expect("serializable");
        assert!(value["overall"]["score"].is_null());
        assert!(value["overall"]["percentile"].is_null());
        assert_eq!(value["overall"]["level"], "insufficient_data");
        assert_eq!(value["skills"]["Delivery"]["isStrength"], true);
        assert_eq!(value["window"]["priorWindow"]["end"], "2026-03-02");
        assert_eq!(value["patterns"][0]["kind"], "plateau");
        assert_eq!(value["attendance"]["makeup"], 0);
    }

    #[test]
    fn trajectory_csv_has_one_row_per_period() {
        let mut buffer = Vec::new();
        write_trajectory_csv(&sample_report(Some(75.0), Some(60.0)), &mut buffer)
            .expect("csv written");
        let text = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "student_id,timeframe,period_start,overall_score");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "s-100,month,2026-01-31,");
        assert_eq!(lines[2], "s-100,month,2026-03-02,75.0");
    }
}
