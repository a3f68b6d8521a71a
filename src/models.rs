use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const RUBRIC_MIN: u8 = 1;
pub const RUBRIC_MAX: u8 = 5;
pub const NOT_APPLICABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentIdentity {
    pub student_id: String,
    pub display_name: String,
    pub level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Makeup,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Makeup => "makeup",
        }
    }

    pub fn attended(self) -> bool {
        !matches!(self, Self::Absent)
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "makeup" | "make-up" => Ok(Self::Makeup),
            other => Err(format!(
                "invalid attendance status '{other}', expected present, absent or makeup"
            )),
        }
    }
}

/// Star ratings an instructor gives per session. Zero means "not rated".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StarRatings {
    pub effort_attitude: u8,
    pub inquiry: u8,
    pub applied_skill: u8,
    pub applied_feedback: u8,
}

impl StarRatings {
    pub fn new(effort_attitude: u8, inquiry: u8, applied_skill: u8, applied_feedback: u8) -> Self {
        Self {
            effort_attitude,
            inquiry,
            applied_skill,
            applied_feedback,
        }
    }

    /// Ratings inside the 1-5 range; anything else is treated as unrated.
    pub fn rated(&self) -> impl Iterator<Item = u8> {
        [
            self.effort_attitude,
            self.inquiry,
            self.applied_skill,
            self.applied_feedback,
        ]
        .into_iter()
        .filter(|value| (RUBRIC_MIN..=RUBRIC_MAX).contains(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceObservation {
    pub session_date: NaiveDate,
    pub ratings: StarRatings,
    pub status: AttendanceStatus,
}

/// A rubric value already checked to lie within 1-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: u8) -> Option<Self> {
        (RUBRIC_MIN..=RUBRIC_MAX)
            .contains(&value)
            .then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// A single rubric value. `NotApplicable` is excluded from averages rather than
/// counted as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Score {
    Numeric(Rating),
    NotApplicable,
}

impl Score {
    pub fn numeric(value: u8) -> Option<Self> {
        Rating::new(value).map(Self::Numeric)
    }

    pub fn value(self) -> Option<u8> {
        match self {
            Self::Numeric(rating) => Some(rating.get()),
            Self::NotApplicable => None,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(rating) => write!(f, "{}", rating.get()),
            Self::NotApplicable => f.write_str(NOT_APPLICABLE),
        }
    }
}

impl FromStr for Score {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case(NOT_APPLICABLE) || trimmed.eq_ignore_ascii_case("na") {
            return Ok(Self::NotApplicable);
        }
        trimmed
            .parse::<u8>()
            .ok()
            .and_then(Self::numeric)
            .ok_or_else(|| format!("invalid rubric score '{trimmed}', expected 1-5 or N/A"))
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Numeric(rating) => serializer.serialize_u8(rating.get()),
            Self::NotApplicable => serializer.serialize_str(NOT_APPLICABLE),
        }
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
        }

        let invalid = |shown: String| -> D::Error {
            serde::de::Error::custom(format!("invalid rubric score {shown}, expected 1-5 or N/A"))
        };

        match Raw::deserialize(deserializer)? {
            Raw::Int(value) => u8::try_from(value)
                .ok()
                .and_then(Score::numeric)
                .ok_or_else(|| invalid(value.to_string())),
            Raw::Float(value) if value.fract() == 0.0 && value >= 0.0 && value <= 255.0 => {
                Score::numeric(value as u8).ok_or_else(|| invalid(value.to_string()))
            }
            Raw::Float(value) => Err(invalid(value.to_string())),
            Raw::Text(value) => value.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Lesson identifiers such as "3", "3.2" or "3.10". Ordered segment by segment,
/// numerically where both segments are numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LessonNumber(String);

impl LessonNumber {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LessonNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for LessonNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut left = self.0.split('.');
        let mut right = other.0.split('.');
        loop {
            match (left.next(), right.next()) {
                (None, None) => return self.0.cmp(&other.0),
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(a), Some(b)) => {
                    let ordering = match (a.parse::<u64>(), b.parse::<u64>()) {
                        (Ok(a), Ok(b)) => a.cmp(&b),
                        _ => a.cmp(b),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
            }
        }
    }
}

impl PartialOrd for LessonNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackObservation {
    pub session_date: NaiveDate,
    pub unit_number: u32,
    pub lesson_number: LessonNumber,
    pub rubric_scores: BTreeMap<String, Score>,
    pub speech_duration_seconds: Option<u32>,
    pub instructor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rated(value: u8) -> Score {
        Score::numeric(value).expect("rubric value in range")
    }

    #[test]
    fn score_parses_numbers_and_not_applicable() {
        let scores: BTreeMap<String, Score> =
            serde_json::from_str(r#"{"rebuttal": 4, "evidence": "N/A", "poise": "3", "pace": 2.0}"#)
                .expect("valid scores");
        assert_eq!(scores["rebuttal"], rated(4));
        assert_eq!(scores["evidence"], Score::NotApplicable);
        assert_eq!(scores["poise"], rated(3));
        assert_eq!(scores["pace"], rated(2));
    }

    #[test]
    fn score_rejects_out_of_range_values() {
        assert!(serde_json::from_str::<Score>("0").is_err());
        assert!(serde_json::from_str::<Score>("6").is_err());
        assert!(serde_json::from_str::<Score>("2.5").is_err());
        assert!(serde_json::from_str::<Score>(r#""great""#).is_err());
    }

    #[test]
    fn score_serializes_sentinel_as_string() {
        let json = serde_json::to_string(&vec![rated(5), Score::NotApplicable])
            .expect("serializable");
        assert_eq!(json, r#"[5,"N/A"]"#);
    }

    #[test]
    fn out_of_range_ratings_cannot_be_built() {
        assert_eq!(Rating::new(0), None);
        assert_eq!(Rating::new(9), None);
        assert_eq!(Score::numeric(9), None);
        assert_eq!(rated(5).value(), Some(5));
        assert_eq!("9".parse::<Score>(), Err("invalid rubric score '9', expected 1-5 or N/A".to_owned()));
    }

    #[test]
    fn lesson_numbers_order_numerically_by_segment() {
        let mut lessons = vec![
            LessonNumber::new("3.10"),
            LessonNumber::new("3"),
            LessonNumber::new("10"),
            LessonNumber::new("3.2"),
        ];
        lessons.sort();
        let ordered: Vec<&str> = lessons.iter().map(LessonNumber::as_str).collect();
        assert_eq!(ordered, vec!["3", "3.2", "3.10", "10"]);
    }

    #[test]
    fn unrated_stars_are_skipped() {
        let ratings = StarRatings::new(5, 0, 3, 9);
        assert_eq!(ratings.rated().collect::<Vec<_>>(), vec![5, 3]);
    }

    #[test]
    fn makeup_counts_as_attended() {
        assert!(AttendanceStatus::Makeup.attended());
        assert!(AttendanceStatus::Present.attended());
        assert!(!AttendanceStatus::Absent.attended());
        assert_eq!("Make-Up".parse::<AttendanceStatus>(), Ok(AttendanceStatus::Makeup));
    }
}
