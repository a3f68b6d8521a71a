use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::models::{AttendanceObservation, FeedbackObservation, StudentIdentity};
use crate::window::DateRange;

/// Which instructors' feedback a caller may see.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AccessScope {
    #[default]
    All,
    Instructors(Vec<String>),
}

impl AccessScope {
    pub fn permits(&self, instructor: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Instructors(allowed) => instructor.is_some_and(|name| {
                allowed
                    .iter()
                    .any(|candidate| candidate.trim().eq_ignore_ascii_case(name.trim()))
            }),
        }
    }

    /// `None` for unrestricted access.
    pub fn instructor_list(&self) -> Option<Vec<String>> {
        match self {
            Self::All => None,
            Self::Instructors(allowed) => Some(allowed.clone()),
        }
    }
}

/// Read-only source of observations. Implementations apply their own
/// `AccessScope`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_student_identity(
        &self,
        student_id: &str,
    ) -> Result<Option<StudentIdentity>, StoreError>;

    async fn fetch_attendance(
        &self,
        student_id: &str,
        range: DateRange,
    ) -> Result<Vec<AttendanceObservation>, StoreError>;

    async fn fetch_feedback(
        &self,
        student_id: &str,
        range: DateRange,
    ) -> Result<Vec<FeedbackObservation>, StoreError>;

    /// One pre-aggregated 0-100 score per peer in `level` for `metric_key`.
    async fn fetch_cohort_scores(
        &self,
        level: &str,
        metric_key: &str,
        range: DateRange,
    ) -> Result<Vec<f64>, StoreError>;
}

#[derive(Debug, Clone)]
struct CohortEntry {
    level: String,
    metric_key: String,
    observed_on: NaiveDate,
    score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    students: HashMap<String, StudentIdentity>,
    attendance: HashMap<String, Vec<AttendanceObservation>>,
    feedback: HashMap<String, Vec<FeedbackObservation>>,
    cohort: Vec<CohortEntry>,
    scope: AccessScope,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: AccessScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_student(mut self, identity: StudentIdentity) -> Self {
        self.students.insert(identity.student_id.clone(), identity);
        self
    }

    pub fn with_attendance(mut self, student_id: &str, record: AttendanceObservation) -> Self {
        self.attendance
            .entry(student_id.to_owned())
            .or_default()
            .push(record);
        self
    }

    pub fn with_feedback(mut self, student_id: &str, record: FeedbackObservation) -> Self {
        self.feedback
            .entry(student_id.to_owned())
            .or_default()
            .push(record);
        self
    }

    pub fn with_cohort_score(
        mut self,
        level: &str,
        metric_key: &str,
        observed_on: NaiveDate,
        score: f64,
    ) -> Self {
        self.cohort.push(CohortEntry {
            level: level.to_owned(),
            metric_key: metric_key.to_owned(),
            observed_on,
            score,
        });
        self
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_student_identity(
        &self,
        student_id: &str,
    ) -> Result<Option<StudentIdentity>, StoreError> {
        Ok(self.students.get(student_id).cloned())
    }

    async fn fetch_attendance(
        &self,
        student_id: &str,
        range: DateRange,
    ) -> Result<Vec<AttendanceObservation>, StoreError> {
        Ok(self
            .attendance
            .get(student_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| range.contains(r.session_date))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_feedback(
        &self,
        student_id: &str,
        range: DateRange,
    ) -> Result<Vec<FeedbackObservation>, StoreError> {
        Ok(self
            .feedback
            .get(student_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| range.contains(r.session_date))
                    .filter(|r| self.scope.permits(r.instructor.as_deref()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_cohort_scores(
        &self,
        level: &str,
        metric_key: &str,
        range: DateRange,
    ) -> Result<Vec<f64>, StoreError> {
        Ok(self
            .cohort
            .iter()
            .filter(|entry| {
                entry.level == level
                    && entry.metric_key == metric_key
                    && range.contains(entry.observed_on)
            })
            .map(|entry| entry.score)
            .collect())
    }
}
