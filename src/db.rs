use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    AttendanceObservation, AttendanceStatus, FeedbackObservation, LessonNumber, Score,
    StarRatings, StudentIdentity,
};
use crate::store::{AccessScope, RecordStore};
use crate::window::DateRange;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct PgRecordStore {
    pool: PgPool,
    scope: AccessScope,
}

impl PgRecordStore {
    pub fn new(pool: PgPool, scope: AccessScope) -> Self {
        Self { pool, scope }
    }
}

fn star(value: i16) -> u8 {
    u8::try_from(value).unwrap_or(0)
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn fetch_student_identity(
        &self,
        student_id: &str,
    ) -> Result<Option<StudentIdentity>, StoreError> {
        let row = sqlx::query("SELECT id, full_name, level FROM growth.students WHERE id = $1")
            .bind(student_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(StudentIdentity {
            student_id: row.try_get("id")?,
            display_name: row.try_get("full_name")?,
            level: row.try_get("level")?,
        }))
    }

    async fn fetch_attendance(
        &self,
        student_id: &str,
        range: DateRange,
    ) -> Result<Vec<AttendanceObservation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT session_date, status, effort_attitude, inquiry, applied_skill, applied_feedback
            FROM growth.attendance
            WHERE student_id = $1 AND session_date >= $2 AND session_date < $3
            ORDER BY session_date
            "#,
        )
        .bind(student_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("status")?;
            records.push(AttendanceObservation {
                session_date: row.try_get("session_date")?,
                ratings: StarRatings::new(
                    star(row.try_get("effort_attitude")?),
                    star(row.try_get("inquiry")?),
                    star(row.try_get("applied_skill")?),
                    star(row.try_get("applied_feedback")?),
                ),
                status: status.parse::<AttendanceStatus>().map_err(StoreError::Decode)?,
            });
        }

        Ok(records)
    }

    async fn fetch_feedback(
        &self,
        student_id: &str,
        range: DateRange,
    ) -> Result<Vec<FeedbackObservation>, StoreError> {
        let mut query = String::from(
            "SELECT session_date, unit_number, lesson_number, rubric_scores, \
             speech_duration_seconds, instructor \
             FROM growth.feedback \
             WHERE student_id = $1 AND session_date >= $2 AND session_date < $3",
        );

        let instructors = self.scope.instructor_list();
        if instructors.is_some() {
            query.push_str(" AND instructor = ANY($4)");
        }
        query.push_str(" ORDER BY session_date, unit_number");

        let mut rows = sqlx::query(&query)
            .bind(student_id)
            .bind(range.start)
            .bind(range.end);
        if let Some(allowed) = instructors {
            rows = rows.bind(allowed);
        }

        let records = rows.fetch_all(&self.pool).await?;
        let mut feedback = Vec::with_capacity(records.len());

        for row in records {
            let session_date: NaiveDate = row.try_get("session_date")?;
            let raw_scores: serde_json::Value = row.try_get("rubric_scores")?;
            let rubric_scores: BTreeMap<String, Score> = serde_json::from_value(raw_scores)
                .map_err(|err| {
                    StoreError::Decode(format!(
                        "rubric scores for {student_id} on {session_date}: {err}"
                    ))
                })?;
            let unit_number: i32 = row.try_get("unit_number")?;
            let duration: Option<i32> = row.try_get("speech_duration_seconds")?;

            feedback.push(FeedbackObservation {
                session_date,
                unit_number: u32::try_from(unit_number).map_err(|_| {
                    StoreError::Decode(format!("negative unit number {unit_number}"))
                })?,
                lesson_number: LessonNumber::new(row.try_get::<String, _>("lesson_number")?),
                rubric_scores,
                speech_duration_seconds: duration.and_then(|seconds| u32::try_from(seconds).ok()),
                instructor: row.try_get("instructor")?,
            });
        }

        Ok(feedback)
    }

    async fn fetch_cohort_scores(
        &self,
        level: &str,
        metric_key: &str,
        range: DateRange,
    ) -> Result<Vec<f64>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT AVG(score) AS score
            FROM growth.cohort_score_snapshots
            WHERE level = $1 AND metric_key = $2 AND observed_on >= $3 AND observed_on < $4
            GROUP BY student_id
            "#,
        )
        .bind(level)
        .bind(metric_key)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(score) = row.try_get::<Option<f64>, _>("score")? {
                scores.push(score);
            }
        }
        Ok(scores)
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("avery-lee", "Avery Lee", "novice"),
        ("jules-moreno", "Jules Moreno", "novice"),
        ("kiara-patel", "Kiara Patel", "novice"),
        ("noah-kim", "Noah Kim", "novice"),
        ("rosa-diaz", "Rosa Diaz", "novice"),
        ("theo-grant", "Theo Grant", "novice"),
    ];

    for (id, name, level) in students {
        sqlx::query(
            r#"
            INSERT INTO growth.students (id, full_name, level)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, level = EXCLUDED.level
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(level)
        .execute(pool)
        .await?;
    }

    let today = Utc::now().date_naive();
    let lesson_plan = ["1.1", "1.2", "1.3", "2.1", "2.2", "2.3", "2.4", "3.1"];

    for (week, lesson) in lesson_plan.iter().enumerate() {
        let session_date = today - Duration::days(7 * (lesson_plan.len() - week) as i64);
        let status = match week {
            2 => AttendanceStatus::Absent,
            5 => AttendanceStatus::Makeup,
            _ => AttendanceStatus::Present,
        };
        let stars: i16 = if week < 4 { 3 } else { 4 };

        sqlx::query(
            r#"
            INSERT INTO growth.attendance
            (id, student_id, session_date, status, effort_attitude, inquiry, applied_skill, applied_feedback)
            VALUES ($1, $2, $3, $4, $5, $5, $5, $5)
            ON CONFLICT (student_id, session_date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind("avery-lee")
        .bind(session_date)
        .bind(status.as_str())
        .bind(stars)
        .execute(pool)
        .await?;

        if !status.attended() {
            continue;
        }

        let growth = (week / 2) as i64;
        let rubric = serde_json::json!({
            "time_management": (3 + growth).min(5),
            "rebuttal": (2 + growth).min(5),
            "evidence": if week % 3 == 0 { serde_json::json!("N/A") } else { serde_json::json!(3) },
            "organization": 3,
            "eye_contact": (2 + growth).min(5),
        });
        let unit_number: i32 = lesson
            .split('.')
            .next()
            .and_then(|unit| unit.parse().ok())
            .context("lesson plan entries start with a unit number")?;

        sqlx::query(
            r#"
            INSERT INTO growth.feedback
            (id, student_id, session_date, unit_number, lesson_number, rubric_scores,
             speech_duration_seconds, instructor, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind("avery-lee")
        .bind(session_date)
        .bind(unit_number)
        .bind(*lesson)
        .bind(rubric)
        .bind(180 + 15 * week as i32)
        .bind("Dana Ruiz")
        .bind(format!("seed-avery-{lesson}"))
        .execute(pool)
        .await?;
    }

    let peer_scores = [
        ("jules-moreno", 48.0),
        ("kiara-patel", 66.0),
        ("noah-kim", 71.5),
        ("rosa-diaz", 58.0),
        ("theo-grant", 82.0),
    ];
    for (student_id, base) in peer_scores {
        for (metric_key, offset) in [("overall", 0.0), ("Delivery", 6.0), ("Argumentation", -4.0)] {
            sqlx::query(
                r#"
                INSERT INTO growth.cohort_score_snapshots
                (student_id, level, metric_key, observed_on, score)
                VALUES ($1, 'novice', $2, $3, $4)
                ON CONFLICT (student_id, metric_key, observed_on) DO UPDATE
                SET score = EXCLUDED.score
                "#,
            )
            .bind(student_id)
            .bind(metric_key)
            .bind(today - Duration::days(3))
            .bind(base + offset)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}
