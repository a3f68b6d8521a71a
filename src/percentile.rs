use std::cmp::Ordering;

use serde::Serialize;

/// Empirical percentile: `(below + 0.5 * equal) / n * 100`. Cohorts smaller than
/// `min_cohort_size` produce `None`.
pub fn percentile_rank(score: Option<f64>, cohort: &[f64], min_cohort_size: usize) -> Option<f64> {
    let score = score?;
    let peers: Vec<f64> = cohort.iter().copied().filter(|v| v.is_finite()).collect();
    if peers.len() < min_cohort_size.max(1) {
        return None;
    }

    let mut below = 0usize;
    let mut equal = 0usize;
    for peer in &peers {
        match peer.partial_cmp(&score) {
            Some(Ordering::Less) => below += 1,
            Some(Ordering::Equal) => equal += 1,
            _ => {}
        }
    }

    Some((below as f64 + 0.5 * equal as f64) / peers.len() as f64 * 100.0)
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[middle - 1] + sorted[middle]) / 2.0)
    } else {
        Some(sorted[middle])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortComparison {
    pub metric: String,
    pub student_score: Option<f64>,
    pub cohort_size: usize,
    pub percentile: Option<f64>,
    pub cohort_median: Option<f64>,
}

pub fn compare(
    metric: &str,
    student_score: Option<f64>,
    cohort: &[f64],
    min_cohort_size: usize,
) -> CohortComparison {
    let percentile = percentile_rank(student_score, cohort, min_cohort_size);
    CohortComparison {
        metric: metric.to_owned(),
        student_score,
        cohort_size: cohort.iter().filter(|v| v.is_finite()).count(),
        percentile,
        cohort_median: percentile.and(median(cohort)),
    }
}
