//! Final report aggregation
//!
//! Folds the completed jobs of a session into one summary. Worker output is
//! untrusted: hair counts are clamped per job, densities outside the sane
//! range are left out of the average, and malformed results are skipped.

use chrono::{DateTime, NaiveDate, Utc};
use follix_auth::{JobId, PatientId, SessionId};
use follix_control::{AnalysisJob, AnalysisSession};
use serde::Serialize;
use tracing::warn;

use crate::outcome::clip;

/// Most completed jobs a single report aggregates
pub const MAX_REPORT_JOBS: usize = 1000;

/// Most locations listed in a report
pub const MAX_REPORT_LOCATIONS: usize = 500;

/// Per-job hair count ceiling
pub const MAX_JOB_HAIR_COUNT: i64 = 10_000;

/// Highest density accepted into the average
pub const MAX_DENSITY: f64 = 1000.0;

const MAX_LOCATION_CHARS: usize = 100;
const MAX_NOTES_CHARS: usize = 1000;

/// One analyzed location
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocationSummary {
    pub job_id: JobId,
    pub location: String,
    pub hair_count: i64,
    pub density: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_notes: Option<String>,
}

/// Session report
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FinalReport {
    pub session_id: SessionId,
    pub patient_id: PatientId,
    pub session_date: NaiveDate,
    pub total_analyzed_areas: usize,
    pub total_hair_count: i64,
    pub average_density: f64,
    pub analyzed_locations: Vec<LocationSummary>,
    pub generated_at: DateTime<Utc>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn number(result: &serde_json::Value, key: &str) -> Option<f64> {
    result.get(key).and_then(serde_json::Value::as_f64)
}

/// Aggregate completed jobs into a report
///
/// Jobs without a result object are counted as analyzed areas but add
/// nothing to the totals.
pub fn build_report(session: &AnalysisSession, jobs: &[AnalysisJob], generated_at: DateTime<Utc>) -> FinalReport {
    let mut total_hair_count = 0i64;
    let mut density_sum = 0.0;
    let mut density_count = 0usize;
    let mut locations = Vec::new();

    for job in jobs.iter().take(MAX_REPORT_JOBS) {
        let Some(result) = job.result.as_ref().filter(|r| r.is_object()) else {
            warn!(job_id = %job.id, "Skipping job without a usable result");
            continue;
        };

        let hair_count = number(result, "hair_count")
            .map(|n| (n as i64).clamp(0, MAX_JOB_HAIR_COUNT))
            .unwrap_or(0);
        total_hair_count += hair_count;

        let density = number(result, "density").unwrap_or(0.0);
        if (0.0..=MAX_DENSITY).contains(&density) {
            density_sum += density;
            density_count += 1;
        }

        if locations.len() < MAX_REPORT_LOCATIONS {
            locations.push(LocationSummary {
                job_id: job.id,
                location: clip(&job.location_tag, MAX_LOCATION_CHARS),
                hair_count,
                density: round2(density),
                doctor_notes: job.doctor_notes.as_deref().map(|n| clip(n, MAX_NOTES_CHARS)),
            });
        }
    }

    let average_density = if density_count > 0 {
        round2(density_sum / density_count as f64)
    } else {
        0.0
    };

    FinalReport {
        session_id: session.id,
        patient_id: session.patient_id,
        session_date: session.session_date,
        total_analyzed_areas: jobs.len().min(MAX_REPORT_JOBS),
        total_hair_count,
        average_density,
        analyzed_locations: locations,
        generated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use follix_auth::{ProfileId, UserId};
    use serde_json::json;

    fn session() -> AnalysisSession {
        AnalysisSession::new(
            PatientId::new(),
            UserId::new(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        )
    }

    fn job(session: &AnalysisSession, location: &str, result: Option<serde_json::Value>) -> AnalysisJob {
        let mut job = AnalysisJob::new(
            session.id,
            session.patient_id,
            ProfileId::new(),
            UserId::new(),
            location,
            "uploads/x.jpg",
        );
        job.result = result;
        job
    }

    #[test]
    fn test_totals_and_average() {
        let s = session();
        let jobs = vec![
            job(&s, "crown", Some(json!({"hair_count": 120, "density": 80.456}))),
            job(&s, "temple", Some(json!({"hair_count": 80, "density": 60.0}))),
        ];

        let report = build_report(&s, &jobs, Utc::now());
        assert_eq!(report.total_analyzed_areas, 2);
        assert_eq!(report.total_hair_count, 200);
        assert_eq!(report.average_density, 70.23);
        assert_eq!(report.analyzed_locations.len(), 2);
        assert_eq!(report.analyzed_locations[0].density, 80.46);
    }

    #[test]
    fn test_untrusted_values_are_bounded() {
        let s = session();
        let jobs = vec![
            job(&s, "a", Some(json!({"hair_count": 50_000, "density": 5000.0}))),
            job(&s, "b", Some(json!({"hair_count": -4, "density": -1.0}))),
            job(&s, "c", Some(json!({"hair_count": "many", "density": 40}))),
            job(&s, "d", Some(json!("not an object"))),
            job(&s, "e", None),
        ];

        let report = build_report(&s, &jobs, Utc::now());
        assert_eq!(report.total_hair_count, MAX_JOB_HAIR_COUNT);
        assert_eq!(report.average_density, 40.0);
        assert_eq!(report.analyzed_locations.len(), 3);
        assert_eq!(report.total_analyzed_areas, 5);
    }

    #[test]
    fn test_location_list_is_capped() {
        let s = session();
        let jobs: Vec<_> = (0..MAX_REPORT_LOCATIONS + 20)
            .map(|i| job(&s, &format!("spot-{i}"), Some(json!({"hair_count": 1, "density": 1}))))
            .collect();

        let report = build_report(&s, &jobs, Utc::now());
        assert_eq!(report.analyzed_locations.len(), MAX_REPORT_LOCATIONS);
        assert_eq!(report.total_hair_count, (MAX_REPORT_LOCATIONS + 20) as i64);
    }

    #[test]
    fn test_long_text_is_clipped() {
        let s = session();
        let mut long = job(&s, &"x".repeat(300), Some(json!({"hair_count": 1})));
        long.doctor_notes = Some("n".repeat(1500));

        let report = build_report(&s, &[long], Utc::now());
        let entry = &report.analyzed_locations[0];
        assert_eq!(entry.location.chars().count(), 100);
        assert_eq!(entry.doctor_notes.as_deref().map(str::len), Some(1000));
    }
}
