//! Staleness predicates for the summary pipeline.
//!
//! The batch sweep and the cascade deliberately use different predicates:
//! the sweep selects on missing summaries (null checks), while the cascade
//! reacts to dirty fields and, at the patient level, to the watermark
//! timestamp. Unifying the two would change observable behavior.

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{AppointmentDocument, AppointmentField, Patient, PatientAppointment};

pub fn document_summary_stale(document: &AppointmentDocument, force: bool) -> bool {
    force || document.summary.is_none()
}

pub fn appointment_summary_stale(appointment: &PatientAppointment, force: bool) -> bool {
    force || appointment.executive_summary.is_none()
}

/// Cascade-path trigger: any write to a watched field counts as stale,
/// regardless of whether a summary already exists.
pub fn triggers_appointment_refresh(changed_fields: &[AppointmentField]) -> bool {
    changed_fields
        .iter()
        .any(AppointmentField::triggers_summary_refresh)
}

/// Batch-path predicate: the two AI fields are regenerated together, so
/// either one missing marks the patient as a candidate.
pub fn patient_summaries_missing(patient: &Patient, force: bool) -> bool {
    force || patient.executive_summary.is_none() || patient.plain_english_record.is_none()
}

/// Cascade-path predicate: regenerate only when a past appointment exists
/// and its last modification is strictly newer than the watermark.
pub fn patient_record_outdated(
    watermark: Option<DateTime<Utc>>,
    latest_past_updated_at: Option<DateTime<Utc>>,
) -> bool {
    match (latest_past_updated_at, watermark) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(latest), Some(mark)) => latest > mark,
    }
}

pub fn is_past(date: NaiveDate, now: DateTime<Utc>) -> bool {
    date < now.date_naive()
}
