use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDocument {
    pub id: Uuid,
    #[serde(rename = "patient_appointment_id")]
    pub appointment_id: Uuid,
    pub file_path: String,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    #[serde(rename = "healthcare_provider_id")]
    pub provider_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    /// Free-text provider/partner name as entered by the patient. Distinct
    /// from the linked provider record and not part of the watched field set.
    pub partner: Option<String>,
    pub location: Option<String>,
    /// Visit summary written through the CRUD forms.
    pub summary: Option<String>,
    pub patient_notes: Option<String>,
    /// AI-generated; written only by the summary pipeline.
    pub executive_summary: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PatientAppointment {
    /// Past is date-granular: appointments earlier than today's date.
    /// Today's appointments do not count as past.
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.date < now.date_naive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub executive_summary: Option<String>,
    pub plain_english_record: Option<String>,
    /// Staleness watermark: when the two AI fields were last regenerated.
    pub executive_summary_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthcareProvider {
    pub id: Uuid,
    pub name: String,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientTask {
    pub id: Uuid,
    #[serde(rename = "patient_appointment_id")]
    pub appointment_id: Option<Uuid>,
    pub description: String,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fully loaded appointment aggregate handed to the prompt builder.
#[derive(Debug, Clone)]
pub struct AppointmentContext {
    pub appointment: PatientAppointment,
    pub provider: Option<HealthcareProvider>,
    pub documents: Vec<AppointmentDocument>,
    pub tasks: Vec<PatientTask>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatientSummaries {
    pub executive_summary: String,
    pub plain_english_record: String,
}

/// Externally editable appointment columns, used by the cascade entry point
/// to decide whether an edit warrants a summary refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentField {
    Summary,
    PatientNotes,
    Date,
    Time,
    Location,
    Provider,
    Partner,
    ExecutiveSummary,
}

impl AppointmentField {
    pub fn triggers_summary_refresh(&self) -> bool {
        matches!(
            self,
            AppointmentField::Summary
                | AppointmentField::PatientNotes
                | AppointmentField::Date
                | AppointmentField::Time
                | AppointmentField::Location
                | AppointmentField::Provider
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryStage {
    Document,
    Appointment,
    Patient,
}

impl SummaryStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStage::Document => "document",
            SummaryStage::Appointment => "appointment",
            SummaryStage::Patient => "patient",
        }
    }
}

impl fmt::Display for SummaryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StageJobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Retrying,
}

impl StageJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageJobStatus::Completed | StageJobStatus::Failed)
    }

    pub fn can_transition_to(&self, target: &StageJobStatus) -> bool {
        use StageJobStatus::*;
        match (self, target) {
            (Queued, Processing) => true,
            (Processing, Completed) => true,
            (_, Failed) => true,
            (Failed, Retrying) => true,
            (Retrying, Processing) => true,
            _ => false,
        }
    }
}

/// One unit of cascade work: a single pipeline stage for a single entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageJob {
    pub job_id: Uuid,
    pub stage: SummaryStage,
    pub entity_id: Uuid,
    pub status: StageJobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
}

impl StageJob {
    pub fn new(stage: SummaryStage, entity_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            stage,
            entity_id,
            status: StageJobStatus::Queued,
            retry_count: 0,
            max_retries: 3,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
            worker_id: None,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries && self.status == StageJobStatus::Failed
    }

    /// Retry budget check against the worker's local copy, whose status may
    /// lag behind the queued record.
    pub fn can_retry_after_failure(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Hand each record to the queue instead of processing inline.
    pub queue: bool,
    /// Regenerate summaries even when they already exist.
    pub force: bool,
    /// Restrict the sweep to one patient's records.
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct RecordError {
    pub model: &'static str,
    pub id: Uuid,
    pub message: String,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.model, self.id, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SectionReport {
    pub found: usize,
    pub processed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub documents: SectionReport,
    pub appointments: SectionReport,
    pub patients: SectionReport,
    pub errors: Vec<RecordError>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub max_concurrent_jobs: u32,
    pub job_timeout_seconds: u64,
    pub retry_delay_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("summary-worker-{}", Uuid::new_v4()),
            max_concurrent_jobs: 2,
            job_timeout_seconds: 300,
            retry_delay_seconds: 30,
            cleanup_interval_seconds: 3600,
        }
    }
}
