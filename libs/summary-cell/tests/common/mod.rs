// Shared fixtures for the pipeline integration tests: an in-memory record
// store, a scripted text-generation fake, and executors with controlled
// clocks.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use summary_cell::{
    AppointmentContext, AppointmentDocument, DocumentTextExtractor, HealthcareProvider, Patient,
    PatientAppointment, PatientSummaries, PatientTask, RecordStore, StageExecutor, StageJob,
    StageRunner, SummaryError, TextGenerator,
};

pub const SIMULATED_API_FAILURE: &str = "simulated API failure";

// ---------------------------------------------------------------------------
// Fixtures

pub fn patient() -> Patient {
    Patient {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        executive_summary: None,
        plain_english_record: None,
        executive_summary_updated_at: None,
    }
}

pub fn appointment(patient_id: Uuid, date: NaiveDate) -> PatientAppointment {
    PatientAppointment {
        id: Uuid::new_v4(),
        patient_id,
        provider_id: None,
        date,
        time: None,
        partner: Some("Dr. Okafor".to_string()),
        location: Some("Eastside Clinic".to_string()),
        summary: Some("Routine checkup".to_string()),
        patient_notes: None,
        executive_summary: None,
        updated_at: Utc::now(),
    }
}

pub fn document(appointment_id: Uuid) -> AppointmentDocument {
    AppointmentDocument {
        id: Uuid::new_v4(),
        appointment_id,
        file_path: format!("documents/{}.txt", Uuid::new_v4()),
        summary: None,
        created_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// In-memory record store

#[derive(Default)]
struct StoreState {
    documents: HashMap<Uuid, AppointmentDocument>,
    appointments: HashMap<Uuid, PatientAppointment>,
    patients: HashMap<Uuid, Patient>,
    providers: HashMap<Uuid, HealthcareProvider>,
    tasks: Vec<PatientTask>,
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    state: Mutex<StoreState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_patient(&self, patient: Patient) {
        self.state.lock().unwrap().patients.insert(patient.id, patient);
    }

    pub fn insert_appointment(&self, appointment: PatientAppointment) {
        self.state
            .lock()
            .unwrap()
            .appointments
            .insert(appointment.id, appointment);
    }

    pub fn insert_document(&self, document: AppointmentDocument) {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert(document.id, document);
    }

    pub fn insert_provider(&self, provider: HealthcareProvider) {
        self.state
            .lock()
            .unwrap()
            .providers
            .insert(provider.id, provider);
    }

    pub fn document(&self, id: Uuid) -> AppointmentDocument {
        self.state.lock().unwrap().documents[&id].clone()
    }

    pub fn appointment(&self, id: Uuid) -> PatientAppointment {
        self.state.lock().unwrap().appointments[&id].clone()
    }

    pub fn patient(&self, id: Uuid) -> Patient {
        self.state.lock().unwrap().patients[&id].clone()
    }

    /// Backdate or bump an appointment's last-modified timestamp directly.
    pub fn set_appointment_updated_at(&self, id: Uuid, updated_at: DateTime<Utc>) {
        self.state
            .lock()
            .unwrap()
            .appointments
            .get_mut(&id)
            .unwrap()
            .updated_at = updated_at;
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_document(&self, id: Uuid) -> Result<AppointmentDocument, SummaryError> {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(&id)
            .cloned()
            .ok_or(SummaryError::NotFound {
                entity: "document",
                id,
            })
    }

    async fn list_documents(
        &self,
        only_missing: bool,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<AppointmentDocument>, SummaryError> {
        let state = self.state.lock().unwrap();
        let mut documents: Vec<AppointmentDocument> = state
            .documents
            .values()
            .filter(|d| !only_missing || d.summary.is_none())
            .filter(|d| match patient_id {
                Some(pid) => state
                    .appointments
                    .get(&d.appointment_id)
                    .is_some_and(|a| a.patient_id == pid),
                None => true,
            })
            .cloned()
            .collect();
        documents.sort_by_key(|d| d.created_at);
        Ok(documents)
    }

    async fn set_document_summary(&self, id: Uuid, summary: &str) -> Result<(), SummaryError> {
        let mut state = self.state.lock().unwrap();
        let document = state.documents.get_mut(&id).ok_or(SummaryError::NotFound {
            entity: "document",
            id,
        })?;
        document.summary = Some(summary.to_string());
        Ok(())
    }

    async fn get_appointment(&self, id: Uuid) -> Result<PatientAppointment, SummaryError> {
        self.state
            .lock()
            .unwrap()
            .appointments
            .get(&id)
            .cloned()
            .ok_or(SummaryError::NotFound {
                entity: "appointment",
                id,
            })
    }

    async fn load_appointment_context(
        &self,
        id: Uuid,
    ) -> Result<AppointmentContext, SummaryError> {
        let state = self.state.lock().unwrap();
        let appointment = state
            .appointments
            .get(&id)
            .cloned()
            .ok_or(SummaryError::NotFound {
                entity: "appointment",
                id,
            })?;

        let provider = appointment
            .provider_id
            .and_then(|pid| state.providers.get(&pid).cloned());

        let mut documents: Vec<AppointmentDocument> = state
            .documents
            .values()
            .filter(|d| d.appointment_id == id)
            .cloned()
            .collect();
        documents.sort_by_key(|d| d.created_at);

        let tasks: Vec<PatientTask> = state
            .tasks
            .iter()
            .filter(|t| t.appointment_id == Some(id))
            .cloned()
            .collect();

        Ok(AppointmentContext {
            appointment,
            provider,
            documents,
            tasks,
        })
    }

    async fn list_appointments(
        &self,
        only_missing: bool,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<PatientAppointment>, SummaryError> {
        let state = self.state.lock().unwrap();
        let mut appointments: Vec<PatientAppointment> = state
            .appointments
            .values()
            .filter(|a| !only_missing || a.executive_summary.is_none())
            .filter(|a| patient_id.is_none_or(|pid| a.patient_id == pid))
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.date);
        Ok(appointments)
    }

    async fn set_appointment_executive_summary(
        &self,
        id: Uuid,
        summary: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SummaryError> {
        let mut state = self.state.lock().unwrap();
        let appointment = state
            .appointments
            .get_mut(&id)
            .ok_or(SummaryError::NotFound {
                entity: "appointment",
                id,
            })?;
        appointment.executive_summary = Some(summary.to_string());
        appointment.updated_at = updated_at;
        Ok(())
    }

    async fn get_patient(&self, id: Uuid) -> Result<Patient, SummaryError> {
        self.state
            .lock()
            .unwrap()
            .patients
            .get(&id)
            .cloned()
            .ok_or(SummaryError::NotFound {
                entity: "patient",
                id,
            })
    }

    async fn list_patients(
        &self,
        only_missing: bool,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<Patient>, SummaryError> {
        let state = self.state.lock().unwrap();
        let mut patients: Vec<Patient> = state
            .patients
            .values()
            .filter(|p| {
                !only_missing
                    || p.executive_summary.is_none()
                    || p.plain_english_record.is_none()
            })
            .filter(|p| patient_id.is_none_or(|pid| p.id == pid))
            .cloned()
            .collect();
        patients.sort_by_key(|p| p.id);
        Ok(patients)
    }

    async fn past_appointments(
        &self,
        patient_id: Uuid,
        before: NaiveDate,
    ) -> Result<Vec<PatientAppointment>, SummaryError> {
        let state = self.state.lock().unwrap();
        let mut appointments: Vec<PatientAppointment> = state
            .appointments
            .values()
            .filter(|a| a.patient_id == patient_id && a.date < before)
            .cloned()
            .collect();
        appointments.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(appointments)
    }

    async fn latest_past_appointment(
        &self,
        patient_id: Uuid,
        before: NaiveDate,
    ) -> Result<Option<PatientAppointment>, SummaryError> {
        Ok(self
            .past_appointments(patient_id, before)
            .await?
            .into_iter()
            .next())
    }

    async fn set_patient_summaries(
        &self,
        id: Uuid,
        summaries: &PatientSummaries,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SummaryError> {
        let mut state = self.state.lock().unwrap();
        let patient = state.patients.get_mut(&id).ok_or(SummaryError::NotFound {
            entity: "patient",
            id,
        })?;
        patient.executive_summary = Some(summaries.executive_summary.clone());
        patient.plain_english_record = Some(summaries.plain_english_record.clone());
        patient.executive_summary_updated_at = Some(updated_at);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scripted text generator

#[derive(Debug, Clone)]
pub struct GeneratorCall {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Records every call and answers with a configurable response. Prompts
/// containing the failure marker fail with `SummaryError::Api`.
pub struct ScriptedGenerator {
    calls: Mutex<Vec<GeneratorCall>>,
    response: Mutex<String>,
    fail_marker: Mutex<Option<String>>,
}

impl ScriptedGenerator {
    pub fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            response: Mutex::new(response.to_string()),
            fail_marker: Mutex::new(None),
        })
    }

    pub fn set_response(&self, response: &str) {
        *self.response.lock().unwrap() = response.to_string();
    }

    pub fn fail_on(&self, marker: &str) {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, SummaryError> {
        self.calls.lock().unwrap().push(GeneratorCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            max_tokens,
            temperature,
        });

        if let Some(marker) = self.fail_marker.lock().unwrap().as_deref() {
            if user_prompt.contains(marker) {
                return Err(SummaryError::Api(SIMULATED_API_FAILURE.to_string()));
            }
        }

        Ok(self.response.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Document text fake

/// Maps document ids to extracted text, with a default for the rest.
pub struct MapExtractor {
    texts: Mutex<HashMap<Uuid, String>>,
}

impl MapExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            texts: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_text(&self, document_id: Uuid, text: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(document_id, text.to_string());
    }
}

#[async_trait]
impl DocumentTextExtractor for MapExtractor {
    async fn extract(&self, document: &AppointmentDocument) -> Result<String, SummaryError> {
        Ok(self
            .texts
            .lock()
            .unwrap()
            .get(&document.id)
            .cloned()
            .unwrap_or_else(|| "Extracted document text.".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Executors

/// Records submissions without running them, so tests can step through the
/// cascade one stage at a time with their own clock.
#[derive(Default)]
pub struct RecordingExecutor {
    submitted: Mutex<Vec<StageJob>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<StageJob> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StageExecutor for RecordingExecutor {
    async fn submit(&self, job: StageJob) -> Result<(), SummaryError> {
        self.submitted.lock().unwrap().push(job);
        Ok(())
    }
}

/// Inline execution with a test-controlled clock instead of `Utc::now()`.
pub struct FixedClockExecutor {
    runner: Mutex<Option<Arc<StageRunner>>>,
    now: Mutex<DateTime<Utc>>,
    submitted: Mutex<Vec<StageJob>>,
}

impl FixedClockExecutor {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            runner: Mutex::new(None),
            now: Mutex::new(now),
            submitted: Mutex::new(Vec::new()),
        })
    }

    pub fn attach_runner(&self, runner: Arc<StageRunner>) {
        *self.runner.lock().unwrap() = Some(runner);
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn submitted(&self) -> Vec<StageJob> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StageExecutor for FixedClockExecutor {
    async fn submit(&self, job: StageJob) -> Result<(), SummaryError> {
        self.submitted.lock().unwrap().push(job.clone());

        let runner = self
            .runner
            .lock()
            .unwrap()
            .clone()
            .expect("runner not attached");
        let now = *self.now.lock().unwrap();

        runner.run(&job, now, self).await
    }
}
