use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::error::SummaryError;
use crate::models::{
    AppointmentContext, AppointmentDocument, HealthcareProvider, Patient, PatientAppointment,
    PatientSummaries, PatientTask,
};

/// Persistence surface for the summary pipeline. Each stage reads its entity
/// fresh and writes back only the AI-owned fields; no storage engine is
/// assumed beyond these operations.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_document(&self, id: Uuid) -> Result<AppointmentDocument, SummaryError>;
    /// Documents due for a summary: null-summary rows unless `only_missing`
    /// is false, optionally scoped to one patient.
    async fn list_documents(
        &self,
        only_missing: bool,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<AppointmentDocument>, SummaryError>;
    async fn set_document_summary(&self, id: Uuid, summary: &str) -> Result<(), SummaryError>;

    async fn get_appointment(&self, id: Uuid) -> Result<PatientAppointment, SummaryError>;
    /// The appointment plus its provider, documents, and tasks.
    async fn load_appointment_context(&self, id: Uuid)
        -> Result<AppointmentContext, SummaryError>;
    async fn list_appointments(
        &self,
        only_missing: bool,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<PatientAppointment>, SummaryError>;
    async fn set_appointment_executive_summary(
        &self,
        id: Uuid,
        summary: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SummaryError>;

    async fn get_patient(&self, id: Uuid) -> Result<Patient, SummaryError>;
    async fn list_patients(
        &self,
        only_missing: bool,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<Patient>, SummaryError>;
    /// Appointments dated strictly before `before`, newest first.
    async fn past_appointments(
        &self,
        patient_id: Uuid,
        before: NaiveDate,
    ) -> Result<Vec<PatientAppointment>, SummaryError>;
    async fn latest_past_appointment(
        &self,
        patient_id: Uuid,
        before: NaiveDate,
    ) -> Result<Option<PatientAppointment>, SummaryError>;
    /// Both AI fields plus the watermark, written in one update.
    async fn set_patient_summaries(
        &self,
        id: Uuid,
        summaries: &PatientSummaries,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SummaryError>;
}

pub struct SupabaseRecordStore {
    client: Arc<SupabaseClient>,
}

impl SupabaseRecordStore {
    pub fn new(client: Arc<SupabaseClient>) -> Self {
        Self { client }
    }

    async fn select<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Vec<T>, SummaryError> {
        self.client
            .select(table, query)
            .await
            .map_err(|e| SummaryError::Database(e.to_string()))
    }

    async fn update_one(
        &self,
        table: &str,
        entity: &'static str,
        id: Uuid,
        body: Value,
    ) -> Result<(), SummaryError> {
        let rows: Vec<Value> = self
            .client
            .update(table, &format!("id=eq.{}", id), body)
            .await
            .map_err(|e| SummaryError::Database(e.to_string()))?;

        if rows.is_empty() {
            return Err(SummaryError::NotFound { entity, id });
        }

        debug!("Updated {} {}", entity, id);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SupabaseRecordStore {
    async fn get_document(&self, id: Uuid) -> Result<AppointmentDocument, SummaryError> {
        let rows: Vec<AppointmentDocument> = self
            .select("patient_appointment_documents", &format!("id=eq.{}", id))
            .await?;

        rows.into_iter().next().ok_or(SummaryError::NotFound {
            entity: "document",
            id,
        })
    }

    async fn list_documents(
        &self,
        only_missing: bool,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<AppointmentDocument>, SummaryError> {
        let mut parts: Vec<String> = Vec::new();

        if only_missing {
            parts.push("summary=is.null".to_string());
        }

        // Patient scope reaches through the owning appointment.
        if let Some(patient_id) = patient_id {
            parts.push("select=*,patient_appointments!inner(patient_id)".to_string());
            parts.push(format!("patient_appointments.patient_id=eq.{}", patient_id));
        }

        self.select("patient_appointment_documents", &parts.join("&"))
            .await
    }

    async fn set_document_summary(&self, id: Uuid, summary: &str) -> Result<(), SummaryError> {
        self.update_one(
            "patient_appointment_documents",
            "document",
            id,
            json!({ "summary": summary }),
        )
        .await
    }

    async fn get_appointment(&self, id: Uuid) -> Result<PatientAppointment, SummaryError> {
        let rows: Vec<PatientAppointment> = self
            .select("patient_appointments", &format!("id=eq.{}", id))
            .await?;

        rows.into_iter().next().ok_or(SummaryError::NotFound {
            entity: "appointment",
            id,
        })
    }

    async fn load_appointment_context(
        &self,
        id: Uuid,
    ) -> Result<AppointmentContext, SummaryError> {
        let appointment = self.get_appointment(id).await?;

        let provider = match appointment.provider_id {
            Some(provider_id) => {
                let rows: Vec<HealthcareProvider> = self
                    .select("healthcare_providers", &format!("id=eq.{}", provider_id))
                    .await?;
                rows.into_iter().next()
            }
            None => None,
        };

        let documents: Vec<AppointmentDocument> = self
            .select(
                "patient_appointment_documents",
                &format!("patient_appointment_id=eq.{}&order=created_at.asc", id),
            )
            .await?;

        let tasks: Vec<PatientTask> = self
            .select(
                "patient_tasks",
                &format!("patient_appointment_id=eq.{}", id),
            )
            .await?;

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
        let mut parts: Vec<String> = Vec::new();

        if only_missing {
            parts.push("executive_summary=is.null".to_string());
        }

        if let Some(patient_id) = patient_id {
            parts.push(format!("patient_id=eq.{}", patient_id));
        }

        self.select("patient_appointments", &parts.join("&")).await
    }

    async fn set_appointment_executive_summary(
        &self,
        id: Uuid,
        summary: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SummaryError> {
        self.update_one(
            "patient_appointments",
            "appointment",
            id,
            json!({
                "executive_summary": summary,
                "updated_at": updated_at.to_rfc3339(),
            }),
        )
        .await
    }

    async fn get_patient(&self, id: Uuid) -> Result<Patient, SummaryError> {
        let rows: Vec<Patient> = self.select("patients", &format!("id=eq.{}", id)).await?;

        rows.into_iter().next().ok_or(SummaryError::NotFound {
            entity: "patient",
            id,
        })
    }

    async fn list_patients(
        &self,
        only_missing: bool,
        patient_id: Option<Uuid>,
    ) -> Result<Vec<Patient>, SummaryError> {
        let mut parts: Vec<String> = Vec::new();

        if only_missing {
            parts.push("or=(executive_summary.is.null,plain_english_record.is.null)".to_string());
        }

        if let Some(patient_id) = patient_id {
            parts.push(format!("id=eq.{}", patient_id));
        }

        self.select("patients", &parts.join("&")).await
    }

    async fn past_appointments(
        &self,
        patient_id: Uuid,
        before: NaiveDate,
    ) -> Result<Vec<PatientAppointment>, SummaryError> {
        self.select(
            "patient_appointments",
            &format!(
                "patient_id=eq.{}&date=lt.{}&order=date.desc",
                patient_id, before
            ),
        )
        .await
    }

    async fn latest_past_appointment(
        &self,
        patient_id: Uuid,
        before: NaiveDate,
    ) -> Result<Option<PatientAppointment>, SummaryError> {
        let rows: Vec<PatientAppointment> = self
            .select(
                "patient_appointments",
                &format!(
                    "patient_id=eq.{}&date=lt.{}&order=date.desc&limit=1",
                    patient_id, before
                ),
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn set_patient_summaries(
        &self,
        id: Uuid,
        summaries: &PatientSummaries,
        updated_at: DateTime<Utc>,
    ) -> Result<(), SummaryError> {
        self.update_one(
            "patients",
            "patient",
            id,
            json!({
                "executive_summary": summaries.executive_summary,
                "plain_english_record": summaries.plain_english_record,
                "executive_summary_updated_at": updated_at.to_rfc3339(),
            }),
        )
        .await
    }
}
