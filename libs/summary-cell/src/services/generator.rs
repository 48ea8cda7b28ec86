use std::sync::Arc;

use tracing::debug;

use crate::error::SummaryError;
use crate::models::{
    AppointmentContext, AppointmentDocument, PatientAppointment, PatientSummaries,
};
use crate::services::extract::{
    DocumentTextExtractor, IMAGE_PLACEHOLDER, MISSING_FILE_PLACEHOLDER, UNSUPPORTED_PLACEHOLDER,
};
use crate::services::openai::TextGenerator;

pub const NO_ENCOUNTERS_RECORD: &str = "No healthcare encounters recorded yet.";
pub const NO_RECENT_ENCOUNTERS: &str = "No recent healthcare encounters to summarize.";

/// Executive summaries look at the most recent encounters only; the plain
/// English record covers the whole history.
const RECENT_ENCOUNTER_LIMIT: usize = 5;

const MAX_DOCUMENT_TEXT_LEN: usize = 10_000;

const DOCUMENT_SYSTEM_PROMPT: &str = "You are a medical document summarization assistant. Create a detailed, comprehensive executive summary of the provided medical document. Include key findings, diagnoses, treatments, medications, procedures, test results, and any follow-up recommendations. Use clear, accessible language that a patient can understand. Be thorough and capture all important medical information.";

const APPOINTMENT_SYSTEM_PROMPT: &str = "You are a healthcare appointment summarization assistant. Create a comprehensive executive summary that synthesizes all information about this healthcare appointment. Include the purpose of the visit, key findings or discussions, any diagnoses, treatments or medications mentioned, test results if applicable, and follow-up actions. If multiple documents are attached, synthesize their content into a cohesive narrative. Use clear, accessible language for the patient. Be thorough and capture the complete picture of the healthcare encounter.";

const PLAIN_RECORD_SYSTEM_PROMPT: &str = "You are a medical records assistant. Convert the following healthcare encounter records into a cohesive, chronological Plain English Patient Record. Write in third person, focusing on medical history, diagnoses, treatments, and ongoing care. Make it clear and accessible to the patient. Include specific dates and provider names where available.";

const EXECUTIVE_SYSTEM_PROMPT: &str = "You are a medical records assistant. Create a concise Executive Summary (2-3 paragraphs) of the patient's current health status based on their most recent healthcare encounters. Focus on active conditions, ongoing treatments, and any important follow-up actions. Write in clear, accessible language for the patient.";

/// Turns loaded records into prose via the injected text-generation API.
/// Callers persist the results; this service performs no writes and no
/// retries, so any API failure reaches the caller as `SummaryError::Api`.
pub struct SummaryGenerator {
    api: Arc<dyn TextGenerator>,
    extractor: Arc<dyn DocumentTextExtractor>,
}

impl SummaryGenerator {
    pub fn new(api: Arc<dyn TextGenerator>, extractor: Arc<dyn DocumentTextExtractor>) -> Self {
        Self { api, extractor }
    }

    pub async fn document_summary(
        &self,
        document: &AppointmentDocument,
    ) -> Result<String, SummaryError> {
        let text = self.extractor.extract(document).await?;

        // Placeholder content stands in for the summary directly; there is
        // nothing for the model to work with.
        if text.is_empty()
            || text == MISSING_FILE_PLACEHOLDER
            || text == IMAGE_PLACEHOLDER
            || text == UNSUPPORTED_PLACEHOLDER
        {
            return Ok(text);
        }

        let text = truncate_text(&text, MAX_DOCUMENT_TEXT_LEN);
        let user_prompt = format!(
            "Please provide a detailed executive summary of this medical document:\n\n{}",
            text
        );

        self.api
            .generate(DOCUMENT_SYSTEM_PROMPT, &user_prompt, 1000, 0.5)
            .await
    }

    pub async fn appointment_summary(
        &self,
        context: &AppointmentContext,
    ) -> Result<String, SummaryError> {
        let context_string = build_appointment_context(context);
        let user_prompt = format!(
            "Please provide a comprehensive executive summary of this healthcare appointment:\n\n{}",
            context_string
        );

        self.api
            .generate(APPOINTMENT_SYSTEM_PROMPT, &user_prompt, 1500, 0.5)
            .await
    }

    /// `past_appointments` must contain every past appointment for the
    /// patient, ordered newest first. The plain English record covers all of
    /// them; the executive summary only the most recent few. With no past
    /// encounters both fields fall back to fixed text without an API call.
    pub async fn patient_summaries(
        &self,
        past_appointments: &[PatientAppointment],
    ) -> Result<PatientSummaries, SummaryError> {
        if past_appointments.is_empty() {
            debug!("No past encounters, using fallback summaries");
            return Ok(PatientSummaries {
                executive_summary: NO_RECENT_ENCOUNTERS.to_string(),
                plain_english_record: NO_ENCOUNTERS_RECORD.to_string(),
            });
        }

        let full_history = past_appointments
            .iter()
            .map(format_encounter)
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        let plain_english_record = self
            .api
            .generate(PLAIN_RECORD_SYSTEM_PROMPT, &full_history, 2000, 0.7)
            .await?;

        let recent = past_appointments
            .iter()
            .take(RECENT_ENCOUNTER_LIMIT)
            .map(format_recent_encounter)
            .collect::<Vec<_>>()
            .join("\n\n");

        let executive_summary = self
            .api
            .generate(EXECUTIVE_SYSTEM_PROMPT, &recent, 500, 0.7)
            .await?;

        Ok(PatientSummaries {
            executive_summary,
            plain_english_record,
        })
    }
}

fn format_encounter(appointment: &PatientAppointment) -> String {
    format!(
        "Date: {}\nProvider: {}\nSummary: {}\nPatient Notes: {}",
        appointment.date.format("%b %d, %Y"),
        appointment.partner.as_deref().unwrap_or("Unknown"),
        appointment.summary.as_deref().unwrap_or("No summary"),
        appointment.patient_notes.as_deref().unwrap_or("No notes"),
    )
}

fn format_recent_encounter(appointment: &PatientAppointment) -> String {
    format!(
        "Date: {}\nProvider: {}\nSummary: {}",
        appointment.date.format("%b %d, %Y"),
        appointment.partner.as_deref().unwrap_or("Unknown"),
        appointment.summary.as_deref().unwrap_or("No summary"),
    )
}

fn build_appointment_context(context: &AppointmentContext) -> String {
    let appointment = &context.appointment;
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("Date: {}", appointment.date.format("%b %d, %Y")));

    if let Some(time) = appointment.time {
        lines.push(format!("Time: {}", time.format("%-I:%M %p")));
    }

    if let Some(provider) = &context.provider {
        lines.push(format!("Provider: {}", provider.name));
        if let Some(specialty) = &provider.specialty {
            lines.push(format!("Specialty: {}", specialty));
        }
    }

    if let Some(location) = &appointment.location {
        lines.push(format!("Location: {}", location));
    }

    if let Some(summary) = &appointment.summary {
        lines.push(format!("\nAppointment Summary:\n{}", summary));
    }

    if let Some(notes) = &appointment.patient_notes {
        lines.push(format!("\nPatient Notes:\n{}", notes));
    }

    if !context.documents.is_empty() {
        lines.push("\n--- Attached Documents ---".to_string());
        for (index, document) in context.documents.iter().enumerate() {
            lines.push(format!("\nDocument {}:", index + 1));
            match &document.summary {
                Some(summary) => lines.push(summary.clone()),
                None => lines.push("Summary not yet available.".to_string()),
            }
        }
    }

    if !context.tasks.is_empty() {
        lines.push("\n--- Related Tasks ---".to_string());
        for task in &context.tasks {
            let status = if task.completed_at.is_some() {
                "Completed"
            } else {
                "Pending"
            };
            lines.push(format!("- [{}] {}", status, task.description));
        }
    }

    lines.join("\n")
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }

    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{} [... truncated]", &text[..cut])
}
