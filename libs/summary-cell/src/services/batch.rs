//! Administrative full-table sweep: documents, then appointments, then
//! patients. Candidate selection uses the null-check staleness predicates
//! (unless forced); a failing record is recorded and skipped, never aborting
//! the sweep. Selection failures are fatal — there is no candidate set to
//! isolate errors over.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::error::SummaryError;
use crate::models::{
    BatchOptions, BatchReport, RecordError, StageJob, SummaryStage,
};
use crate::services::cascade::{StageExecutor, StageRunner};
use crate::services::generator::SummaryGenerator;
use crate::services::records::RecordStore;

pub struct BatchOrchestrator {
    store: Arc<dyn RecordStore>,
    generator: Arc<SummaryGenerator>,
    runner: Arc<StageRunner>,
    executor: Arc<dyn StageExecutor>,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        generator: Arc<SummaryGenerator>,
        runner: Arc<StageRunner>,
        executor: Arc<dyn StageExecutor>,
    ) -> Self {
        Self {
            store,
            generator,
            runner,
            executor,
        }
    }

    pub async fn run(&self, options: &BatchOptions) -> Result<BatchReport, SummaryError> {
        self.run_at(options, Utc::now()).await
    }

    pub async fn run_at(
        &self,
        options: &BatchOptions,
        now: DateTime<Utc>,
    ) -> Result<BatchReport, SummaryError> {
        let mut report = BatchReport::default();

        self.process_documents(options, &mut report).await?;
        self.process_appointments(options, now, &mut report).await?;
        self.process_patients(options, now, &mut report).await?;

        Ok(report)
    }

    async fn process_documents(
        &self,
        options: &BatchOptions,
        report: &mut BatchReport,
    ) -> Result<(), SummaryError> {
        let documents = self
            .store
            .list_documents(!options.force, options.patient_id)
            .await?;

        report.documents.found = documents.len();

        if documents.is_empty() {
            info!("No documents to process");
            return Ok(());
        }

        info!("Found {} document(s) to process", documents.len());

        for document in documents {
            let result = if options.queue {
                self.executor
                    .submit(StageJob::new(SummaryStage::Document, document.id))
                    .await
            } else {
                match self.generator.document_summary(&document).await {
                    Ok(summary) => self.store.set_document_summary(document.id, &summary).await,
                    Err(e) => Err(e),
                }
            };

            match result {
                Ok(()) => report.documents.processed += 1,
                Err(e) => {
                    error!(
                        document_id = %document.id,
                        error = %e,
                        "Failed to generate summary for document"
                    );
                    report.errors.push(RecordError {
                        model: "Document",
                        id: document.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    async fn process_appointments(
        &self,
        options: &BatchOptions,
        now: DateTime<Utc>,
        report: &mut BatchReport,
    ) -> Result<(), SummaryError> {
        let appointments = self
            .store
            .list_appointments(!options.force, options.patient_id)
            .await?;

        report.appointments.found = appointments.len();

        if appointments.is_empty() {
            info!("No appointments to process");
            return Ok(());
        }

        info!("Found {} appointment(s) to process", appointments.len());

        for appointment in appointments {
            let result = if options.queue {
                self.executor
                    .submit(StageJob::new(SummaryStage::Appointment, appointment.id))
                    .await
            } else {
                // Inline batch processing fills this section's summaries
                // only; it does not cascade into the patient stage. Queued
                // jobs do cascade when the worker executes them.
                match self.store.load_appointment_context(appointment.id).await {
                    Ok(context) => match self.generator.appointment_summary(&context).await {
                        Ok(summary) => {
                            self.store
                                .set_appointment_executive_summary(appointment.id, &summary, now)
                                .await
                        }
                        Err(e) => Err(e),
                    },
                    Err(e) => Err(e),
                }
            };

            match result {
                Ok(()) => report.appointments.processed += 1,
                Err(e) => {
                    error!(
                        appointment_id = %appointment.id,
                        error = %e,
                        "Failed to generate summary for appointment"
                    );
                    report.errors.push(RecordError {
                        model: "Appointment",
                        id: appointment.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    async fn process_patients(
        &self,
        options: &BatchOptions,
        now: DateTime<Utc>,
        report: &mut BatchReport,
    ) -> Result<(), SummaryError> {
        let patients = self
            .store
            .list_patients(!options.force, options.patient_id)
            .await?;

        report.patients.found = patients.len();

        if patients.is_empty() {
            info!("No patients to process");
            return Ok(());
        }

        info!("Found {} patient(s) to process", patients.len());

        for patient in patients {
            let result = if options.queue {
                self.executor
                    .submit(StageJob::new(SummaryStage::Patient, patient.id))
                    .await
                    .map(|_| true)
            } else {
                self.runner.refresh_patient_summaries(&patient, now).await
            };

            match result {
                Ok(_) => report.patients.processed += 1,
                Err(e) => {
                    error!(
                        patient_id = %patient.id,
                        error = %e,
                        "Failed to generate summaries for patient"
                    );
                    report.errors.push(RecordError {
                        model: "Patient",
                        id: patient.id,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
