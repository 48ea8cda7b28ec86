//! The document → appointment → patient regeneration chain.
//!
//! Mutations enter through `CascadeDispatcher`; each stage is a `StageJob`
//! handed to a `StageExecutor`, which either runs it inline on the calling
//! task or pushes it onto the Redis queue for a worker. Business logic lives
//! in `StageRunner` and is identical in both modes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::SummaryError;
use crate::models::{AppointmentField, Patient, StageJob, SummaryStage};
use crate::services::generator::SummaryGenerator;
use crate::services::queue::RedisSummaryQueue;
use crate::services::records::RecordStore;
use crate::services::staleness;

/// Execution strategy for the next pipeline stage. `submit` either performs
/// the work before returning (inline) or hands it off (queued); callers must
/// not assume the stage has run when it resolves.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn submit(&self, job: StageJob) -> Result<(), SummaryError>;
}

pub struct StageRunner {
    store: Arc<dyn RecordStore>,
    generator: Arc<SummaryGenerator>,
}

impl StageRunner {
    pub fn new(store: Arc<dyn RecordStore>, generator: Arc<SummaryGenerator>) -> Self {
        Self { store, generator }
    }

    /// Execute one stage. `now` is the execution-time clock reading: the
    /// past-appointment gate and the watermark are evaluated against it, not
    /// against the time the job was created.
    pub async fn run(
        &self,
        job: &StageJob,
        now: DateTime<Utc>,
        next: &dyn StageExecutor,
    ) -> Result<(), SummaryError> {
        match job.stage {
            SummaryStage::Document => self.run_document_stage(job, next).await,
            SummaryStage::Appointment => self.run_appointment_stage(job, now, next).await,
            SummaryStage::Patient => self.run_patient_stage(job, now).await,
        }
    }

    async fn run_document_stage(
        &self,
        job: &StageJob,
        next: &dyn StageExecutor,
    ) -> Result<(), SummaryError> {
        let result = self.document_stage_inner(job, next).await;

        if let Err(e) = &result {
            error!(
                document_id = %job.entity_id,
                error = %e,
                "Failed to summarize appointment document"
            );
        }

        result
    }

    async fn document_stage_inner(
        &self,
        job: &StageJob,
        next: &dyn StageExecutor,
    ) -> Result<(), SummaryError> {
        let document = self.store.get_document(job.entity_id).await?;

        let summary = self.generator.document_summary(&document).await?;
        self.store
            .set_document_summary(document.id, &summary)
            .await?;

        info!(document_id = %document.id, "Document summary generated");

        // The owning appointment's summary now has new material to fold in.
        next.submit(StageJob::new(
            SummaryStage::Appointment,
            document.appointment_id,
        ))
        .await
    }

    async fn run_appointment_stage(
        &self,
        job: &StageJob,
        now: DateTime<Utc>,
        next: &dyn StageExecutor,
    ) -> Result<(), SummaryError> {
        let result = self.appointment_stage_inner(job, now, next).await;

        if let Err(e) = &result {
            error!(
                appointment_id = %job.entity_id,
                error = %e,
                "Failed to update appointment executive summary"
            );
        }

        result
    }

    async fn appointment_stage_inner(
        &self,
        job: &StageJob,
        now: DateTime<Utc>,
        next: &dyn StageExecutor,
    ) -> Result<(), SummaryError> {
        let context = self.store.load_appointment_context(job.entity_id).await?;

        let summary = self.generator.appointment_summary(&context).await?;
        self.store
            .set_appointment_executive_summary(context.appointment.id, &summary, now)
            .await?;

        info!(appointment_id = %context.appointment.id, "Appointment executive summary updated");

        // Past appointments feed the patient-level record. The check runs
        // against the execution-time clock, so a future-dated appointment
        // whose date has since passed does gate through.
        if context.appointment.is_past(now) {
            next.submit(StageJob::new(
                SummaryStage::Patient,
                context.appointment.patient_id,
            ))
            .await?;
        }

        Ok(())
    }

    async fn run_patient_stage(
        &self,
        job: &StageJob,
        now: DateTime<Utc>,
    ) -> Result<(), SummaryError> {
        let result = async {
            let patient = self.store.get_patient(job.entity_id).await?;
            self.refresh_patient_summaries(&patient, now).await
        }
        .await;

        if let Err(e) = &result {
            error!(
                patient_id = %job.entity_id,
                error = %e,
                "Failed to update patient summaries"
            );
        }

        result.map(|_| ())
    }

    /// Regenerate both patient-level AI fields if the watermark says newer
    /// past-appointment data exists. Returns whether anything was written.
    pub async fn refresh_patient_summaries(
        &self,
        patient: &Patient,
        now: DateTime<Utc>,
    ) -> Result<bool, SummaryError> {
        let today = now.date_naive();

        let latest = self.store.latest_past_appointment(patient.id, today).await?;

        if !staleness::patient_record_outdated(
            patient.executive_summary_updated_at,
            latest.map(|appointment| appointment.updated_at),
        ) {
            debug!(patient_id = %patient.id, "Patient summaries are current, skipping");
            return Ok(false);
        }

        let past = self.store.past_appointments(patient.id, today).await?;
        let summaries = self.generator.patient_summaries(&past).await?;

        self.store
            .set_patient_summaries(patient.id, &summaries, now)
            .await?;

        info!(patient_id = %patient.id, "Patient summaries refreshed");
        Ok(true)
    }
}

/// Runs each submitted stage immediately on the caller's task, reading the
/// clock at the moment the stage starts.
pub struct InlineExecutor {
    runner: Arc<StageRunner>,
}

impl InlineExecutor {
    pub fn new(runner: Arc<StageRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl StageExecutor for InlineExecutor {
    async fn submit(&self, job: StageJob) -> Result<(), SummaryError> {
        self.runner.run(&job, Utc::now(), self).await
    }
}

/// Hands stages to the Redis queue; a worker picks them up later. Ordering
/// holds only along one entity's causal chain, because the next stage is
/// enqueued by the worker after the previous stage completed.
pub struct QueuedExecutor {
    queue: Arc<RedisSummaryQueue>,
}

impl QueuedExecutor {
    pub fn new(queue: Arc<RedisSummaryQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl StageExecutor for QueuedExecutor {
    async fn submit(&self, job: StageJob) -> Result<(), SummaryError> {
        self.queue.enqueue(&job).await
    }
}

/// Entry points for entity mutations, called explicitly by whatever persists
/// the change. Replaces implicit model-observer wiring so the dependency
/// direction stays visible at the call site.
pub struct CascadeDispatcher {
    executor: Arc<dyn StageExecutor>,
}

impl CascadeDispatcher {
    pub fn new(executor: Arc<dyn StageExecutor>) -> Self {
        Self { executor }
    }

    pub async fn on_document_created(&self, document_id: Uuid) -> Result<(), SummaryError> {
        debug!(document_id = %document_id, "Document created, starting summary cascade");
        self.executor
            .submit(StageJob::new(SummaryStage::Document, document_id))
            .await
    }

    /// A watched-field edit counts as stale regardless of whether a summary
    /// already exists; other edits never trigger.
    pub async fn on_appointment_fields_changed(
        &self,
        appointment_id: Uuid,
        changed_fields: &[AppointmentField],
    ) -> Result<(), SummaryError> {
        if !staleness::triggers_appointment_refresh(changed_fields) {
            debug!(
                appointment_id = %appointment_id,
                "No watched fields changed, skipping summary refresh"
            );
            return Ok(());
        }

        self.executor
            .submit(StageJob::new(SummaryStage::Appointment, appointment_id))
            .await
    }
}
