use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use summary_cell::{
    BatchOptions, BatchOrchestrator, FileTextExtractor, InlineExecutor, OpenAiChatClient,
    QueuedExecutor, RecordStore, RedisSummaryQueue, StageExecutor, StageRunner, SummaryGenerator,
    SummaryWorkerService, SupabaseRecordStore, WorkerConfig,
};

#[derive(Parser)]
#[command(name = "portal-admin")]
#[command(about = "Maintenance commands for the patient portal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate AI summaries for appointment documents, appointments, and patient records
    GenerateSummaries {
        /// Queue the summary generation jobs instead of running synchronously
        #[arg(short = 'q', long)]
        queue: bool,
        /// Regenerate summaries even if they already exist
        #[arg(long)]
        force: bool,
        /// Only process records for a specific patient ID
        #[arg(long)]
        patient_id: Option<Uuid>,
    },
    /// Run the summary queue worker until interrupted
    Worker {
        /// Number of concurrent jobs per worker
        #[arg(long, default_value_t = 2)]
        concurrency: u32,
    },
}

struct Pipeline {
    store: Arc<dyn RecordStore>,
    generator: Arc<SummaryGenerator>,
    runner: Arc<StageRunner>,
}

fn build_pipeline(config: &AppConfig) -> anyhow::Result<Pipeline> {
    let store: Arc<dyn RecordStore> = Arc::new(SupabaseRecordStore::new(Arc::new(
        SupabaseClient::new(config),
    )));
    let api = Arc::new(OpenAiChatClient::new(config)?);
    let extractor = Arc::new(FileTextExtractor::new(&config.document_storage_path));
    let generator = Arc::new(SummaryGenerator::new(api, extractor));
    let runner = Arc::new(StageRunner::new(Arc::clone(&store), Arc::clone(&generator)));

    Ok(Pipeline {
        store,
        generator,
        runner,
    })
}

async fn generate_summaries(
    config: &AppConfig,
    queue: bool,
    force: bool,
    patient_id: Option<Uuid>,
) -> anyhow::Result<ExitCode> {
    let pipeline = build_pipeline(config)?;

    let executor: Arc<dyn StageExecutor> = if queue {
        let queue_service = Arc::new(RedisSummaryQueue::new(config).await?);
        Arc::new(QueuedExecutor::new(queue_service))
    } else {
        Arc::new(InlineExecutor::new(Arc::clone(&pipeline.runner)))
    };

    let orchestrator = BatchOrchestrator::new(
        pipeline.store,
        pipeline.generator,
        pipeline.runner,
        executor,
    );

    println!("Starting AI summary generation...");
    println!("Mode: {}", if queue { "Queue" } else { "Synchronous" });

    if force {
        println!("Force mode enabled - regenerating all summaries");
    }

    if let Some(patient_id) = patient_id {
        println!("Filtering for patient ID: {}", patient_id);
    }

    println!();

    let options = BatchOptions {
        queue,
        force,
        patient_id,
    };
    let report = orchestrator.run(&options).await?;

    println!(
        "1. Documents: processed {} of {}",
        report.documents.processed, report.documents.found
    );
    println!(
        "2. Appointments: processed {} of {}",
        report.appointments.processed, report.appointments.found
    );
    println!(
        "3. Patients: processed {} of {}",
        report.patients.processed, report.patients.found
    );

    println!();
    println!("AI summary generation completed!");

    if !report.succeeded() {
        println!();
        println!("Errors encountered: {}", report.errors.len());
        for record_error in &report.errors {
            println!("  - {}", record_error);
        }
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_worker(config: &AppConfig, concurrency: u32) -> anyhow::Result<ExitCode> {
    let pipeline = build_pipeline(config)?;
    let queue = Arc::new(RedisSummaryQueue::new(config).await?);

    let worker_config = WorkerConfig {
        max_concurrent_jobs: concurrency,
        ..Default::default()
    };

    let worker = Arc::new(SummaryWorkerService::new(
        worker_config,
        queue,
        pipeline.runner,
    ));

    let shutdown_worker = Arc::clone(&worker);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            shutdown_worker.shutdown().await;
        }
    });

    worker.start().await?;
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let result = match cli.command {
        Commands::GenerateSummaries {
            queue,
            force,
            patient_id,
        } => generate_summaries(&config, queue, force, patient_id).await,
        Commands::Worker { concurrency } => run_worker(&config, concurrency).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
