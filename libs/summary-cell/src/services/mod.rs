pub mod batch;
pub mod cascade;
pub mod extract;
pub mod generator;
pub mod openai;
pub mod queue;
pub mod records;
pub mod staleness;
pub mod worker;

pub use batch::BatchOrchestrator;
pub use cascade::{CascadeDispatcher, InlineExecutor, QueuedExecutor, StageExecutor, StageRunner};
pub use extract::{DocumentTextExtractor, FileTextExtractor};
pub use generator::SummaryGenerator;
pub use openai::{OpenAiChatClient, TextGenerator};
pub use queue::RedisSummaryQueue;
pub use records::{RecordStore, SupabaseRecordStore};
pub use worker::SummaryWorkerService;
