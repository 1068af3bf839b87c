//! Job orchestration for photo restoration.
//!
//! Everything here depends on collaborators through traits
//! ([`heirloom_db::JobStore`], [`heirloom_airtable::RecordStore`],
//! [`heirloom_gemini::ImageGenerator`], [`fetch::ImageFetcher`],
//! [`storage::ResultStore`]) that are constructed once by the binaries and
//! passed in.

pub mod batch;
pub mod chain;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod fetch;
pub mod intake;
pub mod local;
pub mod reporter;
pub mod restoration;
pub mod storage;
pub mod workflow;

pub use batch::{BatchCoordinator, BatchImage, BatchOutcome, BatchTicket};
pub use chain::{ChainRequest, ChainResult, ChainStep, PromptChainRunner, StepResult, StepStatus};
pub use dispatcher::JobDispatcher;
pub use error::PipelineError;
pub use fetch::{HttpImageFetcher, ImageFetcher};
pub use intake::{IntakeOutcome, RecordIntake, WebhookPayload};
pub use local::{LocalPhoto, LocalPrompt};
pub use reporter::{JobLookup, StatusReporter};
pub use restoration::{JobOutcome, RestorationPipeline};
pub use storage::{LocalResultStore, ResultStore, StorageConfig};
pub use workflow::{PromptCatalog, WorkflowRun, WorkflowRunner};
