//! PDF translation jobs: per-file state, the queue, argument construction and
//! the sequential batch runner.

pub mod list;
pub mod options;
pub mod runner;
pub mod state;

pub use list::{JobError, JobList};
pub use options::{default_extra, kebab_case, RunOptions};
pub use runner::{BatchError, BatchEvent, BatchEventSink, BatchRunner, RunSummary, RUN_FINISHED_MESSAGE};
pub use state::{JobStatus, TranslationJob};
