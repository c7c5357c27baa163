//! Job orchestration for the Jumpcut backend.
//!
//! This crate owns the per-job state machine and everything that runs
//! around it:
//! - the [`JobRegistry`] with per-job locks, cancellation and progress
//!   broadcast channels
//! - the chunked [`UploadStore`] collaborator
//! - the ingestion/analysis and render pipeline stages
//!
//! Jobs live for the lifetime of the process; working files are reclaimed
//! when a job reaches a terminal state, while rendered artifacts persist
//! until externally purged.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod upload;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use registry::{JobRegistry, SourceInput};
pub use upload::{UploadSession, UploadStore};
