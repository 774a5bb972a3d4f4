//! # rewind-resume
//!
//! Rebuilds an interrupted session from its persisted run log.
//!
//! [`ResumeOrchestrator::resume`] fetches run metadata and the log, finds the
//! latest working-tree snapshot, restores it on a best-effort basis, replays
//! the conversation, and recovers the last reported device info. The flow is
//! a flat list of steps run by [`saga::run_steps`], which undoes completed
//! side effects in reverse order if a later step fails.

#![deny(unsafe_code)]

pub mod errors;
pub mod orchestrator;
pub mod restore;
pub mod saga;
pub mod snapshot;
pub mod sources;

pub use errors::{RestoreError, ResumeError, SourceError};
pub use orchestrator::{ResumeOptions, ResumeOrchestrator, ResumeResult, extract_device};
pub use restore::{
    ArchiveFetcher, GitTreeRestorer, LocalArchiveFetcher, RestoreOutcome, TreeRestorer,
    apply_snapshot,
};
pub use saga::{Step, StepFailure, StepFlow, run_steps};
pub use snapshot::{TreeSnapshotEvent, locate_latest_snapshot};
pub use sources::{FsLogSource, LogSource, RunMetadata, RunMetadataSource, StaticRunMetadata};
