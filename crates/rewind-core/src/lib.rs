//! # rewind-core
//!
//! Shared vocabulary for the rewind crates:
//!
//! - **Wire messages**: [`WireMessage`], [`RequestId`] and the single
//!   [`classify`] function every other crate uses to tell requests,
//!   notifications and responses apart
//! - **Direction inference** for persisted messages that lost their origin
//! - **Merge rules**: field-wise record merging and text-chunk coalescing
//! - **Logging**: `tracing` subscriber bootstrap and test capture helpers

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod merge;
pub mod wire;

pub use errors::WireError;
pub use merge::{ChunkKind, Chunked, merge_fields, push_chunk};
pub use wire::{
    Direction, MessageKind, RequestId, ResponseOutcome, WireMessage, classify, infer_direction,
};
