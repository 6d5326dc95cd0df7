//! Domain types for the seoflow orchestrator.
//!
//! This module contains the core data structures:
//! - Brief: Shared run state and its read-only view
//! - Failure: Step failures and recorded error detail
//! - Progress: Observer notifications
//! - Snapshot: Per-step audit records
//! - Events: Journal entries

pub mod brief;
pub mod events;
pub mod failure;
pub mod progress;
pub mod snapshot;

// Re-export commonly used types
pub use brief::{value_text, Brief, BriefError, BriefStatus, BriefView};
pub use events::RunEvent;
pub use failure::{FailureKind, StepErrorRecord, StepFailure};
pub use progress::{fraction, ProgressKind, ProgressUpdate};
pub use snapshot::Snapshot;
