//! # pimx-sync — Change Propagation and Publish
//!
//! Turns host notifications into document writes and runs full channel
//! publishes.
//!
//! ## Propagation (`propagator`, `notification`)
//!
//! [`ChangePropagator`] maps each [`Notification`] to the entities it
//! affects and writes them with the right action. Added structure is
//! walked depth-first under a traversal-scoped [`WrittenSet`], so no entity
//! is written twice in one trigger and cycles terminate.
//!
//! ## Publish (`publish`)
//!
//! [`PublishOrchestrator`] exports a whole channel grouped by entity type,
//! as single batch documents, numbered chunks or one document per entity,
//! and reports progress.
//!
//! ## Engine (`engine`)
//!
//! [`ExportEngine`] resolves settings once, owns every component and is
//! the only entry point a host needs.
//!
//! ## Crate Policy
//!
//! - Depends on `pimx-core`, `pimx-schema` and `pimx-export` internally.
//! - No failure escapes [`ExportEngine`]; it is logged and reported.
//! - No `.unwrap()` outside tests.

pub mod engine;
pub mod error;
pub mod notification;
pub mod propagator;
pub mod publish;

pub use engine::{Dispatch, ExportEngine};
pub use error::SyncError;
pub use notification::Notification;
pub use propagator::{BranchFailurePolicy, ChangePropagator, PropagationSummary, WrittenSet};
pub use publish::{
    progress_percentage, FailedUnit, PublishGroup, PublishMode, PublishOrchestrator, PublishReport,
};
