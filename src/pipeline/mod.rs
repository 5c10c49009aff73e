//! Lookup processing: stage orchestration and the incremental import run.
//!
//! [`Pipeline`] turns a batch of lookups into cards. [`Importer`] drives a
//! whole run: read from the source, enrich, prune, deliver, and advance the
//! watermark only past records that are settled.

pub mod import;
pub mod limits;
pub mod service;

pub use import::{FailureReport, Importer, RunReport};
pub use limits::ProviderLimits;
pub use service::{BatchOutcome, Pipeline, PipelineSettings, RecordFailure, Stages};
