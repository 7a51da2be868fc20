//! Core library for per-tenant monitoring thresholds
//!
//! This crate provides the core functionality for:
//! - Reading and writing the tenant threshold document
//! - Applying override / revert updates
//! - Patching the document in a remote config store
//! - Resolving thresholds and state filters for the exporter
//! - Aggregating Prometheus alert state per tenant

pub mod alerts;
pub mod codec;
pub mod engine;
pub mod error;
pub mod models;
pub mod observability;
pub mod patcher;
pub mod reload;
pub mod resolve;
pub mod store;

pub use codec::{decode, encode};
pub use engine::{apply, ActionTaken, KnownMetrics, ThresholdUpdate, UpdateValidator};
pub use error::{DecodeError, EncodeError, LoadError, PatchError, StoreError, ValidationError};
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger, ThresholdCollector};
pub use patcher::{PatchOptions, PatchOutcome, ThresholdPatcher};
pub use reload::ConfigManager;
pub use resolve::{ResolvedStateFilter, ResolvedThreshold, ThresholdConfig};
pub use store::{ConfigStore, FetchedDocument, FileStore, MemoryStore};
