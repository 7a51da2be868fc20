//! The fetch → decode → apply → encode → patch cycle
//!
//! One invocation mutates the document in memory exactly once. Any failure
//! before the write discards the mutation; there is no partially written
//! state. Nothing here retries: [`PatchError::is_conflict`] tells the caller
//! whether a fresh attempt could succeed.

use serde::Serialize;
use tracing::{info, warn};

use crate::codec::{decode, encode};
use crate::engine::{apply, ActionTaken, ThresholdUpdate, UpdateValidator};
use crate::error::{PatchError, StoreError};
use crate::store::ConfigStore;

/// Patch cycle options
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchOptions {
    /// Pass the fetched version token to the store so concurrent writers are detected
    pub check_version: bool,
    /// Compute and encode the new document without writing it
    pub dry_run: bool,
}

/// Result of one successful cycle
#[derive(Debug, Clone, Serialize)]
pub struct PatchOutcome {
    pub tenant: String,
    pub metric: String,
    #[serde(flatten)]
    pub action: ActionTaken,
    /// False when the document was already in the requested state
    pub changed: bool,
    /// True if the store accepted a write
    pub written: bool,
    /// The encoded document that was (or would have been) written
    #[serde(skip)]
    pub document: String,
}

/// Drives a single update against a store
pub struct ThresholdPatcher<'a> {
    store: &'a dyn ConfigStore,
    validator: Option<&'a dyn UpdateValidator>,
    options: PatchOptions,
}

impl<'a> ThresholdPatcher<'a> {
    pub fn new(store: &'a dyn ConfigStore) -> Self {
        Self {
            store,
            validator: None,
            options: PatchOptions::default(),
        }
    }

    pub fn with_validator(mut self, validator: &'a dyn UpdateValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_options(mut self, options: PatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one cycle
    pub async fn run(&self, update: &ThresholdUpdate) -> Result<PatchOutcome, PatchError> {
        if let Some(validator) = self.validator {
            validator.validate(update)?;
        }

        let fetched = self.store.fetch().await.map_err(PatchError::Fetch)?;
        let current = decode(&fetched.raw)?;

        let (next, action) = apply(current.clone(), update);
        let changed = next.tenants() != current.tenants();
        let document = encode(&next)?;

        let written = if !changed {
            info!(
                tenant = %update.tenant,
                metric = %update.metric,
                action = %action,
                "Document unchanged, skipping write"
            );
            false
        } else if self.options.dry_run {
            info!(
                tenant = %update.tenant,
                metric = %update.metric,
                action = %action,
                "Dry run, not writing"
            );
            false
        } else {
            let expected = if self.options.check_version {
                fetched.version.as_deref()
            } else {
                None
            };
            if self.options.check_version && expected.is_none() {
                warn!(store = %self.store.describe(), "Store returned no version token, writing unchecked");
            }

            self.store
                .patch_field(&document, expected)
                .await
                .map_err(|e| match e {
                    StoreError::Conflict { .. } => PatchError::Conflict(e),
                    other => PatchError::Write(other),
                })?;

            info!(
                event = "threshold_patched",
                store = %self.store.describe(),
                tenant = %update.tenant,
                metric = %update.metric,
                action = %action,
                "Patched threshold document"
            );
            true
        };

        Ok(PatchOutcome {
            tenant: update.tenant.clone(),
            metric: update.metric.clone(),
            action,
            changed,
            written,
            document,
        })
    }
}
