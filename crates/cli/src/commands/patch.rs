//! `tenantctl patch`: set or revert one tenant override

use anyhow::{Context, Result};
use serde::Serialize;
use threshold_core::{
    ConfigStore, KnownMetrics, PatchOptions, PatchOutcome, ThresholdPatcher, ThresholdUpdate,
    UpdateValidator,
};
use tracing::warn;

use crate::output::{print_info, print_json, print_success, print_warning, OutputFormat};

/// Arguments of one patch invocation
#[derive(Debug, Clone, Default)]
pub struct PatchArgs {
    pub tenant: String,
    pub metric: String,
    pub value: String,
    pub priority: Option<String>,
    pub check_version: bool,
    pub retries: u32,
    pub dry_run: bool,
    pub known_metrics: Vec<String>,
}

impl PatchArgs {
    /// Check the arguments without touching any store
    pub fn validate(self) -> Result<ValidatedPatch> {
        let update = ThresholdUpdate::new(&self.tenant, &self.metric, &self.value, self.priority.clone())?;
        let validator = KnownMetrics::new(self.known_metrics.iter().cloned());
        validator.validate(&update)?;
        Ok(ValidatedPatch {
            args: self,
            update,
            validator,
        })
    }
}

/// Patch arguments that passed validation
#[derive(Debug)]
pub struct ValidatedPatch {
    args: PatchArgs,
    update: ThresholdUpdate,
    validator: KnownMetrics,
}

#[derive(Serialize)]
struct PatchReport<'a> {
    #[serde(flatten)]
    outcome: &'a PatchOutcome,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    document: Option<&'a str>,
}

/// Run the patch cycle, retrying against a fresh fetch on version conflicts
pub async fn patch_threshold(
    store: &dyn ConfigStore,
    patch: ValidatedPatch,
    format: OutputFormat,
) -> Result<()> {
    let ValidatedPatch {
        args,
        update,
        validator,
    } = patch;
    let patcher = ThresholdPatcher::new(store)
        .with_validator(&validator)
        .with_options(PatchOptions {
            check_version: args.check_version,
            dry_run: args.dry_run,
        });

    if format == OutputFormat::Table && !args.dry_run {
        print_info(&format!(
            "Patching {} for {}: {} = {}",
            store.describe(),
            update.tenant,
            update.metric,
            args.priority
                .as_deref()
                .filter(|p| !update.is_revert() && !p.is_empty())
                .map_or_else(|| update.value.clone(), |p| format!("{}:{}", update.value, p)),
        ));
    }

    let mut attempts = 1;
    let outcome = loop {
        match patcher.run(&update).await {
            Ok(outcome) => break outcome,
            Err(e) if e.is_conflict() && attempts <= args.retries => {
                warn!(attempt = attempts, error = %e, "Version conflict, retrying with a fresh fetch");
                attempts += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to patch {}", store.describe()));
            }
        }
    };

    match format {
        OutputFormat::Json => print_json(&PatchReport {
            outcome: &outcome,
            attempts,
            document: args.dry_run.then_some(outcome.document.as_str()),
        })?,
        OutputFormat::Table => {
            let subject = format!("{}/{}", outcome.tenant, outcome.metric);
            if !outcome.changed {
                print_info(&format!("{subject}: {}, nothing to write", outcome.action));
            } else if args.dry_run {
                print_warning("Dry-run mode - no changes written");
                println!("\n{subject}: {}", outcome.action);
                println!("\nDocument that would be written:");
                println!("---");
                print!("{}", outcome.document);
            } else {
                print_success(&format!("{subject}: {}", outcome.action));
                print_info("The exporter picks up the change on its next reload");
            }
        }
    }

    Ok(())
}
