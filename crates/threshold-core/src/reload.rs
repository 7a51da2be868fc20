//! Hot-reloaded config snapshot for the exporter
//!
//! Scrapes read an `Arc<ThresholdConfig>` snapshot; a background task polls
//! the file's modification time and swaps in a fresh snapshot when it moves
//! forward. A failed reload keeps the previous snapshot.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use tokio::time::MissedTickBehavior;

use crate::error::LoadError;
use crate::observability::{ExporterMetrics, StructuredLogger};
use crate::resolve::ThresholdConfig;

/// Counts logged after a successful load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub defaults: usize,
    pub state_filters: usize,
    pub tenants: usize,
    pub resolved_thresholds: usize,
    pub resolved_state_filters: usize,
}

impl LoadSummary {
    fn of(config: &ThresholdConfig) -> Self {
        Self {
            defaults: config.defaults.len(),
            state_filters: config.state_filters.len(),
            tenants: config.tenants.len(),
            resolved_thresholds: config.resolve().len(),
            resolved_state_filters: config.resolve_state_filters().len(),
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    config: Option<Arc<ThresholdConfig>>,
    modified: Option<SystemTime>,
    last_reload: Option<DateTime<Utc>>,
}

/// Owner of the current config snapshot
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.snapshot.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read and parse the file, replacing the snapshot on success
    pub async fn load(&self) -> Result<LoadSummary, LoadError> {
        let read_err = |source| LoadError::Read {
            path: self.path.clone(),
            source,
        };

        let modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .map_err(read_err)?;
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(read_err)?;

        let config = ThresholdConfig::from_yaml(&raw)?;
        let summary = LoadSummary::of(&config);

        let mut snapshot = self.write();
        snapshot.config = Some(Arc::new(config));
        snapshot.modified = Some(modified);
        snapshot.last_reload = Some(Utc::now());

        Ok(summary)
    }

    /// Reload only when the file's modification time moved forward
    pub async fn reload_if_changed(&self) -> Result<Option<LoadSummary>, LoadError> {
        let modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .map_err(|source| LoadError::Read {
                path: self.path.clone(),
                source,
            })?;

        let stale = match self.read().modified {
            Some(previous) => modified > previous,
            None => true,
        };
        if !stale {
            return Ok(None);
        }

        self.load().await.map(Some)
    }

    /// The current snapshot, if any load has succeeded
    pub fn current(&self) -> Option<Arc<ThresholdConfig>> {
        self.read().config.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.read().config.is_some()
    }

    pub fn last_reload(&self) -> Option<DateTime<Utc>> {
        self.read().last_reload
    }

    /// Poll for changes forever
    pub async fn watch(
        self: Arc<Self>,
        period: Duration,
        metrics: ExporterMetrics,
        logger: StructuredLogger,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial load already ran.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self.reload_if_changed().await {
                Ok(Some(summary)) => {
                    metrics.record_reload();
                    logger.log_config_loaded(&summary);
                }
                Ok(None) => {}
                Err(e) => {
                    metrics.record_reload_failure();
                    logger.log_reload_failed(&e);
                }
            }
        }
    }
}
