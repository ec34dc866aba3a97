//! Polling scheduler
//!
//! Drives the fixed-interval fetch → resolve → build → upload cycle and
//! owns watermark advancement. Sources within a tick are processed strictly
//! sequentially in ascending save-time order; the watermark advances past a
//! source only once its folders are fully created or permanently failed.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use skymirror_common::Result;

use crate::clients::{CatalogClient, StorageClient};
use crate::folder_path::FolderPathBuilder;
use crate::notify::{NotificationRouter, Severity};
use crate::resolver::TelescopeResolver;
use crate::source::Source;
use crate::state::{DedupKey, StateStore};
use crate::upload::{UploadError, UploadOrchestrator};

/// Pause between dynamic-mode sources so one busy tick does not hammer
/// the catalog's photometry/spectra endpoints
const DYNAMIC_MODE_PAUSE: Duration = Duration::from_millis(300);

/// Scheduler timing and retention knobs
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub poll_interval: Duration,
    /// Initial watermark for a fresh state database
    pub start_time: DateTime<Utc>,
    /// Dedup entries older than `watermark - retention` are pruned
    pub retention: chrono::Duration,
}

enum ProcessOutcome {
    Processed,
    TransientFailure(String),
    PermanentFailure(String),
}

/// The monitoring loop: one cooperative task, one writer of the state store
pub struct Scheduler<C, S> {
    catalog: Arc<C>,
    resolver: TelescopeResolver<C>,
    paths: FolderPathBuilder,
    uploader: UploadOrchestrator<S>,
    state: StateStore,
    notifier: NotificationRouter,
    options: SchedulerOptions,
    watermark: DateTime<Utc>,
    mirrored: HashSet<DedupKey>,
}

impl<C: CatalogClient, S: StorageClient> Scheduler<C, S> {
    /// Wire up the loop and reconstruct watermark/dedup state.
    ///
    /// A persisted watermark from an earlier run wins over the configured
    /// start time, so a restart resumes where it left off.
    pub async fn new(
        catalog: Arc<C>,
        resolver: TelescopeResolver<C>,
        paths: FolderPathBuilder,
        uploader: UploadOrchestrator<S>,
        state: StateStore,
        notifier: NotificationRouter,
        options: SchedulerOptions,
    ) -> Result<Self> {
        state.init_watermark(options.start_time).await?;
        let persisted = state.load().await?;
        let watermark = persisted.watermark.unwrap_or(options.start_time);

        info!(
            watermark = %watermark,
            mirrored = persisted.mirrored.len(),
            "scheduler state restored"
        );

        Ok(Self {
            catalog,
            resolver,
            paths,
            uploader,
            state,
            notifier,
            options,
            watermark,
            mirrored: persisted.mirrored,
        })
    }

    /// Current watermark (test observability)
    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    /// Run until the token is cancelled. Cancellation is observed between
    /// ticks; an in-flight tick completes and persists its state first.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        if let Err(e) = self.ensure_base_path().await {
            // The hierarchy walk in each tick can still create it later
            self.notifier
                .notify(
                    Severity::Error,
                    &format!("base folder creation failed: {}", e),
                )
                .await;
        }

        info!(
            poll_interval_secs = self.options.poll_interval.as_secs(),
            "listening for new sources"
        );

        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown requested, stopping watcher");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.tick().await {
                self.notifier
                    .notify(Severity::Error, &format!("poll cycle failed: {}", e))
                    .await;
            }
        }

        Ok(())
    }

    async fn ensure_base_path(&mut self) -> std::result::Result<(), UploadError> {
        let base = self.paths.base().clone();
        info!(path = %base, "checking base save path");
        self.uploader.ensure_path(&base).await
    }

    /// One fetch-process cycle.
    ///
    /// A fetch failure aborts only this tick; the watermark is untouched
    /// and the next tick retries the same window.
    pub async fn tick(&mut self) -> Result<()> {
        let mut sources = self.catalog.fetch_sources(self.watermark).await?;
        if sources.is_empty() {
            debug!(watermark = %self.watermark, "no new sources");
            return Ok(());
        }

        sources.sort_by_key(|s| s.saved_at);
        info!(count = sources.len(), "new sources detected");

        // Once a source fails transiently the watermark must not pass it,
        // or a restart would lose it. Later sources are still processed;
        // their dedup records make the next tick's re-delivery cheap.
        let mut watermark_blocked = false;

        for source in &sources {
            let outcome = self.process_source(source).await;

            match outcome {
                ProcessOutcome::Processed => {
                    if !watermark_blocked {
                        self.advance_watermark(source.saved_at).await?;
                    }
                }
                ProcessOutcome::PermanentFailure(message) => {
                    self.notifier
                        .notify(
                            Severity::Error,
                            &format!(
                                "source {} permanently failed, will not retry: {}",
                                source.id, message
                            ),
                        )
                        .await;
                    if !watermark_blocked {
                        self.advance_watermark(source.saved_at).await?;
                    }
                }
                ProcessOutcome::TransientFailure(message) => {
                    self.notifier
                        .notify(
                            Severity::Warning,
                            &format!(
                                "source {} deferred, will retry next cycle: {}",
                                source.id, message
                            ),
                        )
                        .await;
                    watermark_blocked = true;
                }
            }

            if self.resolver.is_dynamic() {
                tokio::time::sleep(DYNAMIC_MODE_PAUSE).await;
            }
        }

        let cutoff = self.watermark - self.options.retention;
        let pruned = self.state.prune(cutoff).await?;
        if pruned > 0 {
            debug!(pruned, cutoff = %cutoff, "pruned dedup entries");
        }

        Ok(())
    }

    async fn advance_watermark(&mut self, to: DateTime<Utc>) -> Result<()> {
        if to <= self.watermark {
            return Ok(());
        }
        self.state.advance_watermark(to).await?;
        self.watermark = to;
        debug!(watermark = %to, "watermark advanced");
        Ok(())
    }

    async fn process_source(&mut self, source: &Source) -> ProcessOutcome {
        info!(source_id = %source.id, saved_at = %source.saved_at, "processing source");

        let pairs = match self.resolver.resolve(source).await {
            Ok(pairs) => pairs,
            Err(e) => {
                return ProcessOutcome::TransientFailure(format!("instrument lookup: {}", e))
            }
        };

        if pairs.is_empty() {
            self.notifier
                .notify(
                    Severity::Warning,
                    &format!(
                        "source {} has no matching instruments, creating source folder only",
                        source.id
                    ),
                )
                .await;
        }

        let source_folder = self.paths.source_folder(&source.id);
        if let Err(e) = self.uploader.ensure_path(&source_folder).await {
            return match e {
                UploadError::Transient { .. } => ProcessOutcome::TransientFailure(e.to_string()),
                UploadError::Permanent { .. } => ProcessOutcome::PermanentFailure(e.to_string()),
            };
        }

        // Permanent failure of one pair does not stop the others (they may
        // be independently fine); transient failure defers the whole source.
        let mut permanent_failures: Vec<String> = Vec::new();

        for pair in &pairs {
            let key: DedupKey = (
                source.id.clone(),
                pair.telescope.clone(),
                pair.instrument_key().to_string(),
            );
            if self.mirrored.contains(&key) {
                debug!(source_id = %source.id, segment = %pair.segment(), "already mirrored, skipping");
                continue;
            }

            let folder = self.paths.instrument_folder(&source.id, pair);
            match self.uploader.ensure_path(&folder).await {
                Ok(()) => {
                    if let Err(e) = self
                        .state
                        .record_mirrored(&source.id, pair, source.saved_at)
                        .await
                    {
                        return ProcessOutcome::TransientFailure(format!(
                            "state persist for {}: {}",
                            folder, e
                        ));
                    }
                    self.mirrored.insert(key);
                }
                Err(e @ UploadError::Transient { .. }) => {
                    return ProcessOutcome::TransientFailure(e.to_string());
                }
                Err(e @ UploadError::Permanent { .. }) => {
                    permanent_failures.push(e.to_string());
                }
            }
        }

        if permanent_failures.is_empty() {
            ProcessOutcome::Processed
        } else {
            ProcessOutcome::PermanentFailure(permanent_failures.join("; "))
        }
    }
}
