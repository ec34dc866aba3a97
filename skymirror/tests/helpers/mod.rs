//! Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use skymirror::clients::{CatalogClient, CreateOutcome, StorageClient};
use skymirror::folder_path::FolderPathBuilder;
use skymirror::notify::{AlertClient, NotificationRouter, Severity};
use skymirror::resolver::TelescopeResolver;
use skymirror::scheduler::{Scheduler, SchedulerOptions};
use skymirror::source::Source;
use skymirror::state::StateStore;
use skymirror::upload::{BackoffPolicy, UploadOrchestrator};
use skymirror_common::{Error, Result};

pub fn ts(raw: &str) -> DateTime<Utc> {
    skymirror_common::time::parse_timestamp(raw).unwrap()
}

pub fn source(id: &str, saved_at: &str) -> Source {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "saved_at": saved_at,
        "group_ids": [1840],
    }))
    .unwrap()
}

// ----------------------------------------------------------------------------
// Fake catalog
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeCatalog {
    pub sources: Mutex<Vec<Source>>,
    /// `after` argument of every fetch_sources call
    pub fetch_after: Mutex<Vec<DateTime<Utc>>>,
    /// When false, fetch_sources re-delivers everything (simulates
    /// catalog latency re-sending an already-seen source)
    pub filter_by_after: bool,
    /// Remaining forced fetch_sources failures
    pub fetch_failures: Mutex<u32>,
    /// Sources whose photometry fetch fails transiently (dynamic mode)
    pub photometry_errors: Mutex<HashSet<String>>,
    pub photometry: HashMap<String, Vec<String>>,
    pub spectra: HashMap<String, Vec<String>>,
    pub telescopes: HashMap<String, String>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            filter_by_after: true,
            ..Self::default()
        }
    }

    pub fn push_source(&self, source: Source) {
        self.sources.lock().unwrap().push(source);
    }

    pub fn fail_fetches(&self, times: u32) {
        *self.fetch_failures.lock().unwrap() = times;
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn fetch_sources(&self, after: DateTime<Utc>) -> Result<Vec<Source>> {
        self.fetch_after.lock().unwrap().push(after);
        {
            let mut failures = self.fetch_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Transient("catalog unreachable".to_string()));
            }
        }
        let sources = self.sources.lock().unwrap();
        Ok(sources
            .iter()
            .filter(|s| !self.filter_by_after || s.saved_at > after)
            .cloned()
            .collect())
    }

    async fn fetch_photometry_instruments(&self, source_id: &str) -> Result<Vec<String>> {
        if self.photometry_errors.lock().unwrap().contains(source_id) {
            return Err(Error::Transient("catalog unreachable".to_string()));
        }
        Ok(self.photometry.get(source_id).cloned().unwrap_or_default())
    }

    async fn fetch_spectroscopy_instruments(&self, source_id: &str) -> Result<Vec<String>> {
        Ok(self.spectra.get(source_id).cloned().unwrap_or_default())
    }

    async fn fetch_telescope_name(&self, instrument_name: &str) -> Result<Option<String>> {
        Ok(self.telescopes.get(instrument_name).cloned())
    }
}

// ----------------------------------------------------------------------------
// Fake storage
// ----------------------------------------------------------------------------

#[derive(Default)]
struct StorageInner {
    existing: HashSet<String>,
    exists_calls: Vec<String>,
    create_calls: Vec<String>,
    /// Remaining forced transient failures per path
    transient_failures: HashMap<String, u32>,
    /// Paths whose creation permanently fails
    permanent_failures: HashSet<String>,
    /// Paths hidden from PROPFIND even when present (exercises the
    /// MKCOL-races-PROPFIND "already exists" branch)
    hidden_from_propfind: HashSet<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    inner: Mutex<StorageInner>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_existing(&self, path: &str) {
        self.inner.lock().unwrap().existing.insert(path.to_string());
    }

    pub fn hide_from_propfind(&self, path: &str) {
        self.inner
            .lock()
            .unwrap()
            .hidden_from_propfind
            .insert(path.to_string());
    }

    pub fn fail_transient(&self, path: &str, times: u32) {
        self.inner
            .lock()
            .unwrap()
            .transient_failures
            .insert(path.to_string(), times);
    }

    pub fn fail_permanent(&self, path: &str) {
        self.inner
            .lock()
            .unwrap()
            .permanent_failures
            .insert(path.to_string());
    }

    pub fn create_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().create_calls.clone()
    }

    pub fn exists_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().exists_calls.clone()
    }

    pub fn has_folder(&self, path: &str) -> bool {
        self.inner.lock().unwrap().existing.contains(path)
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.exists_calls.push(path.to_string());
        if inner.hidden_from_propfind.contains(path) {
            return Ok(false);
        }
        Ok(inner.existing.contains(path))
    }

    async fn create_folder(&self, path: &str) -> Result<CreateOutcome> {
        let mut inner = self.inner.lock().unwrap();
        inner.create_calls.push(path.to_string());

        if inner.permanent_failures.contains(path) {
            return Ok(CreateOutcome::Permanent("forced permanent".to_string()));
        }
        if let Some(remaining) = inner.transient_failures.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(CreateOutcome::Transient("forced transient".to_string()));
            }
        }
        if inner.existing.contains(path) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        inner.existing.insert(path.to_string());
        Ok(CreateOutcome::Created)
    }
}

// ----------------------------------------------------------------------------
// Fake alert channel
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeAlert {
    pub sent: Mutex<Vec<(Severity, String)>>,
}

impl FakeAlert {
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl AlertClient for FakeAlert {
    async fn send(&self, severity: Severity, message: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Scheduler wiring
// ----------------------------------------------------------------------------

pub fn fast_backoff(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        multiplier: 2.0,
    }
}

pub struct SchedulerSetup {
    pub catalog: Arc<FakeCatalog>,
    pub storage: Arc<FakeStorage>,
    pub alert: Arc<FakeAlert>,
}

impl SchedulerSetup {
    /// Static-list scheduler over a fresh in-memory (or supplied) state
    pub async fn build_static(
        &self,
        state: StateStore,
        telescope_list: &[&str],
        start: DateTime<Utc>,
    ) -> Scheduler<FakeCatalog, FakeStorage> {
        let resolver = TelescopeResolver::with_static_list(
            telescope_list.iter().map(|s| s.to_string()).collect(),
            self.catalog.clone(),
        );
        self.build(state, resolver, start).await
    }

    pub async fn build_dynamic(
        &self,
        state: StateStore,
        start: DateTime<Utc>,
    ) -> Scheduler<FakeCatalog, FakeStorage> {
        let resolver = TelescopeResolver::dynamic(self.catalog.clone());
        self.build(state, resolver, start).await
    }

    async fn build(
        &self,
        state: StateStore,
        resolver: TelescopeResolver<FakeCatalog>,
        start: DateTime<Utc>,
    ) -> Scheduler<FakeCatalog, FakeStorage> {
        let paths = FolderPathBuilder::new("Candidates/Skyportal", None);
        let uploader = UploadOrchestrator::new(self.storage.clone(), fast_backoff(3));
        let notifier = NotificationRouter::new(Some(self.alert.clone() as Arc<dyn AlertClient>));

        Scheduler::new(
            self.catalog.clone(),
            resolver,
            paths,
            uploader,
            state,
            notifier,
            SchedulerOptions {
                poll_interval: Duration::from_secs(30),
                start_time: start,
                retention: chrono::Duration::days(7),
            },
        )
        .await
        .expect("scheduler wiring")
    }
}

pub fn setup() -> SchedulerSetup {
    SchedulerSetup {
        catalog: Arc::new(FakeCatalog::new()),
        storage: Arc::new(FakeStorage::new()),
        alert: Arc::new(FakeAlert::default()),
    }
}
