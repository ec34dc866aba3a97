//! Telescope/instrument resolution
//!
//! Two mutually exclusive modes, selected by configuration: static-list
//! resolution against a fixed allow list (no external calls), and dynamic
//! resolution from the source's actual photometry/spectroscopy records.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use skymirror_common::Result;

use crate::clients::CatalogClient;
use crate::source::{Source, TelescopeInstrument};

/// Fallback telescope name when the catalog does not know an instrument.
/// Still yields a valid (sanitized) folder; unknown instruments are never
/// rejected.
pub const UNKNOWN_TELESCOPE: &str = "Unknown telescope name";

enum ResolveMode {
    /// Fixed allow list of combined telescope-instrument labels
    StaticList(Vec<String>),
    /// Live photometry/spectroscopy lookup against the catalog
    Dynamic,
}

/// Maps a source to its set of (telescope, instrument) pairs
pub struct TelescopeResolver<C> {
    catalog: Arc<C>,
    mode: ResolveMode,
    /// Per-source results, memoized for the lifetime of one run
    source_cache: HashMap<String, Vec<TelescopeInstrument>>,
    /// instrument name → telescope name lookups, shared across sources
    telescope_cache: HashMap<String, String>,
}

impl<C: CatalogClient> TelescopeResolver<C> {
    pub fn with_static_list(allow_list: Vec<String>, catalog: Arc<C>) -> Self {
        Self {
            catalog,
            mode: ResolveMode::StaticList(allow_list),
            source_cache: HashMap::new(),
            telescope_cache: HashMap::new(),
        }
    }

    pub fn dynamic(catalog: Arc<C>) -> Self {
        Self {
            catalog,
            mode: ResolveMode::Dynamic,
            source_cache: HashMap::new(),
            telescope_cache: HashMap::new(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.mode, ResolveMode::Dynamic)
    }

    /// Resolve the telescope/instrument pairs for a source.
    ///
    /// Only transient (network) failures of the dynamic lookups surface as
    /// `Err`; every other problem degrades to a warning plus a reduced or
    /// empty pair set.
    pub async fn resolve(&mut self, source: &Source) -> Result<Vec<TelescopeInstrument>> {
        match &self.mode {
            ResolveMode::StaticList(allow_list) => Ok(static_pairs(allow_list, source)),
            ResolveMode::Dynamic => self.resolve_dynamic(source).await,
        }
    }

    async fn resolve_dynamic(&mut self, source: &Source) -> Result<Vec<TelescopeInstrument>> {
        if let Some(cached) = self.source_cache.get(&source.id) {
            debug!(source_id = %source.id, "instrument set served from cache");
            return Ok(cached.clone());
        }

        // BTreeSet keeps the derived pair order deterministic
        let mut instrument_names = BTreeSet::new();

        let photometry = match self.catalog.fetch_photometry_instruments(&source.id).await {
            Ok(names) => names,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                warn!(source_id = %source.id, error = %e, "photometry fetch failed");
                Vec::new()
            }
        };
        let has_photometry = !photometry.is_empty();
        instrument_names.extend(photometry);

        let spectra = match self.catalog.fetch_spectroscopy_instruments(&source.id).await {
            Ok(names) => names,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                warn!(source_id = %source.id, error = %e, "spectroscopy fetch failed");
                Vec::new()
            }
        };
        if spectra.is_empty() {
            warn!(
                source_id = %source.id,
                "{}",
                if has_photometry {
                    "no spectroscopy records for source"
                } else {
                    "no photometry and spectroscopy records for source"
                }
            );
        }
        instrument_names.extend(spectra);

        let mut pairs = Vec::with_capacity(instrument_names.len());
        for name in instrument_names {
            let telescope = self.telescope_for(&name).await;
            pairs.push(TelescopeInstrument::new(telescope, name));
        }

        self.source_cache.insert(source.id.clone(), pairs.clone());
        Ok(pairs)
    }

    async fn telescope_for(&mut self, instrument_name: &str) -> String {
        if let Some(telescope) = self.telescope_cache.get(instrument_name) {
            return telescope.clone();
        }

        let telescope = match self.catalog.fetch_telescope_name(instrument_name).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                warn!(instrument = %instrument_name, "instrument not found in catalog");
                UNKNOWN_TELESCOPE.to_string()
            }
            Err(e) => {
                warn!(instrument = %instrument_name, error = %e, "telescope lookup failed");
                UNKNOWN_TELESCOPE.to_string()
            }
        };

        self.telescope_cache
            .insert(instrument_name.to_string(), telescope.clone());
        telescope
    }
}

/// Static mode: intersect the source's raw instrument tags with the allow
/// list. A record carrying no tags (the catalog omitted them) gets the full
/// allow list.
fn static_pairs(allow_list: &[String], source: &Source) -> Vec<TelescopeInstrument> {
    if source.instruments.is_empty() {
        return allow_list
            .iter()
            .map(|entry| TelescopeInstrument::label(entry.clone()))
            .collect();
    }

    allow_list
        .iter()
        .filter(|entry| source.instruments.iter().any(|tag| tag == *entry))
        .map(|entry| TelescopeInstrument::label(entry.clone()))
        .collect()
}
