//! Catalog source and resolved telescope/instrument models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// A saved source as returned by the SkyPortal sources API.
///
/// Immutable once fetched; everything here comes from the catalog and is
/// never mutated locally.
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    /// Stable catalog identifier (e.g. object name)
    pub id: String,
    /// Right ascension in degrees
    #[serde(default)]
    pub ra: Option<f64>,
    /// Declination in degrees
    #[serde(default)]
    pub dec: Option<f64>,
    /// When the source was saved to the catalog
    #[serde(deserialize_with = "deserialize_saved_at")]
    pub saved_at: DateTime<Utc>,
    /// Groups the source was saved to
    #[serde(default)]
    pub group_ids: Vec<i64>,
    /// Raw instrument tags attached to the record, when the catalog
    /// includes them in the listing response
    #[serde(default)]
    pub instruments: Vec<String>,
}

/// SkyPortal emits saved_at both with and without an explicit offset.
fn deserialize_saved_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    skymirror_common::time::parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// A resolved (telescope, instrument) pair for a source.
///
/// Static-list mode yields bare telescope labels (the list entries are
/// already combined strings like `TAROT-TCA`); dynamic mode resolves the
/// telescope name per instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TelescopeInstrument {
    pub telescope: String,
    pub instrument: Option<String>,
}

impl TelescopeInstrument {
    pub fn new(telescope: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self {
            telescope: telescope.into(),
            instrument: Some(instrument.into()),
        }
    }

    /// A combined label with no separate instrument part
    pub fn label(telescope: impl Into<String>) -> Self {
        Self {
            telescope: telescope.into(),
            instrument: None,
        }
    }

    /// Folder segment name: `{telescope}-{instrument}`, or the bare label
    pub fn segment(&self) -> String {
        match &self.instrument {
            Some(instrument) => format!("{}-{}", self.telescope, instrument),
            None => self.telescope.clone(),
        }
    }

    /// Instrument part as stored in the dedup record (empty when absent)
    pub fn instrument_key(&self) -> &str {
        self.instrument.as_deref().unwrap_or("")
    }
}
