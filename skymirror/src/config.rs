//! Configuration resolution for skymirror
//!
//! Settings resolve with ENV → TOML → compiled default priority. The env
//! variable names match the original deployment (`SKYPORTAL_TOKEN`,
//! `OWNCLOUD_USERNAME`, ...), so an existing `.env`-style setup carries
//! over. Missing required settings are fatal before the loop starts.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use skymirror_common::config::{optional_setting, read_toml_config, required_setting};
use skymirror_common::{time, Error, Result};

use crate::upload::BackoffPolicy;

const DEFAULT_SKYPORTAL_URL: &str = "https://skyportal-icare.ijclab.in2p3.fr";
const DEFAULT_OWNCLOUD_BASE_URL: &str =
    "https://grandma-owncloud.lal.in2p3.fr/remote.php/dav/files";
const DEFAULT_SAVE_PATH: &str = "Candidates/Skyportal";
const DEFAULT_SERVICE_NAME: &str = "owncloud-folder-service";
const DEFAULT_STATE_DB: &str = "skymirror.db";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Telescopes mirrored in static-list mode when none are configured
const DEFAULT_TELESCOPE_LIST: &str = "TAROT-TCA,TAROT-TRE,TAROT-TCH,Les-Makes-T60,UBAI-NT-60,\
UBAI-ST-60,FRAM-CTA-N,FRAM-Auger,OHP-IRIS,AbAO-T150,VIRT,TRT-SBO,TRT-GAO,TRT-SRO,TRT-CTO,TNT,\
ShAO-T60,AbAO-T70,GMG-2.4,Xinglong-2.16m,OST-CDK,HAO,KAO,OPD-60cm";

/// On-disk TOML schema; every field optional so env and defaults fill in
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    pub skyportal_url: Option<String>,
    pub skyportal_token: Option<String>,
    pub group_ids: Option<Vec<i64>>,
    pub poll_interval_secs: Option<u64>,
    pub start_time: Option<String>,
    pub use_telescope_list: Option<bool>,
    pub telescope_list: Option<Vec<String>>,
    pub source_tag: Option<String>,
    pub owncloud_base_url: Option<String>,
    pub owncloud_username: Option<String>,
    pub owncloud_token: Option<String>,
    pub owncloud_user_id: Option<String>,
    pub save_path: Option<String>,
    pub slack_token: Option<String>,
    pub slack_service_name: Option<String>,
    pub state_db: Option<PathBuf>,
    pub retention_days: Option<i64>,
    pub request_timeout_secs: Option<u64>,
    pub retry: Option<RetryConfigFile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryConfigFile {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
}

/// Fully resolved watcher configuration, immutable after startup
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub skyportal_url: String,
    pub skyportal_token: String,
    pub group_ids: Vec<i64>,
    pub poll_interval: Duration,
    /// Explicit monitoring start; `None` means now − 24 h
    pub start_time: Option<DateTime<Utc>>,
    /// Static-list mode when true, dynamic lookup when false
    pub use_telescope_list: bool,
    pub telescope_list: Vec<String>,
    pub source_tag: Option<String>,
    pub owncloud_base_url: String,
    pub owncloud_username: String,
    pub owncloud_token: String,
    pub owncloud_user_id: String,
    pub save_path: String,
    /// Absence disables alert notifications, not fatal
    pub slack_token: Option<String>,
    pub slack_service_name: String,
    pub state_db: PathBuf,
    pub retention: chrono::Duration,
    pub request_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl WatcherConfig {
    /// Load the optional TOML file at `path`, then apply env overrides and
    /// defaults. All failures are configuration errors (fatal at startup).
    pub fn load(path: &Path) -> Result<Self> {
        let file: ConfigFile = if path.exists() {
            read_toml_config(path)?
        } else {
            warn!(
                "config file not found at {}, using environment and defaults",
                path.display()
            );
            ConfigFile::default()
        };
        Self::resolve(file)
    }

    fn resolve(file: ConfigFile) -> Result<Self> {
        let skyportal_url = optional_setting("SKYPORTAL_URL", file.skyportal_url)
            .unwrap_or_else(|| DEFAULT_SKYPORTAL_URL.to_string());
        let skyportal_token = required_setting("SKYPORTAL_TOKEN", file.skyportal_token)?;

        let group_ids = match optional_setting("GROUP_IDS", None) {
            Some(raw) => parse_group_ids(&raw)?,
            None => file.group_ids.unwrap_or_else(|| vec![3]),
        };
        if group_ids.is_empty() {
            return Err(Error::Config("GROUP_IDS must not be empty".to_string()));
        }

        let poll_interval_secs = match optional_setting("POLL_INTERVAL", None) {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("invalid POLL_INTERVAL '{}'", raw)))?,
            None => file.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        };
        if poll_interval_secs == 0 {
            return Err(Error::Config("POLL_INTERVAL must be at least 1".to_string()));
        }

        let start_time = match optional_setting("START_TIME", file.start_time) {
            Some(raw) => Some(time::parse_timestamp(&raw)?),
            None => None,
        };

        let use_telescope_list = match optional_setting("USE_BASE_TELESCOPE_LIST", None) {
            Some(raw) => raw.to_lowercase() == "true",
            None => file.use_telescope_list.unwrap_or(true),
        };

        let telescope_list = match optional_setting("TELESCOPE_LIST", None) {
            Some(raw) => parse_list(&raw),
            None => file
                .telescope_list
                .unwrap_or_else(|| parse_list(DEFAULT_TELESCOPE_LIST)),
        };
        if use_telescope_list && telescope_list.is_empty() {
            return Err(Error::Config(
                "TELESCOPE_LIST must not be empty in static-list mode".to_string(),
            ));
        }

        let retry = file.retry.unwrap_or_default();
        let default_backoff = BackoffPolicy::default();
        let backoff = BackoffPolicy {
            max_attempts: retry.max_attempts.unwrap_or(default_backoff.max_attempts),
            base_delay: retry
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(default_backoff.base_delay),
            multiplier: retry.multiplier.unwrap_or(default_backoff.multiplier),
        };
        if backoff.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        let retention_days = match optional_setting("SKYMIRROR_RETENTION_DAYS", None) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                Error::Config(format!("invalid SKYMIRROR_RETENTION_DAYS '{}'", raw))
            })?,
            None => file.retention_days.unwrap_or(DEFAULT_RETENTION_DAYS),
        };
        if retention_days < 1 {
            return Err(Error::Config(
                "retention_days must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            skyportal_url,
            skyportal_token,
            group_ids,
            poll_interval: Duration::from_secs(poll_interval_secs),
            start_time,
            use_telescope_list,
            telescope_list,
            source_tag: optional_setting("SOURCE_TAG", file.source_tag)
                .filter(|t| !t.trim().is_empty()),
            owncloud_base_url: optional_setting("OWNCLOUD_BASE_URL", file.owncloud_base_url)
                .unwrap_or_else(|| DEFAULT_OWNCLOUD_BASE_URL.to_string()),
            owncloud_username: required_setting("OWNCLOUD_USERNAME", file.owncloud_username)?,
            owncloud_token: required_setting("OWNCLOUD_TOKEN", file.owncloud_token)?,
            owncloud_user_id: required_setting("OWNCLOUD_USER_ID", file.owncloud_user_id)?,
            save_path: optional_setting("SAVE_PATH", file.save_path)
                .unwrap_or_else(|| DEFAULT_SAVE_PATH.to_string()),
            slack_token: optional_setting("SLACK_BOT_TOKEN", file.slack_token),
            slack_service_name: optional_setting("SLACK_SERVICE_NAME", file.slack_service_name)
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            state_db: optional_setting("SKYMIRROR_STATE_DB", None)
                .map(PathBuf::from)
                .or(file.state_db)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DB)),
            retention: chrono::Duration::days(retention_days),
            request_timeout: Duration::from_secs(
                file.request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            backoff,
        })
    }

    /// Alert channel name, derived from the service name
    pub fn slack_channel(&self) -> String {
        format!("#{}", self.slack_service_name)
    }
}

fn parse_group_ids(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("invalid group id '{}' in GROUP_IDS", s)))
        })
        .collect()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
