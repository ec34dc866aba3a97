//! skymirror library interface
//!
//! Watches a SkyPortal instance for newly saved sources and mirrors each
//! one as a deterministic folder hierarchy on an ownCloud WebDAV share,
//! with crash-safe watermark/dedup state and best-effort Slack alerts.
//!
//! Exposes public APIs for integration testing.

pub mod clients;
pub mod config;
pub mod folder_path;
pub mod notify;
pub mod resolver;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod upload;

pub use config::WatcherConfig;
pub use scheduler::Scheduler;
