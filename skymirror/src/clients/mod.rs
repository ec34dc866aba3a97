//! External service clients
//!
//! Each collaborator (catalog, storage, alerting) is consumed through a
//! trait so the scheduler and orchestrator can be exercised against fakes.

pub mod owncloud;
pub mod skyportal;
pub mod slack;

pub use owncloud::{CreateOutcome, OwnCloudClient, StorageClient};
pub use skyportal::{CatalogClient, SkyPortalClient};
pub use slack::SlackClient;
