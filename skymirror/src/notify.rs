//! Notification routing
//!
//! Warnings and errors always land in the local log; when an alert client
//! is configured they are also forwarded to the operator channel. Delivery
//! failures are logged and swallowed, never propagated to the caller.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

use skymirror_common::Result;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Warning => "⚠️",
            Severity::Error => "🔴",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// Alerting channel consumed by the router
#[async_trait]
pub trait AlertClient: Send + Sync {
    async fn send(&self, severity: Severity, message: &str) -> Result<()>;
}

/// Best-effort fan-out of warning/error events
pub struct NotificationRouter {
    alert: Option<Arc<dyn AlertClient>>,
}

impl NotificationRouter {
    pub fn new(alert: Option<Arc<dyn AlertClient>>) -> Self {
        Self { alert }
    }

    /// Router with local logging only
    pub fn disabled() -> Self {
        Self { alert: None }
    }

    pub async fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Warning => warn!("{}", message),
            Severity::Error => error!("{}", message),
        }

        if let Some(alert) = &self.alert {
            if let Err(e) = alert.send(severity, message).await {
                warn!(error = %e, "alert delivery failed, continuing");
            }
        }
    }
}
