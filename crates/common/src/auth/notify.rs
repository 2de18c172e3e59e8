//! Notification sink that writes to the log
//!
//! Used when no GUI notification area is available (headless runs, tests).

use tracing::{error, info, warn};

use super::traits::{Notification, NotificationSink, Severity};

/// Logs every notification at a level matching its severity
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let clickable = notification.action.is_some();
        match notification.severity {
            Severity::Information => {
                info!(title = %notification.title, clickable, "{}", notification.message);
            }
            Severity::Warning => {
                warn!(title = %notification.title, clickable, "{}", notification.message);
            }
            Severity::Critical => {
                error!(title = %notification.title, clickable, "{}", notification.message);
            }
        }
    }
}
