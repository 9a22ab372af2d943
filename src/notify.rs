//! Notification sink.
//!
//! Operations report their outcome through a `Notifier`; delivery is
//! fire-and-forget and never influences control flow. The embedding shell
//! (toast UI, system tray, ...) supplies its own implementation; the default
//! one routes through `tracing`.

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

/// Default sink: log lines, nothing else.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Success | Severity::Info => info!(target: "cetak_pos::notify", "{message}"),
            Severity::Warning => warn!(target: "cetak_pos::notify", "{message}"),
            Severity::Error => error!(target: "cetak_pos::notify", "{message}"),
        }
    }
}
