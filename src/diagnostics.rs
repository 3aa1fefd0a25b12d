//! Structured diagnostics emitted while negotiating a device.
//!
//! Negotiation never depends on a sink being present; [`NoopSink`] is always a
//! valid substitute.

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => f.write_str("info"),
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

pub trait DiagnosticSink {
    fn emit(&self, severity: Severity, message: &str);
}

/// Discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn emit(&self, _severity: Severity, _message: &str) {}
}

/// Forwards messages to `tracing` at the matching level.
#[cfg(feature = "enable_tracing")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[cfg(feature = "enable_tracing")]
impl DiagnosticSink for TracingSink {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::info!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
    }
}

/// The tracing sink when `enable_tracing` is on, otherwise [`NoopSink`].
pub fn default_sink() -> Box<dyn DiagnosticSink> {
    #[cfg(feature = "enable_tracing")]
    {
        Box::new(TracingSink)
    }
    #[cfg(not(feature = "enable_tracing"))]
    {
        Box::new(NoopSink)
    }
}
