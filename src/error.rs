//! Error types and diagnostics.
//!
//! Two families of failures exist:
//! - [`Error`] values returned by the programmatic API (stale handles,
//!   failing handlers, runaway propagation).
//! - [`Diagnostic`] records for configuration and content problems found
//!   while rendering. These never abort a render: the offending effect turns
//!   into a no-op and the problem is logged and recorded.

use std::fmt;

use thiserror::Error;

use crate::context::ContextId;
use crate::engine::{EffectId, InstanceId, ObservableId};

/// The top-level error type for spark-dom operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    #[error("template not found: {0}")]
    UnknownTemplate(String),

    #[error("context {0} is no longer alive")]
    StaleContext(ContextId),

    #[error("effect {0:?} is no longer alive")]
    StaleEffect(EffectId),

    #[error("template instance {0:?} is no longer alive")]
    StaleInstance(InstanceId),

    #[error("observable {0:?} is no longer alive")]
    StaleObservable(ObservableId),

    #[error("propagation exceeded the maximum depth of {0}")]
    PropagationDepth(usize),

    #[error("handler failed: {0}")]
    Handler(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Diagnostics
// =============================================================================

/// A recorded configuration or content problem.
///
/// `origin` names the component that found the problem (for instance
/// `"TemplateEffect"`), `context` carries free-form details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub origin: &'static str,
    pub message: String,
    pub context: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "{}: {}", self.origin, self.message)
        } else {
            write!(f, "{}: {} ({})", self.origin, self.message, self.context)
        }
    }
}

/// Bounded log of diagnostics kept by the runtime.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    limit: usize,
    dropped: usize,
}

impl Diagnostics {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    /// Log and record a diagnostic.
    pub fn report(&mut self, origin: &'static str, message: impl Into<String>, context: impl Into<String>) {
        let diagnostic = Diagnostic {
            origin,
            message: message.into(),
            context: context.into(),
        };
        tracing::error!(
            origin = diagnostic.origin,
            context = %diagnostic.context,
            "{}",
            diagnostic.message
        );
        if self.entries.len() < self.limit {
            self.entries.push(diagnostic);
        } else {
            self.dropped += 1;
        }
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of diagnostics that did not fit in the log.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take all recorded diagnostics, leaving the log empty.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        self.dropped = 0;
        std::mem::take(&mut self.entries)
    }
}
