//! Runtime configuration.
//!
//! Everything here has a sensible default; construct with
//! `RuntimeConfig::default()` and override with the `with_*` methods.
//!
//! ```ignore
//! let config = RuntimeConfig::default()
//!     .with_max_propagation_depth(64)
//!     .with_trace_propagation(true);
//! let runtime = Runtime::with_config(MemoryDom::new(), config);
//! ```

use crate::cells::SlotId;

/// Tunables for a [`Runtime`](crate::engine::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Distance between two consecutive slot ids. Each slot reserves
    /// `slot_stride - 1` offsets for co-located data.
    pub slot_stride: u64,
    /// First slot id handed out. Ids below it are reserved for
    /// context-level keys.
    pub slot_base: u64,
    /// Maximum nesting of re-entrant publishes before propagation is cut.
    pub max_propagation_depth: usize,
    /// Maximum number of diagnostics kept in memory.
    pub max_diagnostics: usize,
    /// Emit a `trace!` event for every subscriber notification.
    pub trace_propagation: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            slot_stride: 10,
            slot_base: 10,
            max_propagation_depth: 256,
            max_diagnostics: 1024,
            trace_propagation: false,
        }
    }
}

impl RuntimeConfig {
    pub fn with_slot_stride(mut self, stride: u64) -> Self {
        // Offsets 1..=7 must fit inside one stride.
        self.slot_stride = stride.max(8);
        self
    }

    pub fn with_slot_base(mut self, base: u64) -> Self {
        self.slot_base = base.max(SlotId::RESERVED);
        self
    }

    pub fn with_max_propagation_depth(mut self, depth: usize) -> Self {
        self.max_propagation_depth = depth.max(1);
        self
    }

    pub fn with_max_diagnostics(mut self, limit: usize) -> Self {
        self.max_diagnostics = limit;
        self
    }

    pub fn with_trace_propagation(mut self, enabled: bool) -> Self {
        self.trace_propagation = enabled;
        self
    }
}
