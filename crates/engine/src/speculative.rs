//! Speculative attached-set sizing
//!
//! Most transactions touch one or a handful of refs. A transaction family
//! starts with the cheapest backing (a single slot) and, when an attempt
//! overflows it, remembers how many refs were needed so the next attempt
//! starts with a backing that fits.
//!
//! ```text
//! required ≤ 1               → Mono
//! required ≤ max_array_size  → Array
//! otherwise                  → Growable
//! ```

use orecstm_core::TransactionConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Backing used for a transaction's attached set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachedSetKind {
    /// Single slot
    Mono,
    /// Fixed-capacity vector scanned linearly
    Array,
    /// Hash map without a size limit
    Growable,
}

/// Attached-set size learned across attempts of one transaction family
#[derive(Debug)]
pub struct SpeculativeConfig {
    enabled: bool,
    max_array_size: usize,
    min_required: AtomicUsize,
    family_name: String,
}

impl SpeculativeConfig {
    /// Create from a family config
    pub fn new(config: &TransactionConfig) -> Self {
        SpeculativeConfig {
            enabled: config.speculative_config_enabled,
            max_array_size: config.max_array_size,
            min_required: AtomicUsize::new(1),
            family_name: config.family_name.clone(),
        }
    }

    /// Whether sizing is learned at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Largest attached-set size needed so far
    pub fn min_required(&self) -> usize {
        self.min_required.load(Ordering::Acquire)
    }

    /// Backing the next attempt should use
    pub fn attached_set_kind(&self) -> AttachedSetKind {
        if !self.enabled {
            return AttachedSetKind::Growable;
        }
        let required = self.min_required();
        if required <= 1 {
            AttachedSetKind::Mono
        } else if required <= self.max_array_size {
            AttachedSetKind::Array
        } else {
            AttachedSetKind::Growable
        }
    }

    /// Record that an attempt needed room for `required` refs
    pub fn signal_required(&self, required: usize) {
        let previous = self.min_required.fetch_max(required, Ordering::AcqRel);
        if required > previous {
            debug!(
                family = %self.family_name,
                previous,
                required,
                next = ?self.attached_set_kind(),
                "speculative config grew attached set"
            );
        }
    }
}
