//! Transaction configuration
//!
//! A [`TransactionConfig`] is shared by every transaction of one "family"
//! (all transactions created by the same factory). It is plain data: cheap to
//! clone, serializable so it can live in a config file next to the rest of
//! an application's settings.
//!
//! ## Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `readonly` | `false` |
//! | `read_tracking_enabled` | `true` |
//! | `dirty_check_enabled` | `true` |
//! | `blocking_allowed` | `true` |
//! | `isolation_level` | `Snapshot` |
//! | `pessimistic_lock_level` | `None` |
//! | `max_retries` | `1000` |
//! | `spin_count` | `16` |
//! | `speculative_config_enabled` | `false` |
//! | `max_array_size` | `20` |

use crate::error::{Result, StmError};
use crate::types::{IsolationLevel, PessimisticLockLevel};
use serde::{Deserialize, Serialize};

/// Default number of retries a transaction family gets
pub const DEFAULT_MAX_RETRIES: u32 = 1000;

/// Default number of spins on a contended orec before giving up
pub const DEFAULT_SPIN_COUNT: u32 = 16;

/// Default capacity of the array-backed attached set
pub const DEFAULT_MAX_ARRAY_SIZE: usize = 20;

/// Configuration shared by all transactions of one family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Name used in logs to tell transaction families apart
    pub family_name: String,
    /// Reject writes, constructions and commutes
    pub readonly: bool,
    /// Attach every read. When disabled, unlocked reads of read-biased refs
    /// are not attached and any global conflict aborts the transaction.
    pub read_tracking_enabled: bool,
    /// Skip publishing writes whose value equals their base
    pub dirty_check_enabled: bool,
    /// Allow `register_change_listener_and_abort`
    pub blocking_allowed: bool,
    /// Isolation level
    pub isolation_level: IsolationLevel,
    /// Eager locking applied to every open
    pub pessimistic_lock_level: PessimisticLockLevel,
    /// Number of soft resets allowed before the transaction stays dead
    pub max_retries: u32,
    /// Spins on a contended orec before an arrive/lock attempt fails
    pub spin_count: u32,
    /// Learn the attached-set capacity from previous attempts
    pub speculative_config_enabled: bool,
    /// Capacity of the array-backed attached set
    pub max_array_size: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        TransactionConfig {
            family_name: "default".to_string(),
            readonly: false,
            read_tracking_enabled: true,
            dirty_check_enabled: true,
            blocking_allowed: true,
            isolation_level: IsolationLevel::default(),
            pessimistic_lock_level: PessimisticLockLevel::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            spin_count: DEFAULT_SPIN_COUNT,
            speculative_config_enabled: false,
            max_array_size: DEFAULT_MAX_ARRAY_SIZE,
        }
    }
}

impl TransactionConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the family name
    pub fn with_family_name(mut self, name: impl Into<String>) -> Self {
        self.family_name = name.into();
        self
    }

    /// Set readonly
    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Enable or disable read tracking
    pub fn with_read_tracking(mut self, enabled: bool) -> Self {
        self.read_tracking_enabled = enabled;
        self
    }

    /// Enable or disable the dirty check
    pub fn with_dirty_check(mut self, enabled: bool) -> Self {
        self.dirty_check_enabled = enabled;
        self
    }

    /// Allow or forbid blocking retry
    pub fn with_blocking_allowed(mut self, allowed: bool) -> Self {
        self.blocking_allowed = allowed;
        self
    }

    /// Set the isolation level
    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// Set the pessimistic lock level
    pub fn with_pessimistic_lock_level(mut self, level: PessimisticLockLevel) -> Self {
        self.pessimistic_lock_level = level;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the spin count
    pub fn with_spin_count(mut self, spin_count: u32) -> Self {
        self.spin_count = spin_count;
        self
    }

    /// Enable or disable speculative attached-set sizing
    pub fn with_speculative_config(mut self, enabled: bool) -> Self {
        self.speculative_config_enabled = enabled;
        self
    }

    /// Set the array-backed attached set capacity
    pub fn with_max_array_size(mut self, size: usize) -> Self {
        self.max_array_size = size;
        self
    }

    /// Check the config for contradictory settings
    ///
    /// # Errors
    /// `IllegalArgument` when the retry budget or array size is zero, or when
    /// a readonly family asks for eager write locks.
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(StmError::IllegalArgument(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.max_array_size == 0 {
            return Err(StmError::IllegalArgument(
                "max_array_size must be at least 1".to_string(),
            ));
        }
        // *Reads levels lock plain reads too, which a readonly family may want
        let write_only_locking = matches!(
            self.pessimistic_lock_level,
            PessimisticLockLevel::UpdateWrites | PessimisticLockLevel::CommitWrites
        );
        if self.readonly && write_only_locking {
            return Err(StmError::IllegalArgument(format!(
                "readonly family '{}' cannot use pessimistic lock level {:?}",
                self.family_name, self.pessimistic_lock_level
            )));
        }
        Ok(())
    }

    /// Whether conflict-counter validation is disabled because every open is
    /// locked eagerly
    pub fn is_read_validation_disabled(&self) -> bool {
        self.pessimistic_lock_level.read_lock_mode().is_locked()
    }
}
