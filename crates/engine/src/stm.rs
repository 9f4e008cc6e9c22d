//! STM instance
//!
//! An [`Stm`] owns the global conflict counter shared by every transaction
//! it creates, and the default configuration used by
//! [`Stm::new_transaction`]. Refs are not tied to an instance, but all
//! transactions touching the same refs must come from the same `Stm` for
//! the conflict counter to see their writes.
//!
//! # Example
//!
//! ```
//! use orecstm_engine::Stm;
//! use orecstm_core::LockMode;
//!
//! let stm = Stm::new();
//! let counter = stm.new_ref(0u64);
//!
//! let mut tx = stm.new_transaction();
//! tx.open_for_write(&counter, LockMode::None)?.value += 1;
//! tx.commit()?;
//!
//! assert_eq!(counter.committed_value(), Some(1));
//! # Ok::<(), orecstm_core::StmError>(())
//! ```

use crate::factory::TransactionFactory;
use crate::reference::TxnRef;
use crate::tranlocal::TxnValue;
use crate::transaction::Transaction;
use orecstm_concurrency::GlobalConflictCounter;
use orecstm_core::{IsolationLevel, PessimisticLockLevel, Result, TransactionConfig};
use std::sync::Arc;

/// State shared by an `Stm` and all of its transactions
#[derive(Debug, Default)]
pub(crate) struct StmShared {
    pub(crate) counter: GlobalConflictCounter,
}

/// Software transactional memory instance
#[derive(Clone)]
pub struct Stm {
    shared: Arc<StmShared>,
    default_factory: TransactionFactory,
}

impl Stm {
    /// Create an instance with the default configuration
    pub fn new() -> Self {
        let shared = Arc::new(StmShared::default());
        let default_factory = TransactionFactory::new(Arc::clone(&shared), TransactionConfig::default());
        Stm {
            shared,
            default_factory,
        }
    }

    /// Configure an instance
    pub fn builder() -> StmBuilder {
        StmBuilder::new()
    }

    /// Create a committed ref holding `value`
    pub fn new_ref<T: TxnValue>(&self, value: T) -> TxnRef<T> {
        TxnRef::new_committed(value)
    }

    /// Start a transaction with the default configuration
    pub fn new_transaction(&self) -> Transaction {
        self.default_factory.new_transaction()
    }

    /// Factory for transactions sharing `config` and its speculative sizing
    ///
    /// # Errors
    /// `IllegalArgument` when the config does not validate.
    pub fn transaction_factory(&self, config: TransactionConfig) -> Result<TransactionFactory> {
        config.validate()?;
        Ok(TransactionFactory::new(Arc::clone(&self.shared), config))
    }

    /// Factory behind [`Stm::new_transaction`]
    pub fn default_factory(&self) -> &TransactionFactory {
        &self.default_factory
    }

    /// Default configuration
    pub fn default_config(&self) -> &TransactionConfig {
        self.default_factory.config()
    }

    /// Number of writes committed through this instance
    pub fn global_conflict_count(&self) -> u64 {
        self.shared.counter.count()
    }

    pub(crate) fn counter(&self) -> &GlobalConflictCounter {
        &self.shared.counter
    }
}

impl Default for Stm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Stm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stm")
            .field("global_conflict_count", &self.global_conflict_count())
            .field("default_config", self.default_config())
            .finish()
    }
}

/// Builder for [`Stm`]
///
/// # Example
///
/// ```
/// use orecstm_engine::Stm;
/// use orecstm_core::IsolationLevel;
///
/// let stm = Stm::builder()
///     .family_name("accounts")
///     .isolation_level(IsolationLevel::Serializable)
///     .build()?;
/// assert_eq!(stm.default_config().family_name, "accounts");
/// # Ok::<(), orecstm_core::StmError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct StmBuilder {
    config: TransactionConfig,
}

impl StmBuilder {
    /// Builder with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole default configuration
    pub fn config(mut self, config: TransactionConfig) -> Self {
        self.config = config;
        self
    }

    /// Family name of default transactions
    pub fn family_name(mut self, name: impl Into<String>) -> Self {
        self.config.family_name = name.into();
        self
    }

    /// Isolation level of default transactions
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.config.isolation_level = level;
        self
    }

    /// Pessimistic lock level of default transactions
    pub fn pessimistic_lock_level(mut self, level: PessimisticLockLevel) -> Self {
        self.config.pessimistic_lock_level = level;
        self
    }

    /// Retry budget of default transactions
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Enable speculative attached-set sizing for default transactions
    pub fn speculative_config(mut self, enabled: bool) -> Self {
        self.config.speculative_config_enabled = enabled;
        self
    }

    /// Build the instance
    ///
    /// # Errors
    /// `IllegalArgument` when the configuration does not validate.
    pub fn build(self) -> Result<Stm> {
        self.config.validate()?;
        let shared = Arc::new(StmShared::default());
        let default_factory = TransactionFactory::new(Arc::clone(&shared), self.config);
        Ok(Stm {
            shared,
            default_factory,
        })
    }
}
