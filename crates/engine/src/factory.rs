//! Transaction factories
//!
//! A [`TransactionFactory`] stands for one transaction family: a config plus
//! the speculative sizing learned by its previous transactions. Factories
//! are cheap to clone and can be shared between threads.

use crate::speculative::SpeculativeConfig;
use crate::stm::StmShared;
use crate::transaction::{Transaction, TransactionPool};
use orecstm_core::TransactionConfig;
use std::sync::Arc;

/// Creates transactions of one family
#[derive(Debug, Clone)]
pub struct TransactionFactory {
    pub(crate) shared: Arc<StmShared>,
    pub(crate) config: Arc<TransactionConfig>,
    pub(crate) speculative: Arc<SpeculativeConfig>,
}

impl TransactionFactory {
    pub(crate) fn new(shared: Arc<StmShared>, config: TransactionConfig) -> Self {
        let speculative = Arc::new(SpeculativeConfig::new(&config));
        TransactionFactory {
            shared,
            config: Arc::new(config),
            speculative,
        }
    }

    /// Family configuration
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Sizing learned so far
    pub fn speculative_config(&self) -> &SpeculativeConfig {
        &self.speculative
    }

    /// Start a fresh transaction
    pub fn new_transaction(&self) -> Transaction {
        Transaction::new(self)
    }

    /// Start a transaction, reusing one from this thread's pool if possible
    ///
    /// Hand it back with [`TransactionPool::release`] when done.
    pub fn new_pooled_transaction(&self) -> Transaction {
        TransactionPool::acquire(self)
    }
}
