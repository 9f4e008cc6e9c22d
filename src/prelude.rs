//! Convenient imports for orecstm.
//!
//! ```
//! use orecstm::prelude::*;
//!
//! let stm = Stm::new();
//! let r = stm.new_ref(1u32);
//! let mut tx = stm.new_transaction();
//! assert_eq!(tx.open_for_read(&r, LockMode::None)?.value, 1);
//! tx.commit()?;
//! # Ok::<(), StmError>(())
//! ```

// Entry points
pub use crate::{Stm, StmBuilder, TransactionFactory};

// Transactions and refs
pub use crate::{Tranlocal, Transaction, TransactionPool, TxnRef};

// Error handling
pub use crate::{Result, StmError};

// Configuration
pub use crate::{IsolationLevel, LockMode, LockStatus, PessimisticLockLevel, TransactionConfig};

// Blocking retry and hooks
pub use crate::{Latch, TransactionLifecycleEvent, TransactionLifecycleListener, TransactionStatus};
