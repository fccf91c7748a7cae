//! Nested transaction bookkeeping.
//!
//! Transactions nest through a single non-negative depth counter: depth 0
//! opens a real `BEGIN`, deeper levels open savepoints. Commits above
//! depth 1 are deferred (they only decrement, so the outermost `COMMIT`
//! flushes everything); rollbacks act immediately at every level.

/// Savepoint name prefix, numbered by the depth that opened it.
const SAVEPOINT_PREFIX: &str = "postgrex_";

/// Transaction control operations accepted by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxnOp {
    Begin,
    Commit,
    Rollback,
}

/// What a transaction request has to do on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TxnAction {
    /// Run this SQL, then apply the counter change on success.
    Run(String),
    /// Counter-only operation; reply ok without touching the server.
    Skip,
}

/// Integer-depth tracker over BEGIN/SAVEPOINT/COMMIT/ROLLBACK.
#[derive(Debug, Default)]
pub(crate) struct TransactionTracker {
    depth: u32,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Decide what `op` does at the current depth.
    pub fn plan(&self, op: TxnOp) -> TxnAction {
        match op {
            TxnOp::Begin => match self.depth {
                0 => TxnAction::Run("BEGIN".into()),
                n => TxnAction::Run(format!("SAVEPOINT {SAVEPOINT_PREFIX}{n}")),
            },
            TxnOp::Commit => match self.depth {
                1 => TxnAction::Run("COMMIT".into()),
                _ => TxnAction::Skip,
            },
            TxnOp::Rollback => match self.depth {
                0 => TxnAction::Skip,
                1 => TxnAction::Run("ROLLBACK".into()),
                n => TxnAction::Run(format!(
                    "ROLLBACK TO SAVEPOINT {SAVEPOINT_PREFIX}{}",
                    n - 1
                )),
            },
        }
    }

    /// Apply the counter change after `op` succeeded (or was skipped).
    pub fn apply(&mut self, op: TxnOp) {
        match op {
            TxnOp::Begin => self.depth += 1,
            TxnOp::Commit | TxnOp::Rollback => self.depth = self.depth.saturating_sub(1),
        }
    }
}
