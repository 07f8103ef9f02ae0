/// Number of recent mutation keys an account remembers for deduplication.
pub const LAST_EXECUTED_OPERATIONS_LIMIT: usize = 20;

/// Reason recorded on temporary capital granted without an explicit reason.
pub const DEFAULT_TEMPORARY_CAPITAL_REASON: &str = "TemporaryCapital";
