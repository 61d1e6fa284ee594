//! SQL fragments shared by every component that aggregates splits in SQLite.

/// Reconcile flags counted towards the cleared balance.
pub const CLEARED_FLAGS: &str = "'c', 'y', 'f'";

/// Reconcile flags counted towards the reconciled balance.
pub const RECONCILED_FLAGS: &str = "'y', 'f'";

/// Select list computing the three sums over a `splits s` relation.
pub fn subtotal_columns() -> String {
    format!(
        "COALESCE(SUM(s.amount), 0),
         COALESCE(SUM(CASE WHEN s.reconcile IN ({CLEARED_FLAGS}) THEN s.amount ELSE 0 END), 0),
         COALESCE(SUM(CASE WHEN s.reconcile IN ({RECONCILED_FLAGS}) THEN s.amount ELSE 0 END), 0)"
    )
}
