use crate::error::QuotaResult;
use crate::types::{QuotaLimits, QuotaScope, Reservation, Usage, UsageDelta};

/// Quota and usage ledger boundary.
///
/// Implementations must satisfy these invariants:
/// - `check_and_reserve` is atomic per account: the check and the update
///   happen without any other writer of that account in between.
/// - Only growing dimensions are checked; shrinking deltas always succeed.
/// - For every growing dimension, `usage + delta <= limit` after a
///   successful reservation, at container and account level.
pub trait QuotaLedger: Send + Sync {
    /// Check limits and apply `delta` to the container and its account.
    fn check_and_reserve(
        &self,
        account: &str,
        container: &str,
        delta: UsageDelta,
    ) -> QuotaResult<Reservation>;

    /// Roll a reservation back by applying its inverse delta.
    fn release(&self, reservation: Reservation) -> QuotaResult<()>;

    /// Apply a delta without checking limits (journal replay, compensations).
    fn apply(&self, account: &str, container: &str, delta: UsageDelta) -> QuotaResult<()>;

    fn usage(&self, scope: &QuotaScope) -> QuotaResult<Usage>;

    /// Effective limits: the scope's own, or the configured defaults.
    fn limits(&self, scope: &QuotaScope) -> QuotaResult<QuotaLimits>;

    fn set_limits(&self, scope: &QuotaScope, limits: QuotaLimits) -> QuotaResult<()>;
}
