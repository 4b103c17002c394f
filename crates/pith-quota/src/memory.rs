use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use crate::error::{QuotaError, QuotaResult};
use crate::traits::QuotaLedger;
use crate::types::{
    Dimension, LedgerDefaults, QuotaLimits, QuotaScope, Reservation, Usage, UsageDelta,
};

/// In-memory quota ledger.
///
/// Each account owns a book behind its own mutex; the book holds the
/// account's counters and every container's counters, so a reservation
/// checks and updates both levels under one lock. Writers to different
/// accounts never contend.
pub struct InMemoryQuotaLedger {
    defaults: LedgerDefaults,
    accounts: RwLock<HashMap<String, Arc<Mutex<AccountBook>>>>,
}

#[derive(Default)]
struct AccountBook {
    usage: Usage,
    limits: Option<QuotaLimits>,
    containers: HashMap<String, ContainerBook>,
}

#[derive(Default)]
struct ContainerBook {
    usage: Usage,
    limits: Option<QuotaLimits>,
}

impl InMemoryQuotaLedger {
    pub fn new(defaults: LedgerDefaults) -> Self {
        Self {
            defaults,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn defaults(&self) -> LedgerDefaults {
        self.defaults
    }

    /// Accounts with a book, sorted.
    pub fn accounts(&self) -> QuotaResult<Vec<String>> {
        let map = self.accounts.read().map_err(|_| QuotaError::LockPoisoned)?;
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn book(&self, account: &str) -> QuotaResult<Arc<Mutex<AccountBook>>> {
        {
            let map = self.accounts.read().map_err(|_| QuotaError::LockPoisoned)?;
            if let Some(book) = map.get(account) {
                return Ok(Arc::clone(book));
            }
        }
        let mut map = self.accounts.write().map_err(|_| QuotaError::LockPoisoned)?;
        Ok(Arc::clone(map.entry(account.to_string()).or_default()))
    }

    fn with_book<T>(
        &self,
        account: &str,
        f: impl FnOnce(&mut AccountBook) -> QuotaResult<T>,
    ) -> QuotaResult<T> {
        let book = self.book(account)?;
        let mut guard = book.lock().map_err(|_| QuotaError::LockPoisoned)?;
        f(&mut guard)
    }
}

impl Default for InMemoryQuotaLedger {
    fn default() -> Self {
        Self::new(LedgerDefaults::default())
    }
}

/// Reject the first growing dimension that would push `usage` past `limits`.
fn check(
    scope: impl Fn() -> QuotaScope,
    usage: &Usage,
    limits: &QuotaLimits,
    delta: &UsageDelta,
) -> QuotaResult<()> {
    for dimension in Dimension::ALL {
        let requested = delta.get(dimension);
        if requested <= 0 {
            continue;
        }
        let Some(limit) = limits.limit(dimension) else {
            continue;
        };
        let requested = requested as u64;
        let current = usage.get(dimension);
        if current.saturating_add(requested) > limit {
            return Err(QuotaError::QuotaExceeded {
                scope: scope(),
                dimension,
                usage: current,
                requested,
                limit,
            });
        }
    }
    Ok(())
}

impl QuotaLedger for InMemoryQuotaLedger {
    fn check_and_reserve(
        &self,
        account: &str,
        container: &str,
        delta: UsageDelta,
    ) -> QuotaResult<Reservation> {
        let defaults = self.defaults;
        self.with_book(account, |book| {
            let account_limits = book.limits.unwrap_or(defaults.account);
            let entry = book.containers.entry(container.to_string()).or_default();
            let container_limits = entry.limits.unwrap_or(defaults.container);

            check(
                || QuotaScope::Container(account.to_string(), container.to_string()),
                &entry.usage,
                &container_limits,
                &delta,
            )?;
            check(
                || QuotaScope::Account(account.to_string()),
                &book.usage,
                &account_limits,
                &delta,
            )?;

            entry.usage.apply(delta);
            book.usage.apply(delta);
            debug!(account, container, bytes = delta.bytes, objects = delta.objects, "quota reserved");
            Ok(Reservation {
                account: account.to_string(),
                container: container.to_string(),
                delta,
            })
        })
        .inspect_err(|e| debug!(account, container, error = %e, "quota reservation refused"))
    }

    fn release(&self, reservation: Reservation) -> QuotaResult<()> {
        warn!(
            account = %reservation.account,
            container = %reservation.container,
            bytes = reservation.delta.bytes,
            objects = reservation.delta.objects,
            "releasing quota reservation"
        );
        self.apply(
            &reservation.account,
            &reservation.container,
            reservation.delta.inverse(),
        )
    }

    fn apply(&self, account: &str, container: &str, delta: UsageDelta) -> QuotaResult<()> {
        self.with_book(account, |book| {
            book.containers
                .entry(container.to_string())
                .or_default()
                .usage
                .apply(delta);
            book.usage.apply(delta);
            Ok(())
        })
    }

    fn usage(&self, scope: &QuotaScope) -> QuotaResult<Usage> {
        self.with_book(scope.account(), |book| {
            Ok(match scope {
                QuotaScope::Account(_) => book.usage,
                QuotaScope::Container(_, container) => book
                    .containers
                    .get(container)
                    .map(|c| c.usage)
                    .unwrap_or_default(),
            })
        })
    }

    fn limits(&self, scope: &QuotaScope) -> QuotaResult<QuotaLimits> {
        let defaults = self.defaults;
        self.with_book(scope.account(), |book| {
            Ok(match scope {
                QuotaScope::Account(_) => book.limits.unwrap_or(defaults.account),
                QuotaScope::Container(_, container) => book
                    .containers
                    .get(container)
                    .and_then(|c| c.limits)
                    .unwrap_or(defaults.container),
            })
        })
    }

    fn set_limits(&self, scope: &QuotaScope, limits: QuotaLimits) -> QuotaResult<()> {
        self.with_book(scope.account(), |book| {
            match scope {
                QuotaScope::Account(_) => book.limits = Some(limits),
                QuotaScope::Container(_, container) => {
                    book.containers.entry(container.clone()).or_default().limits = Some(limits)
                }
            }
            debug!(scope = %scope, ?limits, "quota limits set");
            Ok(())
        })
    }
}

impl std::fmt::Debug for InMemoryQuotaLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQuotaLedger")
            .field("defaults", &self.defaults)
            .finish()
    }
}
