use model::{Account, AccountId, ErrorKind, RuntimeError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CachedAccount {
    account: Account,
    fetched_at: Instant,
}

/// Short-TTL cache for refreshed account balances (spec §4.4 gate 1, §5).
///
/// Guarded by a mutex with a double-checked refresh: the first caller past
/// the TTL re-fetches and repopulates the cache while holding the lock, so
/// a thundering herd of expired readers does not each issue their own
/// broker refresh.
#[derive(Debug)]
pub struct AccountBalanceCache {
    ttl: Duration,
    entries: Mutex<HashMap<AccountId, CachedAccount>>,
}

impl AccountBalanceCache {
    /// Builds a cache with the given time-to-live.
    pub fn new(ttl: Duration) -> Self {
        AccountBalanceCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached account if fresh; otherwise calls `refresh` once
    /// (while holding the lock) and caches the result.
    pub fn get_or_refresh(
        &self,
        account_id: AccountId,
        refresh: impl FnOnce() -> Result<Account, RuntimeError>,
    ) -> Result<Account, RuntimeError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| RuntimeError::new(ErrorKind::Internal, "account balance cache poisoned"))?;

        if let Some(cached) = entries.get(&account_id) {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.account.clone());
            }
        }

        let account = refresh()?;
        entries.insert(
            account_id,
            CachedAccount {
                account: account.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::AccountMode;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn account() -> Account {
        Account {
            id: AccountId(1),
            balance: dec!(50000),
            cash: dec!(50000),
            currency: "USD".to_string(),
            mode: AccountMode::Margin,
            balance_refreshed_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn second_call_within_ttl_does_not_refresh() {
        let cache = AccountBalanceCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        cache
            .get_or_refresh(AccountId(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(account())
            })
            .unwrap();
        cache
            .get_or_refresh(AccountId(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(account())
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_entry_is_refreshed() {
        let cache = AccountBalanceCache::new(Duration::from_millis(1));
        let calls = AtomicUsize::new(0);

        cache
            .get_or_refresh(AccountId(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(account())
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(5));
        cache
            .get_or_refresh(AccountId(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(account())
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
