//! Store-backed distributed mutex.
//!
//! A lock is one store key holding the holder's token with a lease expiry.
//! Acquisition is a retried set-if-not-exists-with-expiry; release is a
//! value-equality-checked delete, so a holder whose lease already expired
//! can never delete a lease acquired by someone else. A crashed holder
//! frees the lock when the lease lapses.

use crate::{db::Db, store::StoreError};
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;
use tracing::{debug, trace};
use ulid::Ulid;

///
/// LockError
///
/// Acquisition timeout is distinct from store failure so callers can back
/// off or surface contention separately.
///

#[derive(Debug, ThisError)]
pub enum LockError {
    #[error("timed out acquiring lock `{key}` after {waited:?}")]
    Timeout { key: String, waited: Duration },

    #[error(transparent)]
    Store(#[from] StoreError),
}

///
/// Mutex
///
/// Acquisition entry point. The critical section is scoped by the returned
/// guard, which releases on every exit path including error propagation.
///

pub struct Mutex;

impl Mutex {
    /// Try to take the lock, retrying with the configured backoff until
    /// `timeout` elapses.
    pub fn acquire(db: &Db, key: impl Into<String>, timeout: Duration) -> Result<MutexGuard, LockError> {
        let key = key.into();
        let token = Ulid::new().to_string();
        let lease = db.config().lock_lease;
        let backoff = db.config().lock_backoff;
        let started = Instant::now();

        loop {
            if db.store().set_nx_ex(&key, &token, lease)? {
                trace!(key = %key, "lock acquired");
                return Ok(MutexGuard {
                    db: db.clone(),
                    key,
                    token,
                    released: false,
                });
            }

            let waited = started.elapsed();
            if waited >= timeout {
                debug!(key = %key, ?waited, "lock acquisition timed out");
                return Err(LockError::Timeout { key, waited });
            }
            std::thread::sleep(backoff.min(timeout - waited));
        }
    }
}

///
/// MutexGuard
///

#[derive(Debug)]
#[must_use = "dropping the guard releases the lock"]
pub struct MutexGuard {
    db: Db,
    key: String,
    token: String,
    released: bool,
}

impl MutexGuard {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release explicitly, surfacing store failures. Dropping the guard
    /// releases too, but swallows errors.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        let deleted = self.db.store().delete_eq(&self.key, &self.token)?;
        trace!(key = %self.key, deleted, "lock released");
        Ok(())
    }
}

impl Drop for MutexGuard {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            // best effort; an expired lease makes this a no-op
            let _ = self.db.store().delete_eq(&self.key, &self.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{Db, DbConfig},
        store::MemoryStore,
    };
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn quick_db(lease_ms: u64) -> Db {
        Db::with_config(
            Arc::new(MemoryStore::new()),
            DbConfig {
                lock_lease: Duration::from_millis(lease_ms),
                lock_backoff: Duration::from_millis(5),
                lock_timeout: Duration::from_secs(1),
            },
        )
    }

    #[test]
    fn second_acquirer_times_out_while_held() {
        let db = quick_db(5_000);
        let guard = Mutex::acquire(&db, "m:1:_lock", Duration::from_secs(1)).unwrap();

        let err = Mutex::acquire(&db, "m:1:_lock", Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));

        guard.release().unwrap();
        let _again = Mutex::acquire(&db, "m:1:_lock", Duration::from_millis(30)).unwrap();
    }

    #[test]
    fn expired_lease_becomes_acquirable() {
        let db = quick_db(20);
        let guard = Mutex::acquire(&db, "m:2:_lock", Duration::from_secs(1)).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        // lease lapsed without release
        let second = Mutex::acquire(&db, "m:2:_lock", Duration::from_millis(200)).unwrap();

        // the stale holder must not delete the new lease
        drop(guard);
        assert!(db.store().get("m:2:_lock").unwrap().is_some());
        drop(second);
        assert!(db.store().get("m:2:_lock").unwrap().is_none());
    }

    #[test]
    fn guard_releases_on_error_paths() {
        let db = quick_db(5_000);
        let result: Result<(), &str> = (|| {
            let _guard = Mutex::acquire(&db, "m:3:_lock", Duration::from_secs(1)).unwrap();
            Err("boom")
        })();
        assert!(result.is_err());
        assert!(db.store().get("m:3:_lock").unwrap().is_none());
    }

    #[test]
    fn contended_acquirers_never_overlap() {
        let db = quick_db(5_000);
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let db = db.clone();
            let inside = inside.clone();
            let overlaps = overlaps.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..20 {
                    let guard = Mutex::acquire(&db, "m:4:_lock", Duration::from_secs(5)).unwrap();
                    if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    inside.fetch_sub(1, Ordering::SeqCst);
                    guard.release().unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
