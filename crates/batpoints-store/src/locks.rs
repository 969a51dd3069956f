//! Striped mutual exclusion for account and content mutations.
//!
//! Every read-modify-write of an account (or content counter) happens while
//! holding the stripe its key hashes to. Operations touching several keys
//! acquire their stripes in ascending stripe index, so two opposite-direction
//! tips can never wait on each other.

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{Result, StoreError};

/// Default number of stripes.
pub const DEFAULT_STRIPES: usize = 256;

/// Default time to wait for a stripe.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// A fixed table of mutexes indexed by key hash.
pub struct StripedLocks {
    stripes: Vec<Mutex<()>>,
    timeout: Duration,
}

/// Stripes held for the duration of one mutation. Released on drop.
pub struct LockSet<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}

impl StripedLocks {
    /// Create a lock table.
    #[must_use]
    pub fn new(stripes: usize, timeout: Duration) -> Self {
        let stripes = stripes.max(1);
        Self {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
            timeout,
        }
    }

    /// Stripe index for a 16-byte key.
    #[must_use]
    pub fn stripe_of(&self, key: &[u8; 16]) -> usize {
        let mut head = [0u8; 8];
        head.copy_from_slice(&key[..8]);
        let hash = u64::from_le_bytes(head) ^ u64::from_le_bytes({
            let mut tail = [0u8; 8];
            tail.copy_from_slice(&key[8..]);
            tail
        });
        // Truncation is fine: the result is reduced modulo the stripe count.
        #[allow(clippy::cast_possible_truncation)]
        let index = (hash % self.stripes.len() as u64) as usize;
        index
    }

    /// Lock every stripe covering `keys`, in ascending stripe order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LockTimeout` if a stripe cannot be acquired
    /// within the configured timeout. Stripes already taken are released.
    pub fn lock(&self, keys: &[&[u8; 16]]) -> Result<LockSet<'_>> {
        let mut order: Vec<(usize, &[u8; 16])> =
            keys.iter().map(|key| (self.stripe_of(key), *key)).collect();
        order.sort_by_key(|(stripe, _)| *stripe);
        order.dedup_by_key(|(stripe, _)| *stripe);

        let mut guards = Vec::with_capacity(order.len());
        for (stripe, key) in order {
            match self.stripes[stripe].try_lock_for(self.timeout) {
                Some(guard) => guards.push(guard),
                None => {
                    tracing::warn!(stripe, "lock stripe timed out");
                    return Err(StoreError::LockTimeout {
                        key: uuid::Uuid::from_bytes(*key).to_string(),
                    });
                }
            }
        }

        Ok(LockSet { _guards: guards })
    }
}

impl Default for StripedLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES, DEFAULT_LOCK_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn same_key_same_stripe() {
        let locks = StripedLocks::default();
        let key = *uuid::Uuid::new_v4().as_bytes();
        assert_eq!(locks.stripe_of(&key), locks.stripe_of(&key));
        assert!(locks.stripe_of(&key) < DEFAULT_STRIPES);
    }

    #[test]
    fn duplicate_stripes_are_locked_once() {
        // A single stripe forces every key onto it; locking must not self-deadlock.
        let locks = StripedLocks::new(1, Duration::from_millis(50));
        let a = *uuid::Uuid::new_v4().as_bytes();
        let b = *uuid::Uuid::new_v4().as_bytes();
        assert!(locks.lock(&[&a, &b]).is_ok());
    }

    #[test]
    fn held_stripe_times_out() {
        let locks = StripedLocks::new(4, Duration::from_millis(20));
        let key = *uuid::Uuid::new_v4().as_bytes();
        let _held = locks.lock(&[&key]).unwrap();

        let err = locks.lock(&[&key]).err().unwrap();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
    }

    #[test]
    fn opposite_order_requests_do_not_deadlock() {
        let locks = Arc::new(StripedLocks::new(64, Duration::from_secs(5)));
        let a = *uuid::Uuid::new_v4().as_bytes();
        let b = *uuid::Uuid::new_v4().as_bytes();

        std::thread::scope(|scope| {
            for i in 0..8 {
                let locks = Arc::clone(&locks);
                scope.spawn(move || {
                    for _ in 0..200 {
                        let keys: [&[u8; 16]; 2] = if i % 2 == 0 { [&a, &b] } else { [&b, &a] };
                        let _set = locks.lock(&keys).unwrap();
                    }
                });
            }
        });
    }
}
