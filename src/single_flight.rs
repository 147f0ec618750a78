use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::AlreadyInProgress;

/// Rejects work for a key while earlier work for the same key is outstanding.
///
/// Nothing is queued: the second caller gets [`AlreadyInProgress`] and its future
/// is dropped unpolled.
pub struct SingleFlightGuard<K> {
    in_flight: Mutex<HashSet<K>>,
}

impl<K> Default for SingleFlightGuard<K> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
        }
    }
}

/// Releases the key when the flight finishes, fails or is cancelled.
struct Flight<'a, K: Eq + Hash> {
    guard: &'a SingleFlightGuard<K>,
    key: Option<K>,
}

impl<K: Eq + Hash> Drop for Flight<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.guard
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
    }
}

impl<K> SingleFlightGuard<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<F, Fut, T>(&self, key: K, f: F) -> Result<T, AlreadyInProgress>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _flight = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if !in_flight.insert(key.clone()) {
                debug!("Request {:?} already in flight, ignoring", key);
                return Err(AlreadyInProgress);
            }
            Flight {
                guard: self,
                key: Some(key),
            }
        };

        Ok(f().await)
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}
