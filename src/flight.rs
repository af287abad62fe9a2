//! Request coalescing.
//!
//! [`SingleFlight`] makes concurrent callers asking for the same key share one
//! execution of the underlying work. The first caller runs it; callers that
//! arrive while it is running wait and receive a clone of its result. Once the
//! work finishes the key is released, so later callers start a fresh run.
//!
//! If the running caller is cancelled before finishing, one of the waiters
//! takes over and runs the work itself. When every caller for a key is
//! cancelled the key is released as well.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;

struct Flight<V> {
    cell: Arc<OnceCell<V>>,
    callers: usize,
}

/// Coalesces concurrent work per key.
pub struct SingleFlight<K, V> {
    in_flight: Mutex<HashMap<K, Flight<V>>>,
}

/// A caller's claim on an in-flight key, released on drop.
struct Slot<'a, K: Eq + Hash, V> {
    in_flight: &'a Mutex<HashMap<K, Flight<V>>>,
    key: K,
    cell: Arc<OnceCell<V>>,
}

impl<K: Eq + Hash, V> Drop for Slot<'_, K, V> {
    fn drop(&mut self) {
        let mut in_flight = lock(self.in_flight);
        let release = match in_flight.get_mut(&self.key) {
            // A newer run may already own the key
            Some(flight) if Arc::ptr_eq(&flight.cell, &self.cell) => {
                flight.callers -= 1;
                flight.callers == 0 || flight.cell.initialized()
            }
            _ => false,
        };
        if release {
            in_flight.remove(&self.key);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` for `key`, or wait for an in-flight run of the same key.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut in_flight = lock(&self.in_flight);
            let flight = in_flight.entry(key.clone()).or_insert_with(|| Flight {
                cell: Arc::new(OnceCell::new()),
                callers: 0,
            });
            flight.callers += 1;
            flight.cell.clone()
        };

        let slot = Slot {
            in_flight: &self.in_flight,
            key,
            cell,
        };
        let value = slot.cell.get_or_init(work).await.clone();
        drop(slot);
        value
    }

    /// Number of keys with work in flight.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
