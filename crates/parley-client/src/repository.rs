//! In-memory chat and contact repositories.
//!
//! Each map is guarded by its own mutex and only exposes whole-value
//! operations, so no caller can hold a reference into another component's
//! state.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use parley_store::{Chat, Contact};

pub type ChatRepository = SyncMap<String, Chat>;
pub type ContactRepository = SyncMap<String, Contact>;

#[derive(Debug)]
pub struct SyncMap<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for SyncMap<K, V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SyncMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, V>> {
        // Values are replaced whole, a panicking writer cannot leave one torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    pub fn put(&self, key: K, value: V) {
        self.lock().insert(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.lock().remove(key)
    }

    /// Visit every entry until `f` returns false.
    pub fn range(&self, mut f: impl FnMut(&K, &V) -> bool) {
        for (k, v) in self.lock().iter() {
            if !f(k, v) {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for SyncMap<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: Mutex::new(iter.into_iter().collect()),
        }
    }
}
