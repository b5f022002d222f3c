use bytes::Bytes;
use itertools::Itertools;
use std::collections::hash_map::RandomState;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const DEFAULT_SHARDS: usize = 16;

/// The Store is responsible for managing key-value pairs. Keys are spread over a fixed number of
/// shards by hash, each shard guarded by its own lock, so commands touching unrelated keys rarely
/// contend. The store is designed to be thread-safe, allowing it to be shared and cloned cheaply
/// using reference counting: every clone refers to the same keyspace.
///
/// Commands touching several keys lock every involved shard, in ascending shard order, before
/// reading or mutating anything. Other callers therefore never observe a multi-key operation
/// half applied, and two multi-key operations can not deadlock.
#[derive(Clone)]
pub struct Store {
    inner: Arc<InnerStore>,
}

struct InnerStore {
    shards: Box<[Shard]>,
    hasher: RandomState,
}

type Shard = RwLock<HashMap<Key, Value>>;

pub type Key = Bytes;

/// A value held by the keyspace. Strings are the only type the server stores.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(Bytes),
}

impl Store {
    pub fn new() -> Store {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a store with `shards` shards, rounded up to the next power of two.
    pub fn with_shards(shards: usize) -> Store {
        let shards = shards.max(1).next_power_of_two();
        let shards = (0..shards)
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let inner = Arc::new(InnerStore {
            shards,
            hasher: RandomState::new(),
        });

        Self { inner }
    }

    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    /// Inserts `value` at `key`, overwriting whatever was stored there.
    pub fn set(&self, key: Key, value: Bytes) {
        let slot = self.slot(&key);
        self.write(slot).insert(key, Value::String(value));
    }

    pub fn get(&self, key: &[u8]) -> Option<Value> {
        let slot = self.slot(key);
        self.read(slot).get(key).cloned()
    }

    /// Removes the given keys and returns how many of them were present. A key listed twice is
    /// only counted once.
    pub fn del(&self, keys: &[Key]) -> usize {
        let slots = self.slots(keys);
        let mut shards = self.lock_write(&slots);

        let mut removed = 0;
        for (key, slot) in keys.iter().zip(slots) {
            if let Some(shard) = shards.get_mut(&slot) {
                if shard.remove(key).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Returns how many of the given keys exist. A key listed twice is counted twice.
    pub fn exists(&self, keys: &[Key]) -> usize {
        let slots = self.slots(keys);
        let shards = self.lock_read(&slots);

        keys.iter()
            .zip(slots)
            .filter(|(key, slot)| {
                shards
                    .get(slot)
                    .map_or(false, |shard| shard.contains_key(*key))
            })
            .count()
    }

    /// Number of keys in the keyspace.
    pub fn len(&self) -> usize {
        let slots = (0..self.shard_count()).collect::<Vec<_>>();
        self.lock_read(&slots).values().map(|shard| shard.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &[u8]) -> usize {
        let hash = self.inner.hasher.hash_one(key) as usize;
        hash & (self.inner.shards.len() - 1)
    }

    fn slots(&self, keys: &[Key]) -> Vec<usize> {
        keys.iter().map(|key| self.slot(key)).collect()
    }

    fn read(&self, slot: usize) -> RwLockReadGuard<'_, HashMap<Key, Value>> {
        // A panic while holding a guard can not leave a map half updated, every mutation is a
        // single `insert` or `remove`.
        self.inner.shards[slot]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, slot: usize) -> RwLockWriteGuard<'_, HashMap<Key, Value>> {
        self.inner.shards[slot]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_read(
        &self,
        slots: &[usize],
    ) -> BTreeMap<usize, RwLockReadGuard<'_, HashMap<Key, Value>>> {
        slots
            .iter()
            .copied()
            .sorted_unstable()
            .dedup()
            .map(|slot| (slot, self.read(slot)))
            .collect()
    }

    fn lock_write(
        &self,
        slots: &[usize],
    ) -> BTreeMap<usize, RwLockWriteGuard<'_, HashMap<Key, Value>>> {
        slots
            .iter()
            .copied()
            .sorted_unstable()
            .dedup()
            .map(|slot| (slot, self.write(slot)))
            .collect()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
