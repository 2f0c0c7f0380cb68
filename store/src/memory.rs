//! An in-memory [Store].
//!
//! Records are kept in an ordered map keyed by [Key] (so a scan over one name is a range scan)
//! with a secondary index from [Id] to [Key]. Every key that is locked (or waited on) gets its own
//! asynchronous mutex, so guards on different keys never contend. The mutex of a key is dropped
//! when its last [Guard] is released.

use crate::{Error, Id, Key, ShardRecord, Store};
use async_lock::{Mutex as AsyncMutex, MutexGuardArc};
use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};
use tracing::trace;

/// Metrics for [Memory].
#[derive(Default)]
struct Metrics {
    gets: Counter,
    inserts: Counter,
    patches: Counter,
    deletes: Counter,
    queries: Counter,
    records: Gauge,
}

impl Metrics {
    fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Self::default();
        context.register("gets", "Number of single-record lookups", metrics.gets.clone());
        context.register("inserts", "Number of records created", metrics.inserts.clone());
        context.register("patches", "Number of record updates", metrics.patches.clone());
        context.register("deletes", "Number of records removed", metrics.deletes.clone());
        context.register("queries", "Number of range scans by name", metrics.queries.clone());
        context.register("records", "Number of stored records", metrics.records.clone());
        metrics
    }
}

type Locks = Arc<Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>>;

/// Exclusive access to one [Key] of a [Memory] store.
pub struct Guard {
    key: Key,
    locks: Locks,
    guard: MutexGuardArc<()>,
}

impl Drop for Guard {
    fn drop(&mut self) {
        // Waiters clone the mutex while holding the map, so a count of two (the map and this
        // guard) means nobody else holds or waits on the key.
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        if Arc::strong_count(MutexGuardArc::source(&self.guard)) == 2 {
            locks.remove(&self.key);
        }
    }
}

#[derive(Default)]
struct Table {
    next: u64,
    records: BTreeMap<Key, (Id, f64)>,
    ids: HashMap<Id, Key>,
}

/// A [Store] that keeps all records in memory.
///
/// Clones share the same records.
#[derive(Clone)]
pub struct Memory {
    table: Arc<Mutex<Table>>,
    locks: Locks,
    metrics: Arc<Metrics>,
}

impl Memory {
    /// Create an empty store, registering its metrics with `context`.
    pub fn new<E: RuntimeMetrics>(context: E) -> Self {
        Self {
            table: Arc::new(Mutex::new(Table::default())),
            locks: Arc::new(Mutex::new(HashMap::new())),
            metrics: Arc::new(Metrics::init(context)),
        }
    }

    /// Number of records currently stored (across all names).
    pub fn len(&self) -> usize {
        self.table.lock().unwrap().records.len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for Memory {
    type Guard = Guard;

    async fn lock(&self, key: &Key) -> Result<Self::Guard, Error> {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks.entry(key.clone()).or_default().clone()
        };
        Ok(Guard {
            key: key.clone(),
            locks: self.locks.clone(),
            guard: lock.lock_arc().await,
        })
    }

    async fn get(&self, key: &Key) -> Result<Option<(Id, ShardRecord)>, Error> {
        self.metrics.gets.inc();
        let table = self.table.lock().unwrap();
        Ok(table
            .records
            .get(key)
            .map(|(id, value)| (*id, ShardRecord::new(key.name.clone(), key.shard, *value))))
    }

    async fn insert(&mut self, record: ShardRecord) -> Result<Id, Error> {
        let key = record.key();
        let mut table = self.table.lock().unwrap();
        if table.records.contains_key(&key) {
            return Err(Error::Duplicate(key));
        }
        let id = Id::new(table.next);
        table.next += 1;
        table.records.insert(key.clone(), (id, record.value));
        table.ids.insert(id, key.clone());
        self.metrics.inserts.inc();
        self.metrics.records.set(table.records.len() as i64);
        trace!(%key, %id, value = record.value, "inserted record");
        Ok(id)
    }

    async fn patch(&mut self, id: Id, value: f64) -> Result<(), Error> {
        let mut table = self.table.lock().unwrap();
        let Some(key) = table.ids.get(&id).cloned() else {
            return Err(Error::NotFound(id));
        };
        let Some(entry) = table.records.get_mut(&key) else {
            return Err(Error::NotFound(id));
        };
        entry.1 = value;
        self.metrics.patches.inc();
        trace!(%key, %id, value, "patched record");
        Ok(())
    }

    async fn delete(&mut self, id: Id) -> Result<(), Error> {
        let mut table = self.table.lock().unwrap();
        let Some(key) = table.ids.remove(&id) else {
            return Err(Error::NotFound(id));
        };
        table.records.remove(&key);
        self.metrics.deletes.inc();
        self.metrics.records.set(table.records.len() as i64);
        trace!(%key, %id, "deleted record");
        Ok(())
    }

    async fn query(&self, name: &str) -> Result<Vec<(Id, ShardRecord)>, Error> {
        self.metrics.queries.inc();
        let start = Key::new(name, 0);
        let end = Key::new(name, u32::MAX);
        let table = self.table.lock().unwrap();
        Ok(table
            .records
            .range(start..=end)
            .map(|(key, (id, value))| (*id, ShardRecord::new(key.name.clone(), key.shard, *value)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Clock, Metrics, Runner, Spawner};
    use futures::{channel::oneshot, FutureExt};
    use std::time::Duration;

    #[test_traced]
    fn test_insert_get_patch() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let mut store = Memory::new(context.with_label("store"));
            let key = Key::new("apples", 3);

            // Missing record
            assert!(store.get(&key).await.unwrap().is_none());

            // Insert
            let id = store
                .insert(ShardRecord::new("apples", 3, 5.0))
                .await
                .unwrap();
            let (found, record) = store.get(&key).await.unwrap().unwrap();
            assert_eq!(found, id);
            assert_eq!(record, ShardRecord::new("apples", 3, 5.0));

            // Patch
            store.patch(id, 8.5).await.unwrap();
            let (_, record) = store.get(&key).await.unwrap().unwrap();
            assert_eq!(record.value, 8.5);

            // Check metrics
            let buffer = context.encode();
            assert!(buffer.contains("store_inserts_total 1"), "{buffer}");
            assert!(buffer.contains("store_patches_total 1"), "{buffer}");
            assert!(buffer.contains("store_gets_total 3"), "{buffer}");
            assert!(buffer.contains("store_records 1"), "{buffer}");
        });
    }

    #[test_traced]
    fn test_duplicate_insert() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let mut store = Memory::new(context.with_label("store"));
            store
                .insert(ShardRecord::new("apples", 0, 1.0))
                .await
                .unwrap();
            let result = store.insert(ShardRecord::new("apples", 0, 2.0)).await;
            assert_eq!(result, Err(Error::Duplicate(Key::new("apples", 0))));

            // Original record untouched
            let (_, record) = store.get(&Key::new("apples", 0)).await.unwrap().unwrap();
            assert_eq!(record.value, 1.0);
            assert_eq!(store.len(), 1);
        });
    }

    #[test_traced]
    fn test_unknown_id() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let mut store = Memory::new(context.with_label("store"));
            let missing = Id::new(42);
            assert_eq!(store.patch(missing, 1.0).await, Err(Error::NotFound(missing)));
            assert_eq!(store.delete(missing).await, Err(Error::NotFound(missing)));
        });
    }

    #[test_traced]
    fn test_query_is_scoped_to_name() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let mut store = Memory::new(context.with_label("store"));

            // Names that share a prefix must not leak into each other's scan
            for (name, shard, value) in [
                ("apple", 0, 1.0),
                ("apples", 2, 2.0),
                ("apples", 0, 3.0),
                ("apples", u32::MAX, 4.0),
                ("applesauce", 1, 5.0),
            ] {
                store
                    .insert(ShardRecord::new(name, shard, value))
                    .await
                    .unwrap();
            }

            let records = store.query("apples").await.unwrap();
            let shards: Vec<_> = records.iter().map(|(_, r)| r.shard).collect();
            assert_eq!(shards, vec![0, 2, u32::MAX]);
            assert!(records.iter().all(|(_, r)| r.name == "apples"));

            // Unknown names scan to nothing
            assert!(store.query("pears").await.unwrap().is_empty());
        });
    }

    #[test_traced]
    fn test_delete() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let mut store = Memory::new(context.with_label("store"));
            let id = store
                .insert(ShardRecord::new("apples", 1, 1.0))
                .await
                .unwrap();
            store.delete(id).await.unwrap();
            assert!(store.get(&Key::new("apples", 1)).await.unwrap().is_none());
            assert!(store.is_empty());

            // The key can be reused and receives a fresh id
            let reused = store
                .insert(ShardRecord::new("apples", 1, 2.0))
                .await
                .unwrap();
            assert_ne!(id, reused);

            let buffer = context.encode();
            assert!(buffer.contains("store_deletes_total 1"), "{buffer}");
        });
    }

    #[test_traced]
    fn test_lock_is_per_key() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let store = Memory::new(context.with_label("store"));
            let held = store.lock(&Key::new("apples", 0)).await.unwrap();

            // A different shard of the same name is not blocked
            let other = store.lock(&Key::new("apples", 1)).now_or_never();
            assert!(other.is_some());

            // The same key waits until the first guard is released
            let (acquired_tx, acquired_rx) = oneshot::channel();
            context.with_label("waiter").spawn({
                let store = store.clone();
                move |_| async move {
                    let _guard = store.lock(&Key::new("apples", 0)).await.unwrap();
                    let _ = acquired_tx.send(());
                }
            });
            context.sleep(Duration::from_millis(10)).await;
            let mut acquired_rx = acquired_rx;
            assert!(acquired_rx.try_recv().unwrap().is_none());

            drop(held);
            acquired_rx.await.unwrap();
        });
    }

    #[test_traced]
    fn test_released_locks_are_dropped() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let mut store = Memory::new(context.with_label("store"));
            let key = Key::new("apples", 0);

            // Lock, write, and release
            let guard = store.lock(&key).await.unwrap();
            let id = store
                .insert(ShardRecord::new("apples", 0, 1.0))
                .await
                .unwrap();
            assert_eq!(store.locks.lock().unwrap().len(), 1);
            drop(guard);
            assert!(store.locks.lock().unwrap().is_empty());

            // A key is kept while someone waits on it
            let held = store.lock(&key).await.unwrap();
            let (acquired_tx, acquired_rx) = oneshot::channel();
            context.with_label("waiter").spawn({
                let mut store = store.clone();
                let key = key.clone();
                move |_| async move {
                    let _guard = store.lock(&key).await.unwrap();
                    store.delete(id).await.unwrap();
                    let _ = acquired_tx.send(());
                }
            });
            context.sleep(Duration::from_millis(10)).await;
            drop(held);
            assert_eq!(store.locks.lock().unwrap().len(), 1);

            // Deleted keys leave nothing behind once released
            acquired_rx.await.unwrap();
            assert!(store.is_empty());
            assert!(store.locks.lock().unwrap().is_empty());
        });
    }
}
