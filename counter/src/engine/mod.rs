//! Select shards, apply deltas, and sum shard records.

use crate::Error;
use commonware_runtime::Metrics as RuntimeMetrics;
use rand::{Rng, RngCore};
use tally_store::{Key, ShardRecord, Store};
use tracing::{debug, trace, warn};

mod metrics;

/// Server side of a sharded counter.
///
/// The [Engine] holds no counter state of its own: every call is answered from the store. Clones
/// share the same store and metrics.
#[derive(Clone)]
pub struct Engine<E: RngCore + RuntimeMetrics, S: Store> {
    context: E,
    store: S,

    metrics: metrics::Metrics,
}

impl<E: RngCore + RuntimeMetrics, S: Store> Engine<E, S> {
    /// Create a new engine over `store`, drawing shard indices from `context`.
    pub fn new(context: E, store: S) -> Self {
        let metrics = metrics::Metrics::init(&context);
        Self {
            context,
            store,
            metrics,
        }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn validate(&self, name: &str, shards: u32) -> Result<(), Error> {
        if name.is_empty() {
            self.metrics.rejected.inc();
            return Err(Error::InvalidArgument("name must not be empty"));
        }
        if shards == 0 {
            self.metrics.rejected.inc();
            return Err(Error::InvalidArgument("shard count must be at least 1"));
        }
        Ok(())
    }

    /// Add `delta` to the counter `name`, spread across `shards` records.
    ///
    /// Exactly one record is created or updated: the one at a shard index drawn uniformly from
    /// `[0, shards)`. A zero `delta` still performs the write.
    pub async fn increment(&mut self, name: &str, delta: f64, shards: u32) -> Result<(), Error> {
        self.validate(name, shards)?;
        if !delta.is_finite() {
            self.metrics.rejected.inc();
            return Err(Error::InvalidArgument("delta must be finite"));
        }

        let shard = self.context.gen_range(0..shards);
        let key = Key::new(name, shard);
        if let Err(err) = self.apply(&key, delta).await {
            warn!(%key, ?err, "increment failed");
            return Err(err.into());
        }
        self.metrics.increments.inc();
        Ok(())
    }

    async fn apply(&mut self, key: &Key, delta: f64) -> Result<(), tally_store::Error> {
        let _guard = self.store.lock(key).await?;
        self.write(key, delta).await
    }

    /// Add `delta` to the record at `key`, creating it if absent. The caller must hold the guard
    /// of `key`.
    async fn write(&mut self, key: &Key, delta: f64) -> Result<(), tally_store::Error> {
        match self.store.get(key).await? {
            Some((id, record)) => {
                let value = record.value + delta;
                self.store.patch(id, value).await?;
                trace!(%key, delta, value, "updated shard");
            }
            None => {
                let record = ShardRecord::new(key.name.clone(), key.shard, delta);
                self.store.insert(record).await?;
                self.metrics.created.inc();
                debug!(%key, delta, "created shard");
            }
        }
        Ok(())
    }

    /// Sum every record stored for `name`.
    ///
    /// Returns `0` if nothing has been stored for `name`.
    pub async fn total(&self, name: &str) -> Result<f64, Error> {
        self.validate(name, 1)?;
        let records = match self.store.query(name).await {
            Ok(records) => records,
            Err(err) => {
                warn!(name, ?err, "total failed");
                return Err(err.into());
            }
        };
        self.metrics.totals.inc();
        Ok(records.iter().map(|(_, record)| record.value).sum())
    }

    /// Return the records backing `name`, ordered by shard.
    pub async fn shards(&self, name: &str) -> Result<Vec<ShardRecord>, Error> {
        self.validate(name, 1)?;
        let records = match self.store.query(name).await {
            Ok(records) => records,
            Err(err) => {
                warn!(name, ?err, "shard scan failed");
                return Err(err.into());
            }
        };
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }

    /// Fold every record of `name` with a shard index at or above `shards` into shard
    /// `index % shards`, deleting the folded record. Returns the number of folded records.
    ///
    /// The total of `name` is unchanged by a merge, even one that fails part way. Each fold zeroes
    /// the source before crediting the target, so a concurrent [Engine::total] may briefly miss a
    /// folded value but never counts it twice. A fold that fails to delete its source leaves a
    /// zero-valued record behind for the next merge to remove.
    pub async fn merge(&mut self, name: &str, shards: u32) -> Result<usize, Error> {
        self.validate(name, shards)?;
        let records = match self.store.query(name).await {
            Ok(records) => records,
            Err(err) => {
                warn!(name, ?err, "merge scan failed");
                return Err(err.into());
            }
        };
        let mut folded = 0;
        for (_, record) in records {
            if record.shard < shards {
                continue;
            }
            let source = record.key();
            let target = Key::new(name, record.shard % shards);
            match self.fold(&source, &target).await {
                Ok(true) => folded += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(from = %source, to = %target, ?err, "fold failed");
                    return Err(err.into());
                }
            }
        }
        Ok(folded)
    }

    /// Move the value of `source` into `target` and delete `source`. Returns false if `source` no
    /// longer exists.
    async fn fold(&mut self, source: &Key, target: &Key) -> Result<bool, tally_store::Error> {
        // Target keys always sort before their source, so merges never lock in opposite orders
        let _target_guard = self.store.lock(target).await?;
        let _source_guard = self.store.lock(source).await?;

        // The source may have changed (or vanished) since the scan
        let Some((source_id, source_record)) = self.store.get(source).await? else {
            return Ok(false);
        };
        let value = source_record.value;
        self.store.patch(source_id, 0.0).await?;
        if let Err(err) = self.write(target, value).await {
            if let Err(restore) = self.store.patch(source_id, value).await {
                warn!(%source, value, ?restore, "failed to restore folded shard");
            }
            return Err(err);
        }
        self.store.delete(source_id).await?;
        self.metrics.merges.inc();
        debug!(from = %source, to = %target, value, "folded shard");
        Ok(true)
    }
}
