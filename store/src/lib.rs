//! Persist and range-scan shard records for write-sharded counters.
//!
//! A logical counter is backed by any number of [ShardRecord]s, each identified by the pair
//! `(name, shard)` ([Key]). This crate defines the boundary any record store must provide
//! ([Store]) and a reference in-memory implementation ([memory::Memory]).
//!
//! # Atomicity
//!
//! Writers perform a read-modify-write against a single record: they [Store::lock] the record's
//! [Key], [Store::get] it, and then either [Store::patch] or [Store::insert] it. The guard returned
//! by [Store::lock] is what makes that sequence atomic. Guards for different keys never block each
//! other, so writers landing on different shards of the same counter proceed independently.
//!
//! Readers never take a guard. [Store::query] returns a consistent cut of every record stored for
//! a name, ordered by shard.
//!
//! # Example
//!
//! ```rust
//! use commonware_runtime::{deterministic, Runner, Metrics};
//! use tally_store::{memory::Memory, Key, ShardRecord, Store};
//!
//! let executor = deterministic::Runner::default();
//! executor.start(|context| async move {
//!     let mut store = Memory::new(context.with_label("store"));
//!
//!     // Create a record under its guard
//!     let key = Key::new("apples", 0);
//!     let _guard = store.lock(&key).await.unwrap();
//!     assert!(store.get(&key).await.unwrap().is_none());
//!     store.insert(ShardRecord::new("apples", 0, 5.0)).await.unwrap();
//!
//!     // Scan every record for the name
//!     let records = store.query("apples").await.unwrap();
//!     assert_eq!(records.len(), 1);
//! });
//! ```

use std::{fmt, future::Future};
use thiserror::Error;

pub mod memory;
pub mod mocks;

/// Errors that can occur when interacting with a [Store].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate record: {0}")]
    Duplicate(Key),
    #[error("record not found: {0}")]
    NotFound(Id),
}

/// Natural key of a [ShardRecord].
///
/// Keys order by name and then by shard, so all records of one counter are contiguous.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub name: String,
    pub shard: u32,
}

impl Key {
    pub fn new(name: impl Into<String>, shard: u32) -> Self {
        Self {
            name: name.into(),
            shard,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.shard)
    }
}

/// Identifier assigned by a [Store] when a record is inserted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u64);

impl Id {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One physical slice of a logical counter.
#[derive(Clone, Debug, PartialEq)]
pub struct ShardRecord {
    /// Name of the logical counter.
    pub name: String,

    /// Index of the shard within the counter.
    pub shard: u32,

    /// Accumulated value of the shard.
    pub value: f64,
}

impl ShardRecord {
    pub fn new(name: impl Into<String>, shard: u32, value: f64) -> Self {
        Self {
            name: name.into(),
            shard,
            value,
        }
    }

    /// Returns the natural key of the record.
    pub fn key(&self) -> Key {
        Key::new(self.name.clone(), self.shard)
    }
}

/// A key-indexed table of [ShardRecord]s.
///
/// Implementations must make the sequence `lock -> get -> insert | patch` atomic for a single
/// [Key] and must return a consistent cut from [Store::query].
pub trait Store: Clone + Send + Sync + 'static {
    /// Exclusive access to one [Key], released on drop.
    type Guard: Send;

    /// Acquire exclusive access to the record at `key` (whether or not it exists yet).
    fn lock(&self, key: &Key) -> impl Future<Output = Result<Self::Guard, Error>> + Send;

    /// Get the record stored at `key`.
    fn get(&self, key: &Key) -> impl Future<Output = Result<Option<(Id, ShardRecord)>, Error>> + Send;

    /// Insert a new record, returning its [Id].
    ///
    /// Fails with [Error::Duplicate] if a record already exists at the record's [Key].
    fn insert(&mut self, record: ShardRecord) -> impl Future<Output = Result<Id, Error>> + Send;

    /// Replace the value of the record with the given [Id].
    fn patch(&mut self, id: Id, value: f64) -> impl Future<Output = Result<(), Error>> + Send;

    /// Remove the record with the given [Id].
    fn delete(&mut self, id: Id) -> impl Future<Output = Result<(), Error>> + Send;

    /// Return every record stored for `name`, ordered by shard.
    fn query(&self, name: &str) -> impl Future<Output = Result<Vec<(Id, ShardRecord)>, Error>> + Send;
}
