//! Count with write-sharded records, optimistic bindings, and a mailbox API.
//!
//! # Overview
//!
//! A logical counter is split across up to `shards` records in a [tally_store::Store]. Each
//! increment picks one shard uniformly at random and updates only that record, so concurrent
//! increments to the same counter rarely touch the same record. Reading a counter sums every
//! record stored for its name.
//!
//! The crate is layered:
//! - [Engine]: validates arguments, selects shards, and performs the read-modify-write and
//!   fan-in against the store.
//! - [Config]: resolves the shard count to use for a name (per-name overrides with a default).
//! - [Client]: binds an [Engine] to a [Config] and exports the [Operations] of that binding
//!   through a [Mailbox] served by an [Actor].
//! - [Binding]: caches the count of one name on the caller's side and applies optimistic
//!   increments while writes are in flight.
//!
//! # Choosing a Shard Count
//!
//! More shards lower the chance that two concurrent increments collide on one record but increase
//! the number of records a read must sum. Shard counts are chosen up front. Lowering the shard
//! count of a name that already has higher-indexed records leaves those records in place: they
//! keep counting toward the total but no longer receive writes. [Engine::merge] folds them back
//! into range.
//!
//! # Example
//!
//! ```rust
//! use commonware_runtime::{deterministic, Metrics, Runner};
//! use tally_counter::{Client, Config, Engine};
//! use tally_store::memory::Memory;
//!
//! let executor = deterministic::Runner::default();
//! executor.start(|context| async move {
//!     let store = Memory::new(context.with_label("store"));
//!     let engine = Engine::new(context.with_label("engine"), store);
//!     let mut client = Client::new(engine, Config::default().with_shards("visits", 8));
//!
//!     client.add("visits", 5.0).await.unwrap();
//!     client.add("visits", 3.0).await.unwrap();
//!     assert_eq!(client.count("visits").await.unwrap(), 8.0);
//! });
//! ```

use std::future::Future;
use thiserror::Error;

pub mod binding;
pub use binding::Binding;
mod client;
pub use client::{Actor, Client, Mailbox, Message};
mod config;
pub use config::{resolve_shard_count, Config, DEFAULT_SHARDS};
mod engine;
pub use engine::Engine;

/// Errors that can occur when counting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] tally_store::Error),
    #[error("closed")]
    Closed,
    #[error("canceled")]
    Canceled,
}

/// Remotely invocable counter operations.
pub trait Operations: Clone + Send + Sync + 'static {
    /// Add one to the counter `name`.
    fn add(&mut self, name: String) -> impl Future<Output = Result<(), Error>> + Send;

    /// Read the current value of the counter `name`.
    fn count(&mut self, name: String) -> impl Future<Output = Result<f64, Error>> + Send;
}
