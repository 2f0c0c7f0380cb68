//! Track one counter from the caller's side with optimistic increments.
//!
//! A [Binding] pairs the read and write [Operations] of a counter deployment (usually a
//! [Mailbox](crate::Mailbox)) with a client-local [Cache]. Reading the binding never waits on the
//! server: it returns the cached value, or `None` until the first read completes.
//!
//! # Optimistic Updates
//!
//! [Binding::add] bumps the cached value by one before the write reaches the server (only if a
//! value is already cached). If the write fails, the bump is rolled back and the error returned. If
//! it succeeds, the bump stays visible until a server read that began after the write landed
//! replaces it. Once no writes are in flight (whether the last one succeeded or failed), the
//! binding issues that read itself.

use crate::{Error, Operations};
use commonware_runtime::{Clock, Handle, Spawner};
use std::{
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::{debug, warn};

mod cache;
pub use cache::{Cache, Operation, Query, State, Ticket};

/// Client-side view of the counter `name`.
///
/// Clones share the same cache.
#[derive(Clone)]
pub struct Binding<O: Operations> {
    operations: O,
    query: Query,
    cache: Arc<Mutex<Cache>>,
}

impl<O: Operations> Binding<O> {
    /// Bind `operations` to the counter `name`.
    pub fn new(operations: O, name: impl Into<String>) -> Self {
        Self {
            operations,
            query: Query::count(name),
            cache: Arc::new(Mutex::new(Cache::default())),
        }
    }

    /// Name of the bound counter.
    pub fn name(&self) -> &str {
        &self.query.name
    }

    /// Latest known value, or `None` if no value has been read yet.
    pub fn count(&self) -> Option<f64> {
        self.cache.lock().unwrap().value(&self.query)
    }

    /// Returns true until the first read completes.
    pub fn is_loading(&self) -> bool {
        self.state() == State::Unloaded
    }

    /// Current cache state of the bound counter.
    pub fn state(&self) -> State {
        self.cache.lock().unwrap().state(&self.query)
    }

    /// Read the counter from the server and cache the result.
    pub async fn refresh(&mut self) -> Result<f64, Error> {
        let ticket = self.cache.lock().unwrap().begin();
        let value = self.operations.count(self.query.name.clone()).await?;
        self.cache.lock().unwrap().confirm(&self.query, value, ticket);
        Ok(value)
    }

    /// Add one to the counter.
    ///
    /// The optimistic update is applied before this returns; the returned future performs the
    /// write.
    pub fn add(&self) -> impl Future<Output = Result<(), Error>> + Send + 'static {
        let applied = self.cache.lock().unwrap().apply(&self.query, 1.0);
        let mut binding = self.clone();
        async move {
            let result = binding
                .operations
                .add(binding.query.name.clone())
                .await;
            let idle = match &result {
                Ok(()) if applied => binding.cache.lock().unwrap().settle(&binding.query, 1.0),
                Ok(()) => true,
                Err(err) => {
                    debug!(name = binding.name(), applied, ?err, "add failed");
                    applied && binding.cache.lock().unwrap().rollback(&binding.query, 1.0)
                }
            };
            if idle {
                if let Err(err) = binding.refresh().await {
                    warn!(name = binding.name(), ?err, "refresh after add failed");
                }
            }
            result
        }
    }

    /// Refresh the cache every `interval` on a task spawned from `context`.
    pub fn subscribe<E: Spawner + Clock>(&self, context: E, interval: Duration) -> Handle<()> {
        let mut binding = self.clone();
        context.spawn(move |context| async move {
            loop {
                if let Err(err) = binding.refresh().await {
                    warn!(name = binding.name(), ?err, "refresh failed");
                }
                context.sleep(interval).await;
            }
        })
    }
}
