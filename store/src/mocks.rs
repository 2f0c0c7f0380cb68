//! Stores that misbehave on demand.

use crate::{Error, Id, Key, ShardRecord, Store};
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

/// A [Store] method that [Faulty] can be told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Lock,
    Get,
    Insert,
    Patch,
    Delete,
    Query,
}

impl Method {
    const ALL: [Method; 6] = [
        Method::Lock,
        Method::Get,
        Method::Insert,
        Method::Patch,
        Method::Delete,
        Method::Query,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

/// Wraps a [Store] and fails calls with [Error::Unavailable] while their switch is on.
///
/// Clones share the same switches.
#[derive(Clone)]
pub struct Faulty<S: Store> {
    inner: S,
    failing: Arc<AtomicU8>,
}

impl<S: Store> Faulty<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicU8::new(0)),
        }
    }

    /// Start or stop failing every call.
    pub fn fail(&self, failing: bool) {
        for method in Method::ALL {
            self.fail_method(method, failing);
        }
    }

    /// Start or stop failing calls to `method`.
    pub fn fail_method(&self, method: Method, failing: bool) {
        if failing {
            self.failing.fetch_or(method.bit(), Ordering::SeqCst);
        } else {
            self.failing.fetch_and(!method.bit(), Ordering::SeqCst);
        }
    }

    /// Access the wrapped store (bypassing the switches).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, method: Method) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) & method.bit() != 0 {
            return Err(Error::Unavailable(format!("injected fault: {method:?}")));
        }
        Ok(())
    }
}

impl<S: Store> Store for Faulty<S> {
    type Guard = S::Guard;

    async fn lock(&self, key: &Key) -> Result<Self::Guard, Error> {
        self.check(Method::Lock)?;
        self.inner.lock(key).await
    }

    async fn get(&self, key: &Key) -> Result<Option<(Id, ShardRecord)>, Error> {
        self.check(Method::Get)?;
        self.inner.get(key).await
    }

    async fn insert(&mut self, record: ShardRecord) -> Result<Id, Error> {
        self.check(Method::Insert)?;
        self.inner.insert(record).await
    }

    async fn patch(&mut self, id: Id, value: f64) -> Result<(), Error> {
        self.check(Method::Patch)?;
        self.inner.patch(id, value).await
    }

    async fn delete(&mut self, id: Id) -> Result<(), Error> {
        self.check(Method::Delete)?;
        self.inner.delete(id).await
    }

    async fn query(&self, name: &str) -> Result<Vec<(Id, ShardRecord)>, Error> {
        self.check(Method::Query)?;
        self.inner.query(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Metrics, Runner};

    #[test_traced]
    fn test_switch() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let mut store = Faulty::new(Memory::new(context.with_label("store")));
            store
                .insert(ShardRecord::new("beans", 0, 1.0))
                .await
                .unwrap();

            // Every call fails while the switch is on
            store.fail(true);
            assert!(matches!(
                store.query("beans").await,
                Err(Error::Unavailable(_))
            ));
            assert!(matches!(
                store.insert(ShardRecord::new("beans", 1, 1.0)).await,
                Err(Error::Unavailable(_))
            ));
            assert!(matches!(
                store.lock(&Key::new("beans", 0)).await,
                Err(Error::Unavailable(_))
            ));

            // Nothing was written behind the switch
            assert_eq!(store.inner().len(), 1);

            // Calls succeed again once it is off
            store.fail(false);
            assert_eq!(store.query("beans").await.unwrap().len(), 1);
        });
    }

    #[test_traced]
    fn test_single_method() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let mut store = Faulty::new(Memory::new(context.with_label("store")));
            let id = store
                .insert(ShardRecord::new("beans", 0, 1.0))
                .await
                .unwrap();

            // Only deletes fail
            store.fail_method(Method::Delete, true);
            assert!(matches!(store.delete(id).await, Err(Error::Unavailable(_))));
            store.patch(id, 2.0).await.unwrap();
            assert_eq!(store.query("beans").await.unwrap().len(), 1);

            // Turning one method off leaves the others alone
            store.fail_method(Method::Query, true);
            store.fail_method(Method::Delete, false);
            assert!(store.query("beans").await.is_err());
            store.delete(id).await.unwrap();
            assert!(store.inner().is_empty());
        });
    }
}
