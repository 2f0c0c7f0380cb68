//! Bind an [Engine] to a [Config] and export it.
//!
//! The [Client] is the thick client of a counter deployment: it resolves the shard count for a
//! name from its [Config] and forwards to the [Engine]. Calling [Client::api] exports the same
//! binding as a [Mailbox] (implementing [crate::Operations]) served by an [Actor], so the
//! operations can be handed to remote callers such as a [crate::Binding].
//!
//! Two clients with different configurations over the same store share every record: the
//! configuration only decides where future increments land.

use crate::{Config, Engine, Error};
use commonware_runtime::{Metrics, Spawner};
use futures::channel::mpsc;
use rand::RngCore;
use tally_store::Store;
use tracing::debug;

mod actor;
pub use actor::Actor;
mod ingress;
pub use ingress::{Mailbox, Message};

/// Thick client over an [Engine].
#[derive(Clone)]
pub struct Client<E: RngCore + Metrics, S: Store> {
    engine: Engine<E, S>,
    config: Config,
}

impl<E: RngCore + Metrics, S: Store> Client<E, S> {
    /// Bind `engine` to `config`.
    pub fn new(engine: Engine<E, S>, config: Config) -> Self {
        Self { engine, config }
    }

    /// The configuration of this client.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The engine this client forwards to.
    pub fn engine(&self) -> &Engine<E, S> {
        &self.engine
    }

    /// Add `delta` to the counter `name` using the configured shard count.
    pub async fn add(&mut self, name: &str, delta: f64) -> Result<(), Error> {
        let shards = self.config.shards_for(name);
        debug!(name, delta, shards, "add");
        self.engine.increment(name, delta, shards).await
    }

    /// Read the counter `name`.
    pub async fn count(&self, name: &str) -> Result<f64, Error> {
        self.engine.total(name).await
    }

    /// Export this client's operations.
    ///
    /// Returns an [Actor], which serves requests on tasks spawned from `context` once started,
    /// and the [Mailbox] used to reach it.
    pub fn api<C: Spawner + Metrics>(
        &self,
        context: C,
        mailbox_size: usize,
    ) -> (Actor<C, E, S>, Mailbox) {
        let (sender, receiver) = mpsc::channel(mailbox_size);
        (
            Actor::new(context, self.clone(), receiver),
            Mailbox::new(sender),
        )
    }
}
