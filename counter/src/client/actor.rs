use super::{Client, Message};
use commonware_runtime::{Handle, Metrics, Spawner};
use futures::{channel::mpsc, StreamExt};
use rand::RngCore;
use tally_store::Store;
use tracing::{debug, trace};

/// Serves [Message]s sent through a [Mailbox](super::Mailbox).
///
/// Each request runs on its own task, so a slow write never delays other requests.
pub struct Actor<C: Spawner + Metrics, E: RngCore + Metrics, S: Store> {
    context: C,
    client: Client<E, S>,
    mailbox: mpsc::Receiver<Message>,
}

impl<C: Spawner + Metrics, E: RngCore + Metrics, S: Store> Actor<C, E, S> {
    pub(super) fn new(context: C, client: Client<E, S>, mailbox: mpsc::Receiver<Message>) -> Self {
        Self {
            context,
            client,
            mailbox,
        }
    }

    /// Start serving requests.
    ///
    /// The returned [Handle] resolves once every [Mailbox](super::Mailbox) has been dropped.
    pub fn start(self) -> Handle<()> {
        let context = self.context.clone();
        context.spawn(|_| self.run())
    }

    async fn run(mut self) {
        while let Some(message) = self.mailbox.next().await {
            match message {
                Message::Add { name, responder } => {
                    trace!(%name, "mailbox: add");
                    let mut client = self.client.clone();
                    self.context.with_label("add").spawn(move |_| async move {
                        let result = client.add(&name, 1.0).await;
                        let _ = responder.send(result);
                    });
                }
                Message::Count { name, responder } => {
                    trace!(%name, "mailbox: count");
                    let client = self.client.clone();
                    self.context.with_label("count").spawn(move |_| async move {
                        let result = client.count(&name).await;
                        let _ = responder.send(result);
                    });
                }
            }
        }
        debug!("mailbox closed");
    }
}
