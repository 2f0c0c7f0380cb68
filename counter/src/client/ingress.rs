use crate::{Error, Operations};
use futures::{
    channel::{mpsc, oneshot},
    SinkExt,
};

/// Messages that can be sent to an [Actor](super::Actor).
pub enum Message {
    /// Add one to a counter.
    Add {
        name: String,
        responder: oneshot::Sender<Result<(), Error>>,
    },

    /// Read a counter.
    Count {
        name: String,
        responder: oneshot::Sender<Result<f64, Error>>,
    },
}

/// Ingress mailbox for an [Actor](super::Actor).
#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub(super) fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }
}

impl Operations for Mailbox {
    async fn add(&mut self, name: String) -> Result<(), Error> {
        let (responder, receiver) = oneshot::channel();
        self.sender
            .send(Message::Add { name, responder })
            .await
            .map_err(|_| Error::Closed)?;
        receiver.await.map_err(|_| Error::Canceled)?
    }

    async fn count(&mut self, name: String) -> Result<f64, Error> {
        let (responder, receiver) = oneshot::channel();
        self.sender
            .send(Message::Count { name, responder })
            .await
            .map_err(|_| Error::Closed)?;
        receiver.await.map_err(|_| Error::Canceled)?
    }
}
