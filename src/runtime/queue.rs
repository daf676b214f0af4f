//! Single-slot command queue
//!
//! Acquisition and dispatch meet here. The channel holds one pending
//! utterance; a producer with a full slot waits until the dispatcher takes
//! it, so plans never overlap.

use crate::runtime::acquisition::Utterance;
use tokio::sync::mpsc;

/// Pending utterances the dispatcher has not started yet
const QUEUE_DEPTH: usize = 1;

/// Producer half, held by acquisition
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Utterance>,
}

/// Consumer half, held by the dispatch loop
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::Receiver<Utterance>,
}

/// Dispatcher side has gone away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueClosed(pub Utterance);

pub fn command_queue() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    (CommandSender { tx }, CommandReceiver { rx })
}

impl CommandSender {
    /// Queue an utterance, waiting while the slot is occupied
    pub async fn submit(&self, utterance: Utterance) -> Result<(), QueueClosed> {
        self.tx.send(utterance).await.map_err(|e| QueueClosed(e.0))
    }
}

impl CommandReceiver {
    /// Next utterance, or `None` once every sender is dropped
    pub async fn next(&mut self) -> Option<Utterance> {
        self.rx.recv().await
    }
}
