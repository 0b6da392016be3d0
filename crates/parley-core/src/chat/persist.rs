//! Per-session persistence queue.
//!
//! Every settled exchange enqueues one write. A single worker task drains
//! the queue in FIFO order and owns the create-vs-update decision, so the
//! id assigned by the first `create` is always known before the next job
//! runs. Confirmed record metadata is published on a watch channel for the
//! controller to reconcile into its store.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::chat::{ChatRecord, OwnerId, RecordMeta, Turn};
use parley_types::error::ChatError;

use super::repository::ChatHistoryRepository;

struct PersistJob {
    owner: OwnerId,
    title: String,
    turns: Vec<Turn>,
    reply: oneshot::Sender<Result<ChatRecord, ChatError>>,
}

/// Handle to one queued write.
///
/// Awaiting it is optional; the write proceeds either way.
#[derive(Debug)]
pub struct PersistHandle {
    rx: oneshot::Receiver<Result<ChatRecord, ChatError>>,
}

impl PersistHandle {
    /// Wait for the write to be confirmed by the history store.
    pub async fn wait(self) -> Result<ChatRecord, ChatError> {
        self.rx.await.unwrap_or_else(|_| {
            Err(ChatError::Persistence(
                "persistence worker stopped before confirming the write".to_string(),
            ))
        })
    }

    /// Non-blocking check; `None` while the write is still pending.
    pub fn try_result(&mut self) -> Option<Result<ChatRecord, ChatError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ChatError::Persistence(
                "persistence worker stopped before confirming the write".to_string(),
            ))),
        }
    }
}

/// FIFO write queue bound to one conversation.
///
/// Dropping the queue closes it; jobs already queued still run to completion.
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<PersistJob>,
    confirmed: watch::Receiver<Option<RecordMeta>>,
}

impl PersistQueue {
    /// Spawn the worker. `remote_id` is the record id when resuming a
    /// conversation that already exists in the store.
    pub fn spawn<R>(repo: Arc<R>, remote_id: Option<Uuid>) -> Self
    where
        R: ChatHistoryRepository + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (confirmed_tx, confirmed) = watch::channel(None);
        tokio::spawn(run_worker(repo, rx, remote_id, confirmed_tx));
        Self { tx, confirmed }
    }

    /// Queue a snapshot of the conversation for writing.
    pub fn submit(&self, owner: OwnerId, title: String, turns: Vec<Turn>) -> PersistHandle {
        let (reply, rx) = oneshot::channel();
        let job = PersistJob {
            owner,
            title,
            turns,
            reply,
        };
        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            let _ = job.reply.send(Err(ChatError::Persistence(
                "persistence worker is not running".to_string(),
            )));
        }
        PersistHandle { rx }
    }

    /// Latest metadata confirmed by the history store, if any write succeeded.
    pub fn confirmed(&self) -> Option<RecordMeta> {
        *self.confirmed.borrow()
    }
}

async fn run_worker<R>(
    repo: Arc<R>,
    mut rx: mpsc::UnboundedReceiver<PersistJob>,
    mut remote_id: Option<Uuid>,
    confirmed: watch::Sender<Option<RecordMeta>>,
) where
    R: ChatHistoryRepository + 'static,
{
    while let Some(job) = rx.recv().await {
        let result = match remote_id {
            None => repo.create(&job.owner, &job.title, &job.turns).await,
            Some(id) => repo.update(&id, &job.turns).await,
        };

        let result = match result {
            Ok(record) => {
                if remote_id.is_none() {
                    info!(chat_id = %record.id, title = %record.title, "chat created");
                } else {
                    debug!(chat_id = %record.id, turns = record.messages.len(), "chat updated");
                }
                remote_id = Some(record.id);
                confirmed.send_replace(Some(record.meta()));
                Ok(record)
            }
            Err(e) => {
                warn!(chat_id = ?remote_id, error = %e, "failed to persist chat");
                Err(ChatError::from(e))
            }
        };

        // The caller may have stopped listening; the write already happened.
        let _ = job.reply.send(result);
    }
    debug!(chat_id = ?remote_id, "persistence queue closed");
}
