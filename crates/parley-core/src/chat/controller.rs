//! SessionController -- drives one conversation through its exchanges.
//!
//! State machine:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Settled -> Sending -> ...
//!   ^________________ reset() from any state ______|
//! ```
//!
//! Each `send` appends the user turn, streams the assistant reply into the
//! store fragment by fragment, and on settling queues exactly one write to
//! the history store: `create` for a new conversation, `update` afterwards.
//! Writes do not block the next exchange.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::chat::{ChatRecord, CompletionDelta, ControllerState, OwnerId, Turn};
use parley_types::error::ChatError;
use parley_types::llm::LlmError;

use super::persist::{PersistHandle, PersistQueue};
use super::repository::ChatHistoryRepository;
use super::store::SessionStore;
use super::title::UNTITLED;
use crate::llm::completion::CompletionClient;

/// Default per-request deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// Result of one settled exchange.
#[derive(Debug)]
pub struct ExchangeOutcome {
    /// The final assistant turn as stored.
    pub assistant: Turn,
    /// Terminal error recorded on the turn, if the stream did not finish cleanly.
    pub error: Option<ChatError>,
    /// The queued history write.
    pub persist: PersistHandle,
}

/// Orchestrates the session store, completion client, and history store.
///
/// Both collaborators are injected. The controller is the only writer to
/// its store; `&mut self` on every mutating method keeps it that way.
pub struct SessionController<C, R> {
    client: Arc<C>,
    repo: Arc<R>,
    store: SessionStore,
    state: ControllerState,
    deadline: Duration,
    cancel: CancellationToken,
    persistence: Option<PersistQueue>,
}

impl<C, R> SessionController<C, R>
where
    C: CompletionClient,
    R: ChatHistoryRepository + 'static,
{
    pub fn new(client: Arc<C>, repo: Arc<R>, owner: Option<OwnerId>) -> Self {
        Self {
            client,
            repo,
            store: SessionStore::new(owner),
            state: ControllerState::Idle,
            deadline: DEFAULT_DEADLINE,
            cancel: CancellationToken::new(),
            persistence: None,
        }
    }

    /// Override the per-request deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Remote id of the conversation, including writes confirmed since the
    /// last exchange.
    pub fn session_id(&self) -> Option<Uuid> {
        self.persistence
            .as_ref()
            .and_then(PersistQueue::confirmed)
            .map(|meta| meta.id)
            .or(self.store.id())
    }

    /// Token that aborts the current (or next) stream when cancelled.
    ///
    /// A token cancelled outside an exchange is discarded when the next one
    /// starts, so fetch it right before calling [`send`](Self::send).
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_owner(&mut self, owner: Option<OwnerId>) {
        self.store.set_owner(owner);
    }

    /// Pull confirmed remote id and timestamps into the store.
    pub fn reconcile(&mut self) {
        if let Some(meta) = self.persistence.as_ref().and_then(PersistQueue::confirmed) {
            self.store.reconcile(meta);
        }
    }

    /// Start a new conversation.
    ///
    /// Cancels any in-flight stream and detaches from the previous
    /// conversation's write queue; writes already queued still complete.
    /// The previously persisted record is not deleted.
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.persistence = None;
        self.store.reset();
        self.state = ControllerState::Idle;
    }

    /// Reopen a persisted conversation; further exchanges update it.
    pub fn resume(&mut self, record: ChatRecord) {
        self.reset();
        info!(chat_id = %record.id, turns = record.messages.len(), "resuming chat");
        self.store.resume(record);
    }

    /// Run one exchange.
    ///
    /// `on_update` is called after every fragment with the delta and the
    /// store as it now reads. Stream failures do not fail the call: they are
    /// recorded on the assistant turn and returned in
    /// [`ExchangeOutcome::error`]. Only precondition failures return `Err`,
    /// and none of them issue a network call.
    pub async fn send<F>(&mut self, content: &str, mut on_update: F) -> Result<ExchangeOutcome, ChatError>
    where
        F: FnMut(&CompletionDelta, &SessionStore),
    {
        let owner = self.store.owner().cloned().ok_or(ChatError::AuthRequired)?;
        if self.state.is_busy() {
            return Err(ChatError::ExchangeInFlight);
        }
        if content.trim().is_empty() {
            return Err(ChatError::RequestMalformed("message is empty".to_string()));
        }

        self.reconcile();
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        let cancel = self.cancel.clone();

        self.state = ControllerState::Sending;
        self.store.append(Turn::user(content));

        let mut stream = self.client.stream_reply(self.store.turns());
        // A deadline past the clock's range means the exchange is unbounded.
        let deadline = Instant::now().checked_add(self.deadline);
        let mut assistant = Turn::assistant("");
        let mut error = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    error = Some(ChatError::StreamAborted("cancelled".to_string()));
                    break;
                }
                next = async {
                    match deadline {
                        Some(at) => tokio::time::timeout_at(at, stream.next()).await,
                        None => Ok(stream.next().await),
                    }
                } => next,
            };

            match next {
                Err(_elapsed) => {
                    error = Some(LlmError::Timeout(self.deadline.as_secs()).into());
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    error = Some(e.into());
                    break;
                }
                Ok(Some(Ok(delta))) => {
                    if let Some(text) = &delta.content_delta {
                        assistant.content.push_str(text);
                    }
                    if let Some(text) = &delta.reasoning_delta {
                        assistant
                            .reasoning
                            .get_or_insert_with(String::new)
                            .push_str(text);
                    }
                    self.state = ControllerState::Streaming;
                    self.store.replace_last(assistant.clone());
                    on_update(&delta, &self.store);
                }
            }
        }
        drop(stream);
        if cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        if let Some(e) = &error {
            assistant.incomplete = true;
            warn!(
                chat_id = ?self.store.id(),
                partial_chars = assistant.content.chars().count(),
                error = %e,
                "assistant reply ended early"
            );
        }
        self.store.replace_last(assistant.clone());
        self.state = ControllerState::Settled;

        let persist = self.queue_persist(owner);
        Ok(ExchangeOutcome {
            assistant,
            error,
            persist,
        })
    }

    fn queue_persist(&mut self, owner: OwnerId) -> PersistHandle {
        let title = self.store.title().unwrap_or(UNTITLED).to_string();
        let queue = self
            .persistence
            .get_or_insert_with(|| PersistQueue::spawn(Arc::clone(&self.repo), self.store.id()));
        queue.submit(owner, title, self.store.turns().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures_util::stream;
    use parley_types::chat::MessageRole;

    use crate::chat::repository::fake::{Call, FakeRepository};
    use crate::llm::completion::DeltaStream;

    /// One scripted reply: items to yield, then either end or hang forever.
    struct Script {
        items: Vec<Result<CompletionDelta, LlmError>>,
        hang: bool,
    }

    #[derive(Default)]
    struct FakeClient {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<Vec<Turn>>>,
    }

    impl FakeClient {
        fn replying(replies: &[&[&str]]) -> Self {
            let client = Self::default();
            for fragments in replies {
                client.push(
                    fragments
                        .iter()
                        .map(|f| Ok(CompletionDelta::content(*f)))
                        .collect(),
                    false,
                );
            }
            client
        }

        fn push(&self, items: Vec<Result<CompletionDelta, LlmError>>, hang: bool) {
            self.scripts.lock().unwrap().push_back(Script { items, hang });
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl CompletionClient for FakeClient {
        fn stream_reply(&self, turns: &[Turn]) -> DeltaStream {
            self.requests.lock().unwrap().push(turns.to_vec());
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script {
                items: Vec::new(),
                hang: false,
            });
            let items = stream::iter(script.items);
            if script.hang {
                Box::pin(items.chain(stream::pending()))
            } else {
                Box::pin(items)
            }
        }

        async fn complete_reply(&self, _turns: &[Turn]) -> Result<CompletionDelta, LlmError> {
            Ok(CompletionDelta::default())
        }
    }

    fn owner() -> Option<OwnerId> {
        Some(OwnerId::new("user-1"))
    }

    fn controller(
        client: FakeClient,
        repo: FakeRepository,
    ) -> (
        SessionController<FakeClient, FakeRepository>,
        Arc<FakeClient>,
        Arc<FakeRepository>,
    ) {
        let client = Arc::new(client);
        let repo = Arc::new(repo);
        let controller = SessionController::new(client.clone(), repo.clone(), owner());
        (controller, client, repo)
    }

    #[tokio::test]
    async fn first_exchange_creates_record() {
        let (mut controller, _, repo) =
            controller(FakeClient::replying(&[&["Hi", " there!"]]), FakeRepository::default());

        let outcome = controller.send("Hello", |_, _| {}).await.unwrap();

        assert_eq!(outcome.assistant.content, "Hi there!");
        assert!(outcome.error.is_none());
        assert_eq!(controller.state(), ControllerState::Settled);

        let record = outcome.persist.wait().await.unwrap();
        assert_eq!(record.title, "Hello");

        let calls = repo.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Create { title, turns } => {
                assert_eq!(title, "Hello");
                assert_eq!(turns.len(), 2);
                assert_eq!(turns[0].role, MessageRole::User);
                assert_eq!(turns[0].content, "Hello");
                assert_eq!(turns[1].role, MessageRole::Assistant);
                assert_eq!(turns[1].content, "Hi there!");
            }
            other => panic!("expected create, got {other:?}"),
        }
        assert_eq!(controller.session_id(), Some(record.id));
    }

    #[tokio::test]
    async fn second_exchange_updates_same_record() {
        let (mut controller, _, repo) = controller(
            FakeClient::replying(&[&["Hi there!"], &["Fine, thanks."]]),
            FakeRepository::default(),
        );

        let first = controller.send("Hello", |_, _| {}).await.unwrap();
        let created = first.persist.wait().await.unwrap();

        let second = controller.send("How are you?", |_, _| {}).await.unwrap();
        let updated = second.persist.wait().await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "Hello");
        assert_eq!(controller.store().title(), Some("Hello"));

        let calls = repo.calls();
        assert_eq!(calls.len(), 2);
        match &calls[1] {
            Call::Update { id, turns } => {
                assert_eq!(*id, created.id);
                assert_eq!(turns.len(), 4);
                assert_eq!(turns[2].content, "How are you?");
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn only_one_create_when_second_exchange_outruns_it() {
        let repo = FakeRepository {
            create_delay: Some(Duration::from_millis(50)),
            ..FakeRepository::default()
        };
        let (mut controller, _, repo) =
            controller(FakeClient::replying(&[&["one"], &["two"], &["three"]]), repo);

        let first = controller.send("a", |_, _| {}).await.unwrap();
        let second = controller.send("b", |_, _| {}).await.unwrap();
        let third = controller.send("c", |_, _| {}).await.unwrap();

        let created = first.persist.wait().await.unwrap();
        let updated = second.persist.wait().await.unwrap();
        let last = third.persist.wait().await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(last.id, created.id);
        assert_eq!(last.messages.len(), 6);

        let creates = repo
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Create { .. }))
            .count();
        assert_eq!(creates, 1);
        assert_eq!(repo.calls().len(), 3);
    }

    #[tokio::test]
    async fn stream_error_keeps_partial_content() {
        let client = FakeClient::default();
        client.push(
            vec![
                Ok(CompletionDelta::content("Hi ")),
                Err(LlmError::Stream("connection reset".to_string())),
            ],
            false,
        );
        let (mut controller, _, repo) = controller(client, FakeRepository::default());

        let outcome = controller.send("Hello", |_, _| {}).await.unwrap();

        assert_eq!(outcome.assistant.content, "Hi ");
        assert!(outcome.assistant.incomplete);
        assert!(matches!(outcome.error, Some(ChatError::StreamAborted(_))));
        assert_eq!(controller.state(), ControllerState::Settled);

        let record = outcome.persist.wait().await.unwrap();
        assert_eq!(record.messages.len(), 2);
        assert!(record.messages[1].incomplete);
        assert_eq!(record.messages[1].content, "Hi ");
        assert_eq!(repo.calls().len(), 1);
    }

    #[tokio::test]
    async fn establishment_failure_records_empty_incomplete_turn() {
        let client = FakeClient::default();
        client.push(vec![Err(LlmError::AuthenticationFailed)], false);
        let (mut controller, _, _) = controller(client, FakeRepository::default());

        let outcome = controller.send("Hello", |_, _| {}).await.unwrap();

        assert_eq!(controller.store().turns().len(), 2);
        assert_eq!(outcome.assistant.content, "");
        assert!(outcome.assistant.incomplete);
    }

    #[tokio::test]
    async fn malformed_request_error_is_classified() {
        let client = FakeClient::default();
        client.push(vec![Err(LlmError::InvalidRequest("bad role".to_string()))], false);
        let (mut controller, _, _) = controller(client, FakeRepository::default());

        let outcome = controller.send("Hello", |_, _| {}).await.unwrap();
        assert!(matches!(outcome.error, Some(ChatError::RequestMalformed(_))));
    }

    #[tokio::test]
    async fn updates_observe_growing_turn() {
        let (mut controller, _, _) =
            controller(FakeClient::replying(&[&["Hi", " there!"]]), FakeRepository::default());

        let mut seen = Vec::new();
        controller
            .send("Hello", |delta, store| {
                assert!(delta.content_delta.is_some());
                seen.push(store.last().unwrap().content.clone());
            })
            .await
            .unwrap();

        assert_eq!(seen, vec!["Hi", "Hi there!"]);
    }

    #[tokio::test]
    async fn reasoning_accumulates_on_turn() {
        let client = FakeClient::default();
        client.push(
            vec![
                Ok(CompletionDelta::reasoning("think ")),
                Ok(CompletionDelta::reasoning("hard")),
                Ok(CompletionDelta::content("42")),
            ],
            false,
        );
        let (mut controller, _, _) = controller(client, FakeRepository::default());

        let outcome = controller.send("meaning?", |_, _| {}).await.unwrap();
        assert_eq!(outcome.assistant.reasoning.as_deref(), Some("think hard"));
        assert_eq!(outcome.assistant.content, "42");
    }

    #[tokio::test]
    async fn requires_owner_before_any_call() {
        let client = Arc::new(FakeClient::replying(&[&["Hi"]]));
        let repo = Arc::new(FakeRepository::default());
        let mut controller = SessionController::new(client.clone(), repo.clone(), None);

        let err = controller.send("Hello", |_, _| {}).await.unwrap_err();

        assert_eq!(err, ChatError::AuthRequired);
        assert_eq!(client.request_count(), 0);
        assert!(controller.store().is_empty());
        assert_eq!(controller.state(), ControllerState::Idle);

        controller.set_owner(owner());
        assert!(controller.send("Hello", |_, _| {}).await.is_ok());
    }

    #[tokio::test]
    async fn blank_message_is_malformed() {
        let (mut controller, client, _) =
            controller(FakeClient::replying(&[&["Hi"]]), FakeRepository::default());

        let err = controller.send("   \n", |_, _| {}).await.unwrap_err();

        assert!(matches!(err, ChatError::RequestMalformed(_)));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn sends_full_history() {
        let (mut controller, client, _) = controller(
            FakeClient::replying(&[&["Hi there!"], &["Fine."]]),
            FakeRepository::default(),
        );

        controller.send("Hello", |_, _| {}).await.unwrap();
        controller.send("How are you?", |_, _| {}).await.unwrap();

        let requests = client.requests.lock().unwrap().clone();
        assert_eq!(requests[0].len(), 1);
        assert_eq!(requests[1].len(), 3);
        assert_eq!(requests[1][1].content, "Hi there!");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_settles_exchange() {
        let client = FakeClient::default();
        client.push(vec![Ok(CompletionDelta::content("slow"))], true);
        let (controller, _, _) = controller(client, FakeRepository::default());
        let mut controller = controller.with_deadline(Duration::from_secs(5));

        let outcome = controller.send("Hello", |_, _| {}).await.unwrap();

        assert_eq!(outcome.assistant.content, "slow");
        assert!(outcome.assistant.incomplete);
        assert_eq!(
            outcome.error,
            Some(ChatError::StreamAborted(
                "request timed out after 5s".to_string()
            ))
        );
        assert!(outcome.persist.wait().await.is_ok());
    }

    #[tokio::test]
    async fn unbounded_deadline_completes_exchange() {
        let (controller, _, _) =
            controller(FakeClient::replying(&[&["Hi", " there!"]]), FakeRepository::default());
        let mut controller = controller.with_deadline(Duration::from_secs(u64::MAX));

        let outcome = controller.send("Hello", |_, _| {}).await.unwrap();

        assert_eq!(outcome.error, None);
        assert_eq!(outcome.assistant.content, "Hi there!");
        assert!(!outcome.assistant.incomplete);
        assert!(outcome.persist.wait().await.is_ok());
    }

    #[tokio::test]
    async fn cancellation_aborts_stream() {
        let client = FakeClient::default();
        client.push(vec![Ok(CompletionDelta::content("partial"))], true);
        let (mut controller, _, repo) = controller(client, FakeRepository::default());

        let token = controller.cancellation();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let outcome = controller.send("Hello", |_, _| {}).await.unwrap();

        assert_eq!(
            outcome.error,
            Some(ChatError::StreamAborted("cancelled".to_string()))
        );
        assert_eq!(outcome.assistant.content, "partial");
        assert!(outcome.assistant.incomplete);
        outcome.persist.wait().await.unwrap();
        assert_eq!(repo.calls().len(), 1);
    }

    #[tokio::test]
    async fn stale_cancellation_does_not_abort_next_exchange() {
        let (mut controller, _, _) =
            controller(FakeClient::replying(&[&["ok"]]), FakeRepository::default());
        controller.cancellation().cancel();

        let outcome = controller.send("Hello", |_, _| {}).await.unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(outcome.assistant.content, "ok");
    }

    #[tokio::test]
    async fn abandoned_exchange_blocks_until_reset() {
        let client = FakeClient::default();
        client.push(vec![Ok(CompletionDelta::content("never ends"))], true);
        client.push(vec![Ok(CompletionDelta::content("fresh"))], false);
        let (mut controller, _, repo) = controller(client, FakeRepository::default());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), controller.send("Hello", |_, _| {}))
                .await;
        assert!(abandoned.is_err());
        assert_eq!(controller.state(), ControllerState::Streaming);

        let err = controller.send("again", |_, _| {}).await.unwrap_err();
        assert_eq!(err, ChatError::ExchangeInFlight);

        controller.reset();
        assert_eq!(controller.state(), ControllerState::Idle);
        let outcome = controller.send("again", |_, _| {}).await.unwrap();
        assert_eq!(outcome.assistant.content, "fresh");
        outcome.persist.wait().await.unwrap();
        assert_eq!(repo.calls().len(), 1);
    }

    #[tokio::test]
    async fn reset_starts_a_new_record() {
        let (mut controller, _, repo) = controller(
            FakeClient::replying(&[&["one"], &["two"]]),
            FakeRepository::default(),
        );

        let first = controller.send("first chat", |_, _| {}).await.unwrap();
        let first_record = first.persist.wait().await.unwrap();

        controller.reset();
        assert!(controller.store().is_empty());
        assert!(controller.session_id().is_none());

        let second = controller.send("second chat", |_, _| {}).await.unwrap();
        let second_record = second.persist.wait().await.unwrap();

        assert_ne!(first_record.id, second_record.id);
        assert_eq!(second_record.title, "second chat");
        assert!(
            repo.calls()
                .iter()
                .all(|c| matches!(c, Call::Create { .. }))
        );
    }

    #[tokio::test]
    async fn resumed_chat_is_updated_not_created() {
        let repo = FakeRepository::default();
        let existing = repo
            .create(
                &OwnerId::new("user-1"),
                "Earlier",
                &[Turn::user("Earlier"), Turn::assistant("Yes")],
            )
            .await
            .unwrap();
        let (mut controller, _, repo) = controller(FakeClient::replying(&[&["Back"]]), repo);

        controller.resume(existing.clone());
        let outcome = controller.send("continue", |_, _| {}).await.unwrap();
        let record = outcome.persist.wait().await.unwrap();

        assert_eq!(record.id, existing.id);
        assert_eq!(record.title, "Earlier");
        assert_eq!(record.messages.len(), 4);
        assert!(matches!(repo.calls().last(), Some(Call::Update { .. })));
    }

    #[tokio::test]
    async fn persistence_failure_is_reported_not_rolled_back() {
        let repo = FakeRepository::default();
        repo.set_fail_writes(true);
        let (mut controller, _, _) = controller(FakeClient::replying(&[&["Hi"]]), repo);

        let outcome = controller.send("Hello", |_, _| {}).await.unwrap();
        let err = outcome.persist.wait().await.unwrap_err();

        assert!(matches!(err, ChatError::Persistence(_)));
        assert_eq!(controller.store().turns().len(), 2);
        assert!(controller.session_id().is_none());
    }

    #[tokio::test]
    async fn reconcile_pulls_confirmed_metadata() {
        let (mut controller, _, _) =
            controller(FakeClient::replying(&[&["Hi"]]), FakeRepository::default());

        let outcome = controller.send("Hello", |_, _| {}).await.unwrap();
        let record = outcome.persist.wait().await.unwrap();
        assert!(controller.store().id().is_none());

        controller.reconcile();
        assert_eq!(controller.store().id(), Some(record.id));
        assert_eq!(controller.store().session().created_at, Some(record.created_at));
    }
}
