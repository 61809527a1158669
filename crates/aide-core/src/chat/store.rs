//! The chat context store: holds the single current transcript of a chat turn.
//!
//! The store is a single-slot holder with get/replace semantics. One writer
//! task owns the value; every write is sent to it over a channel and applied
//! in arrival order, and each new value is published on a `watch` channel so
//! reads never wait on the writer and never see a half-applied change.
//!
//! Three write flavours are exposed:
//!
//! - [`ChatContextHandle::update`] derives the new value from the *latest*
//!   value inside the writer. Concurrent tool calls use this and cannot lose
//!   each other's messages.
//! - [`ChatContextHandle::replace`] installs a caller-built value
//!   unconditionally. A caller that reads, derives, then replaces can
//!   overwrite a write that landed in between.
//! - [`ChatContextHandle::compare_and_replace`] installs a caller-built value
//!   only if nothing was written since the caller's read, and reports a
//!   [`ContextError::LostUpdate`] otherwise.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace};

use super::message::ChatContext;

/// Pending writes buffered before senders wait on the writer.
const COMMAND_BUFFER: usize = 64;

/// Errors from chat context writes.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("chat context writer has stopped")]
    Closed,

    #[error("lost update: expected context version {expected}, found {actual}")]
    LostUpdate { expected: u64, actual: u64 },
}

type Derive = Box<dyn FnOnce(&ChatContext) -> ChatContext + Send>;

enum Command {
    Replace {
        context: ChatContext,
        reply: oneshot::Sender<Arc<ChatContext>>,
    },
    CompareAndReplace {
        expected: u64,
        context: ChatContext,
        reply: oneshot::Sender<Result<Arc<ChatContext>, ContextError>>,
    },
    Update {
        derive: Derive,
        reply: oneshot::Sender<Arc<ChatContext>>,
    },
}

/// Spawns the writer task for a chat context.
pub struct ChatContextStore;

impl ChatContextStore {
    /// Start a writer owning `initial` and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime. The writer stops once
    /// every handle has been dropped.
    pub fn spawn(initial: ChatContext) -> ChatContextHandle {
        let initial = Arc::new(initial);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::clone(&initial));

        tokio::spawn(run_writer(initial, command_rx, snapshot_tx));

        ChatContextHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
        }
    }
}

async fn run_writer(
    mut current: Arc<ChatContext>,
    mut commands: mpsc::Receiver<Command>,
    snapshot: watch::Sender<Arc<ChatContext>>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Replace { context, reply } => {
                current = publish(&snapshot, &current, context);
                let _ = reply.send(Arc::clone(&current));
            }
            Command::CompareAndReplace {
                expected,
                context,
                reply,
            } => {
                let outcome = if current.version == expected {
                    current = publish(&snapshot, &current, context);
                    Ok(Arc::clone(&current))
                } else {
                    debug!(expected, actual = current.version, "Rejected stale context write");
                    Err(ContextError::LostUpdate {
                        expected,
                        actual: current.version,
                    })
                };
                let _ = reply.send(outcome);
            }
            Command::Update { derive, reply } => {
                let next = derive(&current);
                current = publish(&snapshot, &current, next);
                let _ = reply.send(Arc::clone(&current));
            }
        }
    }
    debug!("Chat context writer stopped");
}

/// Install `next` as the current value. Versions are assigned here so they
/// increase by exactly one per accepted write.
fn publish(
    snapshot: &watch::Sender<Arc<ChatContext>>,
    current: &ChatContext,
    mut next: ChatContext,
) -> Arc<ChatContext> {
    next.version = current.version + 1;
    trace!(version = next.version, messages = next.history.len(), "Chat context replaced");
    let next = Arc::new(next);
    snapshot.send_replace(Arc::clone(&next));
    next
}

/// Cloneable handle to a running chat context store.
#[derive(Clone)]
pub struct ChatContextHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Arc<ChatContext>>,
}

impl ChatContextHandle {
    /// The current transcript.
    pub fn current(&self) -> Arc<ChatContext> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Replace the transcript unconditionally.
    pub async fn replace(&self, context: ChatContext) -> Result<Arc<ChatContext>, ContextError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Replace { context, reply }).await?;
        rx.await.map_err(|_| ContextError::Closed)
    }

    /// Replace the transcript only if its version is still `expected`.
    pub async fn compare_and_replace(
        &self,
        expected: u64,
        context: ChatContext,
    ) -> Result<Arc<ChatContext>, ContextError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::CompareAndReplace {
            expected,
            context,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ContextError::Closed)?
    }

    /// Replace the transcript with `derive(latest)`, serialized with every
    /// other write to this store.
    pub async fn update<F>(&self, derive: F) -> Result<Arc<ChatContext>, ContextError>
    where
        F: FnOnce(&ChatContext) -> ChatContext + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Update {
            derive: Box::new(derive),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ContextError::Closed)
    }

    /// Observe every new transcript value.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ChatContext>> {
        self.snapshot.clone()
    }

    async fn send(&self, command: Command) -> Result<(), ContextError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ContextError::Closed)
    }
}

impl std::fmt::Debug for ChatContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.snapshot.borrow();
        f.debug_struct("ChatContextHandle")
            .field("version", &current.version)
            .field("messages", &current.history.len())
            .finish()
    }
}
