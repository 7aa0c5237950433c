//! Update concurrency scheduler.
//!
//! Every `update` becomes a descriptor with a per-atom sequence number. The
//! descriptor moves through
//!
//! ```text
//! submitted -> awaiting-turn -> reducing -> committed | discarded
//! ```
//!
//! Admission (throttle check, debounce supersession, predecessor link) is
//! decided synchronously at submission time under the queue lock. The rest
//! runs on a spawned task, so an update makes progress whether or not its
//! handle is polled. The lock is never held across an await.
//!
//! Superseded and throttled requests are not cancelled: a superseded
//! reducer still runs to completion and only its commit is suppressed.

use crate::config::{AtomConfig, ConcurrencyPolicy};
use crate::error::AtomError;
use crate::transform::Reducer;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use quark_stream::{BehaviorSubject, Observable};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Sequence number assigned to an update at submission.
pub type Seq = u64;

/// How an update call was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateOutcome {
    /// The reducer ran and its result was committed.
    Committed,
    /// A later update superseded this one; its result was discarded.
    Skipped,
    /// Dropped by the throttle window; no reducer ran.
    Throttled,
    /// Held back until hydration finishes; replayed afterwards.
    Buffered,
}

impl UpdateOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, UpdateOutcome::Committed)
    }
}

/// How a submission is admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Subject to the configured concurrency policy.
    Policy,
    /// Hydration replay: queued in order and never superseded.
    Replay,
}

type Completion = Shared<BoxFuture<'static, ()>>;

struct Pending {
    submitted_at: Instant,
    skip: Arc<AtomicBool>,
    done: Completion,
    replay: bool,
}

#[derive(Default)]
struct Queue {
    next_seq: Seq,
    pending: BTreeMap<Seq, Pending>,
}

pub(crate) struct Scheduler<T, A> {
    state: BehaviorSubject<T>,
    reducer: Reducer<T, A>,
    config: AtomConfig,
    queue: Mutex<Queue>,
}

impl<T, A> Scheduler<T, A>
where
    T: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    pub(crate) fn new(state: BehaviorSubject<T>, reducer: Reducer<T, A>, config: AtomConfig) -> Self {
        Self {
            state,
            reducer,
            config,
            queue: Mutex::new(Queue::default()),
        }
    }

    pub(crate) fn config(&self) -> &AtomConfig {
        &self.config
    }

    /// Number of descriptors still queued.
    pub(crate) fn pending(&self) -> usize {
        self.queue.lock().pending.len()
    }

    /// Admit `action` and spawn its wait/reduce/commit task.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn submit(self: &Arc<Self>, action: A, admission: Admission) -> UpdateHandle {
        let now = Instant::now();

        let (seq, skip, predecessor, signal) = {
            let mut queue = self.queue.lock();

            if admission == Admission::Policy {
                match self.config.concurrency {
                    ConcurrencyPolicy::Queue => {}
                    ConcurrencyPolicy::Throttle => {
                        if let Some((first_seq, first)) = queue.pending.first_key_value() {
                            if self.config.within_window(now.duration_since(first.submitted_at)) {
                                tracing::debug!(blocking = *first_seq, "update throttled");
                                return UpdateHandle::ready(Ok(UpdateOutcome::Throttled));
                            }
                        }
                    }
                    ConcurrencyPolicy::Debounce => {
                        let superseded: Vec<Seq> = queue
                            .pending
                            .iter()
                            .filter(|(_, p)| {
                                !p.replay && self.config.within_window(now.duration_since(p.submitted_at))
                            })
                            .map(|(seq, _)| *seq)
                            .collect();
                        for seq in superseded {
                            if let Some(pending) = queue.pending.remove(&seq) {
                                pending.skip.store(true, Ordering::SeqCst);
                                tracing::debug!(seq, "update superseded");
                            }
                        }
                    }
                }
            }

            // Each descriptor only completes after its own predecessor did,
            // so waiting on the newest one orders against the whole queue.
            let predecessor = queue.pending.values().next_back().map(|p| p.done.clone());

            let seq = queue.next_seq;
            queue.next_seq += 1;

            let (signal, fired) = oneshot::channel::<()>();
            let done: Completion = fired.map(|_| ()).boxed().shared();
            let skip = Arc::new(AtomicBool::new(false));
            queue.pending.insert(
                seq,
                Pending {
                    submitted_at: now,
                    skip: skip.clone(),
                    done,
                    replay: admission == Admission::Replay,
                },
            );

            (seq, skip, predecessor, signal)
        };

        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move {
            let turn = Turn {
                scheduler: &scheduler,
                seq,
                signal: Some(signal),
            };
            let outcome = turn.run(action, skip, predecessor).await;
            drop(turn);
            outcome
        });

        UpdateHandle::spawned(seq, task)
    }
}

/// One descriptor's run. Dropping it removes the descriptor and fires its
/// completion, including when the reducer fails or panics.
struct Turn<'a, T, A> {
    scheduler: &'a Scheduler<T, A>,
    seq: Seq,
    signal: Option<oneshot::Sender<()>>,
}

impl<T, A> Turn<'_, T, A>
where
    T: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    async fn run(
        &self,
        action: A,
        skip: Arc<AtomicBool>,
        predecessor: Option<Completion>,
    ) -> Result<UpdateOutcome, AtomError> {
        if let Some(predecessor) = predecessor {
            predecessor.await;
        }

        let current = self.scheduler.state.value();
        let reduced = (self.scheduler.reducer)(current, action).await;

        if skip.load(Ordering::SeqCst) {
            if let Err(e) = &reduced {
                tracing::warn!(seq = self.seq, error = %e, "superseded update failed");
            }
            tracing::debug!(seq = self.seq, "discarding superseded result");
            return Ok(UpdateOutcome::Skipped);
        }

        let next = reduced?;
        self.scheduler.state.next(next);
        Ok(UpdateOutcome::Committed)
    }
}

impl<T, A> Drop for Turn<'_, T, A> {
    fn drop(&mut self) {
        self.scheduler.queue.lock().pending.remove(&self.seq);
        if let Some(signal) = self.signal.take() {
            let _ = signal.send(());
        }
    }
}

enum HandleState {
    Ready(Option<Result<UpdateOutcome, AtomError>>),
    Spawned(JoinHandle<Result<UpdateOutcome, AtomError>>),
}

/// Completion handle returned by `Atom::update`.
///
/// Resolves after the update was committed or discarded. Dropping the handle
/// does not cancel the update.
pub struct UpdateHandle {
    seq: Option<Seq>,
    state: HandleState,
}

impl UpdateHandle {
    pub(crate) fn ready(result: Result<UpdateOutcome, AtomError>) -> Self {
        Self {
            seq: None,
            state: HandleState::Ready(Some(result)),
        }
    }

    fn spawned(seq: Seq, task: JoinHandle<Result<UpdateOutcome, AtomError>>) -> Self {
        Self {
            seq: Some(seq),
            state: HandleState::Spawned(task),
        }
    }

    /// Sequence number, for updates that entered the queue.
    pub fn seq(&self) -> Option<Seq> {
        self.seq
    }
}

impl Future for UpdateHandle {
    type Output = Result<UpdateOutcome, AtomError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            HandleState::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(AtomError::internal("update handle polled after completion"))),
            ),
            HandleState::Spawned(task) => Pin::new(task).poll(cx).map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(AtomError::TaskFailed(e.to_string())),
            }),
        }
    }
}
