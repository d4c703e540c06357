//! # Turn Processor
//!
//! The sequencing engine for one conversational turn. A turn processor owns
//! the FIFO queue of admitted directives and an in-flight table tracking each
//! directive's lifecycle state. A dedicated Tokio worker task drains the
//! queue: it resolves each directive through the routing gateway, awaits
//! pre-handle inline (which serializes pre-handle invocations in admission
//! order), hands off handle, and then either waits for completion (blocking
//! policy) or advances immediately (non-blocking policy).
//!
//! A processor serves exactly one dialog-request-id for its entire lifetime.
//! Once superseded it is cancelled and discarded, never reused. Completion
//! signals arriving for a discarded processor are matched by message id and
//! dropped.
//!
//! Locking discipline: the parking_lot mutexes here guard short critical
//! sections only and are never held across an await point.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::directive::{Directive, DirectiveState, NamespaceAndName};
use crate::events::{EventPublisher, SequencerEvent};
use crate::handler::{
    BlockingPolicy, CompletionOutcome, CompletionSignal, DirectiveCompletion, HandlerAndPolicy,
};
use crate::routing::DirectiveRouter;

/// A directive that has been admitted and not yet reached a terminal state.
#[derive(Debug)]
struct InFlightDirective {
    directive: Directive,
    binding: HandlerAndPolicy,
    state: DirectiveState,
}

/// State shared between the turn processor handle and its worker task.
struct TurnState {
    dialog_request_id: String,
    queue: Mutex<VecDeque<Directive>>,
    in_flight: Mutex<HashMap<String, InFlightDirective>>,
    /// Routing keys whose bindings were removed while directives were in
    /// flight; the worker cancels matching entries.
    pending_binding_cancels: Mutex<Vec<NamespaceAndName>>,
    /// Turn-wide cancellation: queued and in-flight directives are cancelled
    /// and the worker exits.
    cancelled: AtomicBool,
    /// Shutdown drain: no further dispatch, but in-flight handle steps may
    /// still settle naturally.
    draining: AtomicBool,
    wake: Notify,
    settled: Notify,
    completion_tx: mpsc::UnboundedSender<CompletionSignal>,
    router: Arc<DirectiveRouter>,
    events: EventPublisher,
}

impl TurnState {
    fn is_settled(&self) -> bool {
        self.queue.lock().is_empty() && self.in_flight.lock().is_empty()
    }

    fn notify_if_settled(&self) {
        if self.is_settled() {
            self.settled.notify_waiters();
        }
    }
}

/// Sequencing engine owning one turn's ordered in-flight directive queue.
pub(crate) struct TurnProcessor {
    shared: Arc<TurnState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TurnProcessor {
    /// Create a processor for `dialog_request_id` and spawn its worker.
    /// Must be called from within a Tokio runtime.
    pub(crate) fn new(
        dialog_request_id: impl Into<String>,
        router: Arc<DirectiveRouter>,
        events: EventPublisher,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(TurnState {
            dialog_request_id: dialog_request_id.into(),
            queue: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashMap::new()),
            pending_binding_cancels: Mutex::new(Vec::new()),
            cancelled: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            wake: Notify::new(),
            settled: Notify::new(),
            completion_tx,
            router,
            events,
        });

        let worker = tokio::spawn(Self::run(Arc::clone(&shared), completion_rx));

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub(crate) fn dialog_request_id(&self) -> &str {
        &self.shared.dialog_request_id
    }

    /// Append a directive to this turn's queue. Refused once the processor
    /// has been cancelled or is draining for shutdown.
    pub(crate) fn enqueue(&self, directive: Directive) -> bool {
        if self.shared.cancelled.load(Ordering::Acquire)
            || self.shared.draining.load(Ordering::Acquire)
        {
            return false;
        }
        self.shared.queue.lock().push_back(directive);
        self.shared.wake.notify_one();
        true
    }

    /// Turn-wide cancellation. Flips the flag and wakes the worker; the
    /// worker invokes handler cancellation and exits. Never blocks on
    /// handler completion.
    pub(crate) fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }

    /// Stop dispatching queued directives but allow in-flight handle steps
    /// to settle naturally. Queued entries are cancelled.
    pub(crate) fn drain(&self) {
        self.shared.draining.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }

    /// Cancel queued and in-flight directives whose binding was removed.
    pub(crate) fn cancel_bindings(&self, keys: Vec<NamespaceAndName>) {
        if keys.is_empty() {
            return;
        }
        self.shared.pending_binding_cancels.lock().extend(keys);
        self.shared.wake.notify_one();
    }

    /// Whether no directives remain queued or in flight.
    pub(crate) fn is_settled(&self) -> bool {
        self.shared.is_settled()
    }

    /// Wait until the processor settles or the deadline passes. Returns
    /// whether it settled.
    pub(crate) async fn wait_settled(&self, deadline: Instant) -> bool {
        loop {
            let notified = self.shared.settled.notified();
            if self.shared.is_settled() {
                return true;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return self.shared.is_settled();
            }
        }
    }

    /// Wait for the worker to finish after cancellation; if it does not
    /// finish within `grace` (a handler call is stuck), abort the task and
    /// force-mark the survivors cancelled.
    pub(crate) async fn join(&self, grace: Duration) {
        let handle = self.worker.lock().take();
        let Some(mut handle) = handle else {
            return;
        };

        if tokio::time::timeout(grace, &mut handle).await.is_err() {
            warn!(
                dialog_request_id = %self.shared.dialog_request_id,
                "Turn worker did not stop within grace period; aborting and force-cancelling"
            );
            handle.abort();
            self.force_cancel_remaining();
        }
        self.shared.settled.notify_waiters();
    }

    /// Drop everything still queued or in flight, marking it cancelled
    /// without invoking handlers. Used only after the worker was aborted.
    fn force_cancel_remaining(&self) {
        let queued: Vec<Directive> = self.shared.queue.lock().drain(..).collect();
        let in_flight: Vec<(String, InFlightDirective)> =
            self.shared.in_flight.lock().drain().collect();

        for directive in queued {
            self.shared.events.publish(SequencerEvent::DirectiveCancelled {
                message_id: directive.message_id().to_string(),
            });
        }
        for (message_id, _) in in_flight {
            self.shared
                .events
                .publish(SequencerEvent::DirectiveCancelled { message_id });
        }
    }

    /// Worker loop: single sequential drain of this turn's queue.
    async fn run(shared: Arc<TurnState>, mut completion_rx: mpsc::UnboundedReceiver<CompletionSignal>) {
        debug!(
            dialog_request_id = %shared.dialog_request_id,
            "Turn processor started"
        );

        loop {
            if shared.cancelled.load(Ordering::Acquire) {
                Self::cancel_remaining(&shared).await;
                break;
            }

            Self::apply_binding_cancels(&shared).await;

            while let Ok(signal) = completion_rx.try_recv() {
                Self::apply_completion(&shared, signal);
            }

            // Cancellation may have arrived while the awaits above ran
            if shared.cancelled.load(Ordering::Acquire) {
                continue;
            }

            if shared.draining.load(Ordering::Acquire) {
                let drained: Vec<Directive> = shared.queue.lock().drain(..).collect();
                for directive in drained {
                    debug!(
                        message_id = directive.message_id(),
                        "Cancelling queued directive during drain"
                    );
                    shared.events.publish(SequencerEvent::DirectiveCancelled {
                        message_id: directive.message_id().to_string(),
                    });
                }
                if shared.in_flight.lock().is_empty() {
                    break;
                }
            } else {
                // A non-terminal blocking directive gates the queue head
                let blocked = shared.in_flight.lock().values().any(|entry| {
                    entry.binding.policy == BlockingPolicy::Blocking && entry.state.is_active()
                });
                if !blocked {
                    let next = shared.queue.lock().pop_front();
                    if let Some(directive) = next {
                        Self::dispatch(&shared, directive).await;
                        continue;
                    }
                }
            }

            shared.notify_if_settled();

            tokio::select! {
                _ = shared.wake.notified() => {}
                signal = completion_rx.recv() => {
                    if let Some(signal) = signal {
                        Self::apply_completion(&shared, signal);
                    }
                }
            }
        }

        shared.settled.notify_waiters();
        debug!(
            dialog_request_id = %shared.dialog_request_id,
            "Turn processor stopped"
        );
    }

    /// Drive one directive through resolve → pre-handle → handle.
    async fn dispatch(shared: &Arc<TurnState>, directive: Directive) {
        let Some(binding) = shared.router.resolve(&directive) else {
            // Unroutable: the router already surfaced the diagnostic
            return;
        };

        let message_id = directive.message_id().to_string();
        shared.in_flight.lock().insert(
            message_id.clone(),
            InFlightDirective {
                directive: directive.clone(),
                binding: binding.clone(),
                state: DirectiveState::PreHandling,
            },
        );

        match shared.router.pre_handle(&directive, &binding.handler).await {
            Err(failure) => {
                shared.in_flight.lock().remove(&message_id);
                shared.events.publish(SequencerEvent::DirectiveFailed {
                    message_id,
                    description: failure.description,
                });
            }
            Ok(()) => {
                if shared.cancelled.load(Ordering::Acquire) {
                    // The entry stays pre-handling; cancel_remaining picks it up
                    return;
                }
                if let Some(entry) = shared.in_flight.lock().get_mut(&message_id) {
                    entry.state = DirectiveState::Handling;
                }
                let completion =
                    DirectiveCompletion::new(message_id, shared.completion_tx.clone());
                shared
                    .router
                    .handle(&directive, &binding.handler, completion)
                    .await;
            }
        }
    }

    /// Apply an asynchronous completion signal to its in-flight entry.
    /// Signals with no matching handling entry are late and dropped.
    fn apply_completion(shared: &Arc<TurnState>, signal: CompletionSignal) {
        let removed = {
            let mut in_flight = shared.in_flight.lock();
            match in_flight.get(&signal.message_id) {
                Some(entry) if entry.state == DirectiveState::Handling => {
                    in_flight.remove(&signal.message_id)
                }
                _ => None,
            }
        };

        let Some(_entry) = removed else {
            debug!(
                message_id = %signal.message_id,
                "Dropping completion signal with no matching in-flight directive"
            );
            return;
        };

        match signal.outcome {
            CompletionOutcome::Completed => {
                debug!(message_id = %signal.message_id, "Directive completed");
                shared.events.publish(SequencerEvent::DirectiveCompleted {
                    message_id: signal.message_id,
                });
            }
            CompletionOutcome::Failed(failure) => {
                warn!(
                    message_id = %signal.message_id,
                    description = %failure.description,
                    "Directive failed during handling"
                );
                shared.events.publish(SequencerEvent::DirectiveFailed {
                    message_id: signal.message_id,
                    description: failure.description,
                });
            }
        }
    }

    /// Cancel queued and in-flight directives whose binding was removed
    /// while they were in the pipeline.
    async fn apply_binding_cancels(shared: &Arc<TurnState>) {
        let keys: Vec<NamespaceAndName> = {
            let mut pending = shared.pending_binding_cancels.lock();
            pending.drain(..).collect()
        };
        if keys.is_empty() {
            return;
        }

        let mut cancelled_queued = Vec::new();
        {
            let mut queue = shared.queue.lock();
            queue.retain(|directive| {
                if keys.contains(directive.namespace_and_name()) {
                    cancelled_queued.push(directive.message_id().to_string());
                    false
                } else {
                    true
                }
            });
        }
        for message_id in cancelled_queued {
            debug!(message_id = %message_id, "Cancelling queued directive: handler removed");
            shared
                .events
                .publish(SequencerEvent::DirectiveCancelled { message_id });
        }

        let entries: Vec<(String, InFlightDirective)> = {
            let mut in_flight = shared.in_flight.lock();
            let ids: Vec<String> = in_flight
                .iter()
                .filter(|(_, entry)| keys.contains(entry.directive.namespace_and_name()))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| in_flight.remove(&id).map(|entry| (id, entry)))
                .collect()
        };
        for (message_id, entry) in entries {
            debug!(message_id = %message_id, "Cancelling in-flight directive: handler removed");
            shared
                .router
                .cancel(&entry.directive, &entry.binding.handler)
                .await;
            shared
                .events
                .publish(SequencerEvent::DirectiveCancelled { message_id });
        }
    }

    /// Turn-wide cancellation: queued entries are dropped without handler
    /// involvement (no handler ever saw them); in-flight entries get the
    /// best-effort cancel call.
    async fn cancel_remaining(shared: &Arc<TurnState>) {
        let queued: Vec<Directive> = shared.queue.lock().drain(..).collect();
        for directive in queued {
            debug!(
                message_id = directive.message_id(),
                dialog_request_id = %shared.dialog_request_id,
                "Cancelling queued directive"
            );
            shared.events.publish(SequencerEvent::DirectiveCancelled {
                message_id: directive.message_id().to_string(),
            });
        }

        let entries: Vec<(String, InFlightDirective)> = {
            let mut in_flight = shared.in_flight.lock();
            in_flight.drain().collect()
        };
        for (message_id, entry) in entries {
            debug!(
                message_id = %message_id,
                state = %entry.state,
                "Cancelling in-flight directive"
            );
            shared
                .router
                .cancel(&entry.directive, &entry.binding.handler)
                .await;
            shared
                .events
                .publish(SequencerEvent::DirectiveCancelled { message_id });
        }
    }
}

impl std::fmt::Debug for TurnProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnProcessor")
            .field("dialog_request_id", &self.shared.dialog_request_id)
            .field("cancelled", &self.shared.cancelled.load(Ordering::Acquire))
            .field("draining", &self.shared.draining.load(Ordering::Acquire))
            .finish()
    }
}
