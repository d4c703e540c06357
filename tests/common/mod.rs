//! Shared test harness for the integration suite: a recording handler with
//! controllable completion, plus polling and event-stream helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;

use directive_sequencer::{
    Directive, DirectiveCompletion, DirectiveHandler, HandlerFailure, PublishedEvent,
    SequencerEvent,
};

/// One recorded lifecycle call, tagged with the directive's message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerCall {
    PreHandle(String),
    Handle(String),
    Cancel(String),
}

/// Test handler that records every lifecycle call and lets the test decide
/// when (and how) each handle step completes.
pub struct RecordingHandler {
    calls: Mutex<Vec<HandlerCall>>,
    pending: Mutex<HashMap<String, DirectiveCompletion>>,
    auto_complete: bool,
    fail_pre_handle: bool,
}

impl RecordingHandler {
    /// Handler that completes every handle step immediately.
    pub fn auto_completing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            auto_complete: true,
            fail_pre_handle: false,
        })
    }

    /// Handler that parks each completion token until the test releases it.
    pub fn manual() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            auto_complete: false,
            fail_pre_handle: false,
        })
    }

    /// Handler whose pre-handle step always fails.
    pub fn failing_pre_handle() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            pending: Mutex::new(HashMap::new()),
            auto_complete: false,
            fail_pre_handle: true,
        })
    }

    pub fn calls(&self) -> Vec<HandlerCall> {
        self.calls.lock().clone()
    }

    /// Message ids in pre-handle invocation order.
    pub fn pre_handle_order(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HandlerCall::PreHandle(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Release a parked completion token as completed. Returns whether a
    /// token was pending for the message id.
    pub fn complete(&self, message_id: &str) -> bool {
        match self.pending.lock().remove(message_id) {
            Some(token) => {
                token.completed();
                true
            }
            None => false,
        }
    }

    /// Release a parked completion token as failed.
    pub fn fail(&self, message_id: &str, description: &str) -> bool {
        match self.pending.lock().remove(message_id) {
            Some(token) => {
                token.failed(description);
                true
            }
            None => false,
        }
    }

    /// Poll until a recorded call matches the predicate or the timeout
    /// passes.
    pub async fn wait_for_call<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&HandlerCall) -> bool,
    {
        wait_until(timeout, || self.calls.lock().iter().any(&predicate)).await
    }
}

#[async_trait]
impl DirectiveHandler for RecordingHandler {
    async fn pre_handle(&self, directive: &Directive) -> Result<(), HandlerFailure> {
        self.calls
            .lock()
            .push(HandlerCall::PreHandle(directive.message_id().to_string()));
        if self.fail_pre_handle {
            Err(HandlerFailure::new("pre-handle refused"))
        } else {
            Ok(())
        }
    }

    async fn handle(&self, directive: &Directive, completion: DirectiveCompletion) {
        self.calls
            .lock()
            .push(HandlerCall::Handle(directive.message_id().to_string()));
        if self.auto_complete {
            completion.completed();
        } else {
            self.pending
                .lock()
                .insert(directive.message_id().to_string(), completion);
        }
    }

    async fn cancel(&self, directive: &Directive) {
        self.calls
            .lock()
            .push(HandlerCall::Cancel(directive.message_id().to_string()));
    }
}

/// Poll a condition every few milliseconds until it holds or the timeout
/// passes. Returns whether the condition held.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Receive events until one matches the predicate or the timeout passes.
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<PublishedEvent>,
    timeout: Duration,
    predicate: F,
) -> Option<SequencerEvent>
where
    F: Fn(&SequencerEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            return None;
        };
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(published)) if predicate(&published.event) => return Some(published.event),
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
        }
    }
}
