//! # Handler Binding Table
//!
//! Thread-safe mapping from `(namespace, name)` to handler bindings with
//! all-or-nothing batch mutation. Mutations build a new snapshot from the
//! current one and swap it in atomically, so a concurrent lookup observes
//! either the fully-old or fully-new table, never a partial edit.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use directive_sequencer::handler::{BlockingPolicy, HandlerConfiguration};
//! use directive_sequencer::directive::NamespaceAndName;
//! use directive_sequencer::routing::HandlerBindingTable;
//! # use directive_sequencer::handler::{DirectiveHandler, DirectiveCompletion, HandlerFailure};
//! # use directive_sequencer::directive::Directive;
//! # struct Player;
//! # #[async_trait::async_trait]
//! # impl DirectiveHandler for Player {
//! #     async fn pre_handle(&self, _d: &Directive) -> Result<(), HandlerFailure> { Ok(()) }
//! #     async fn handle(&self, _d: &Directive, c: DirectiveCompletion) { c.completed(); }
//! #     async fn cancel(&self, _d: &Directive) {}
//! # }
//!
//! # fn main() -> Result<(), directive_sequencer::SequencerError> {
//! let table = HandlerBindingTable::new();
//! let key = NamespaceAndName::new("Speaker", "Play")?;
//! let configuration = HandlerConfiguration::new()
//!     .with_binding(key.clone(), Arc::new(Player), BlockingPolicy::Blocking);
//!
//! assert!(table.add(&configuration));
//! assert!(table.lookup(&key).is_some());
//! // Overlapping keys refuse the whole batch
//! assert!(!table.add(&configuration));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::directive::NamespaceAndName;
use crate::handler::{HandlerAndPolicy, HandlerConfiguration};

type BindingSnapshot = Arc<HashMap<NamespaceAndName, HandlerAndPolicy>>;

/// Atomic, batch-swapped mapping from routing keys to handler bindings.
#[derive(Debug)]
pub struct HandlerBindingTable {
    bindings: RwLock<BindingSnapshot>,
}

impl HandlerBindingTable {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Install all bindings in `configuration` iff none of its keys already
    /// exists. Returns whether the batch was installed.
    pub fn add(&self, configuration: &HandlerConfiguration) -> bool {
        if configuration.is_empty() {
            // No keys, no conflicts: a vacuous success
            debug!("Empty handler configuration batch; nothing to install");
            return true;
        }

        let mut guard = self.bindings.write();

        if let Some(conflict) = configuration.keys().find(|key| guard.contains_key(key)) {
            warn!(
                key = %conflict,
                "Refusing handler configuration batch: key already bound"
            );
            return false;
        }

        let mut next = (**guard).clone();
        for (key, binding) in configuration.iter() {
            next.insert(key.clone(), binding.clone());
        }
        *guard = Arc::new(next);

        debug!(
            added = configuration.len(),
            total = guard.len(),
            "Installed handler configuration batch"
        );
        true
    }

    /// Remove all bindings in `configuration` iff every listed `(key,
    /// handler, policy)` entry matches the current table exactly. Returns
    /// whether the batch was removed.
    pub fn remove(&self, configuration: &HandlerConfiguration) -> bool {
        if configuration.is_empty() {
            debug!("Empty handler configuration batch; nothing to remove");
            return true;
        }

        let mut guard = self.bindings.write();

        for (key, binding) in configuration.iter() {
            match guard.get(key) {
                Some(current) if current.matches(binding) => {}
                Some(_) => {
                    warn!(
                        key = %key,
                        "Refusing handler removal batch: bound handler does not match"
                    );
                    return false;
                }
                None => {
                    warn!(key = %key, "Refusing handler removal batch: key not bound");
                    return false;
                }
            }
        }

        let mut next = (**guard).clone();
        for key in configuration.keys() {
            next.remove(key);
        }
        *guard = Arc::new(next);

        debug!(
            removed = configuration.len(),
            total = guard.len(),
            "Removed handler configuration batch"
        );
        true
    }

    /// Look up the binding for a routing key.
    pub fn lookup(&self, key: &NamespaceAndName) -> Option<HandlerAndPolicy> {
        self.bindings.read().get(key).cloned()
    }

    /// A consistent point-in-time snapshot of the whole table.
    pub fn snapshot(&self) -> BindingSnapshot {
        Arc::clone(&self.bindings.read())
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl Default for HandlerBindingTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::Directive;
    use crate::handler::{
        BlockingPolicy, DirectiveCompletion, DirectiveHandler, HandlerFailure,
    };
    use async_trait::async_trait;

    struct NoopHandler;

    #[async_trait]
    impl DirectiveHandler for NoopHandler {
        async fn pre_handle(&self, _directive: &Directive) -> Result<(), HandlerFailure> {
            Ok(())
        }

        async fn handle(&self, _directive: &Directive, completion: DirectiveCompletion) {
            completion.completed();
        }

        async fn cancel(&self, _directive: &Directive) {}
    }

    fn key(namespace: &str, name: &str) -> NamespaceAndName {
        NamespaceAndName::new(namespace, name).unwrap()
    }

    #[test]
    fn test_add_and_lookup() {
        let table = HandlerBindingTable::new();
        let handler: Arc<dyn DirectiveHandler> = Arc::new(NoopHandler);

        let configuration = HandlerConfiguration::new().with_binding(
            key("Speaker", "Play"),
            handler,
            BlockingPolicy::Blocking,
        );

        assert!(table.add(&configuration));
        let binding = table.lookup(&key("Speaker", "Play")).unwrap();
        assert_eq!(binding.policy, BlockingPolicy::Blocking);
        assert!(table.lookup(&key("Speaker", "Stop")).is_none());
    }

    #[test]
    fn test_add_rejects_batch_on_any_conflict() {
        let table = HandlerBindingTable::new();
        let handler: Arc<dyn DirectiveHandler> = Arc::new(NoopHandler);

        let first = HandlerConfiguration::new().with_binding(
            key("Speaker", "Play"),
            handler.clone(),
            BlockingPolicy::Blocking,
        );
        assert!(table.add(&first));

        // One fresh key, one conflicting key: nothing may be installed
        let second = HandlerConfiguration::new()
            .with_binding(key("Speaker", "Play"), handler.clone(), BlockingPolicy::Blocking)
            .with_binding(key("Speaker", "Stop"), handler, BlockingPolicy::NonBlocking);
        assert!(!table.add(&second));
        assert!(table.lookup(&key("Speaker", "Stop")).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_requires_exact_match() {
        let table = HandlerBindingTable::new();
        let bound: Arc<dyn DirectiveHandler> = Arc::new(NoopHandler);
        let other: Arc<dyn DirectiveHandler> = Arc::new(NoopHandler);

        let configuration = HandlerConfiguration::new().with_binding(
            key("Alerts", "SetAlert"),
            bound.clone(),
            BlockingPolicy::NonBlocking,
        );
        assert!(table.add(&configuration));

        // Different handler instance for the same key
        let mismatched = HandlerConfiguration::new().with_binding(
            key("Alerts", "SetAlert"),
            other,
            BlockingPolicy::NonBlocking,
        );
        assert!(!table.remove(&mismatched));
        assert_eq!(table.len(), 1);

        assert!(table.remove(&configuration));
        assert!(table.is_empty());
    }

    #[test]
    fn test_empty_batch_is_a_vacuous_success() {
        let table = HandlerBindingTable::new();
        let handler: Arc<dyn DirectiveHandler> = Arc::new(NoopHandler);

        let configuration = HandlerConfiguration::new().with_binding(
            key("Speaker", "Play"),
            handler,
            BlockingPolicy::Blocking,
        );
        assert!(table.add(&configuration));

        // No keys means no conflicts and no mismatches: both mutations
        // succeed without touching existing bindings
        assert!(table.add(&HandlerConfiguration::new()));
        assert!(table.remove(&HandlerConfiguration::new()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_unknown_key_leaves_table_unchanged() {
        let table = HandlerBindingTable::new();
        let handler: Arc<dyn DirectiveHandler> = Arc::new(NoopHandler);

        let configuration = HandlerConfiguration::new().with_binding(
            key("Speaker", "Play"),
            handler,
            BlockingPolicy::Blocking,
        );

        assert!(!table.remove(&configuration));
        assert!(table.is_empty());
    }

    #[test]
    fn test_snapshot_is_immutable_under_mutation() {
        let table = HandlerBindingTable::new();
        let handler: Arc<dyn DirectiveHandler> = Arc::new(NoopHandler);

        let configuration = HandlerConfiguration::new().with_binding(
            key("Speaker", "Play"),
            handler.clone(),
            BlockingPolicy::Blocking,
        );
        assert!(table.add(&configuration));

        let snapshot = table.snapshot();
        assert!(table.remove(&configuration));

        // The old snapshot still sees the binding; the table does not
        assert!(snapshot.contains_key(&key("Speaker", "Play")));
        assert!(table.lookup(&key("Speaker", "Play")).is_none());
    }

    #[test]
    fn test_concurrent_overlapping_adds_yield_one_winner() {
        let table = Arc::new(HandlerBindingTable::new());
        let handler: Arc<dyn DirectiveHandler> = Arc::new(NoopHandler);

        let configuration = HandlerConfiguration::new().with_binding(
            key("Speaker", "Play"),
            handler,
            BlockingPolicy::Blocking,
        );

        let results: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let table = Arc::clone(&table);
                    let configuration = configuration.clone();
                    scope.spawn(move || table.add(&configuration))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(table.len(), 1);
    }
}
