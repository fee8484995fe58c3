//! The handler registry: a freeze-after-init map from message categories to handlers.
//!
//! A [`HandlerRegistry`] has two lifecycle phases:
//!
//! - **Open**: handlers are registered and unregistered. Every mutation is serialized by a single mutex
//!   covering both internal indexes, and lookups are refused.
//! - **Frozen**: entered once with [`HandlerRegistry::freeze`] and never left. Mutations are refused, and
//!   lookups read the published index without acquiring any lock.
//!
//! Freezing moves the indexes out of the mutex into a write-once cell, then sets the frozen flag with
//! `Release` ordering. Lookups load the flag with `Acquire` ordering before reading, so every registration
//! completed before the freeze is visible to them.
//!
//! # Example
//!
//! ```
//! use switchyard::prelude::*;
//!
//! #[derive(HandlerDescriptor)]
//! #[handler(category = event, node_kind = reducer, message_types("UserCreated"))]
//! struct UserProjection;
//!
//! impl Handler for UserProjection {
//!     fn handle<'a>(&'a self, _envelope: &'a Envelope) -> BoxFuture<'a, HandlerResult> {
//!         async move { Ok(HandlerOutput::none()) }.boxed()
//!     }
//! }
//!
//! let registry = HandlerRegistry::new();
//! registry.register(UserProjection)?;
//! registry.freeze();
//!
//! let handlers = registry.lookup(MessageCategory::Event, Some("UserCreated"))?;
//! assert_eq!(handlers.len(), 1);
//! assert_eq!(handlers[0].handler_id(), "user_projection");
//! assert!(registry.lookup(MessageCategory::Event, Some("UserDeleted"))?.is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod entry;

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::{
    error::RegistryError,
    handler::{check_descriptor, Handler, MessageTypes},
    message::MessageCategory,
    shape::{ShapePolicy, ShapeValidator},
};

pub use entry::*;

/// The lifecycle phase of a [`HandlerRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegistryState {
    /// Registration allowed, lookup forbidden.
    Open,
    /// Registration forbidden, lookup allowed.
    Frozen,
}

impl fmt::Display for RegistryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryState::Open => write!(f, "open"),
            RegistryState::Frozen => write!(f, "frozen"),
        }
    }
}

/// Both indexes over the registered entries. They are only ever mutated together.
#[derive(Default)]
struct Index {
    by_category: HashMap<MessageCategory, Vec<Arc<RegistryEntry>>>,
    by_id: HashMap<String, Arc<RegistryEntry>>,
}

impl Index {
    fn len(&self) -> usize {
        self.by_id.len()
    }

    fn insert(&mut self, entry: Arc<RegistryEntry>) {
        self.by_category
            .entry(entry.category())
            .or_default()
            .push(Arc::clone(&entry));
        self.by_id.insert(entry.handler_id().to_owned(), entry);
    }

    fn remove(&mut self, handler_id: &str) -> Option<Arc<RegistryEntry>> {
        let entry = self.by_id.remove(handler_id)?;
        if let Some(entries) = self.by_category.get_mut(&entry.category()) {
            entries.retain(|other| other.registration_id() != entry.registration_id());
            if entries.is_empty() {
                self.by_category.remove(&entry.category());
            }
        }
        Some(entry)
    }

    fn category(&self, category: MessageCategory) -> &[Arc<RegistryEntry>] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Maps inbound messages to the handlers registered for their category and type.
///
/// See the [module level documentation](self) for the lifecycle.
pub struct HandlerRegistry {
    validator: Box<dyn ShapeValidator>,
    open: Mutex<Index>,
    published: OnceCell<Index>,
    frozen: AtomicBool,
}

impl HandlerRegistry {
    /// Creates an empty, open registry validating shapes with [`ShapePolicy::standard`].
    pub fn new() -> Self {
        HandlerRegistry::with_validator(ShapePolicy::standard())
    }

    /// Creates an empty, open registry validating shapes with `validator`.
    pub fn with_validator(validator: impl ShapeValidator + 'static) -> Self {
        HandlerRegistry {
            validator: Box::new(validator),
            open: Mutex::new(Index::default()),
            published: OnceCell::new(),
            frozen: AtomicBool::new(false),
        }
    }

    /// Registers a handler under its own message types.
    ///
    /// # Errors
    ///
    /// See [`HandlerRegistry::register_shared`].
    pub fn register<H: Handler>(&self, handler: H) -> Result<RegistrationId, RegistryError> {
        self.register_shared(Arc::new(handler), None)
    }

    /// Registers a handler, routing it by `message_types` instead of the handler's own set.
    ///
    /// # Errors
    ///
    /// See [`HandlerRegistry::register_shared`].
    pub fn register_with_message_types<H: Handler>(
        &self,
        handler: H,
        message_types: impl Into<MessageTypes>,
    ) -> Result<RegistrationId, RegistryError> {
        self.register_shared(Arc::new(handler), Some(message_types.into()))
    }

    /// Registers a shared handler, optionally overriding the message types it is routed by.
    ///
    /// Either the handler is fully registered, or the registry is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Checks are made in order, failing on the first violation:
    ///
    /// - [`RegistryError::InvalidParameter`] if the handler id is blank, or a message type name is blank.
    /// - [`RegistryError::ValidationFailed`] if the shape validator denies the handler's category and node kind.
    /// - [`RegistryError::InvalidState`] if the registry is frozen.
    /// - [`RegistryError::DuplicateRegistration`] if the handler id is already registered.
    pub fn register_shared(
        &self,
        handler: Arc<dyn Handler>,
        message_types: Option<MessageTypes>,
    ) -> Result<RegistrationId, RegistryError> {
        // Each property is read once, so the stored values are exactly the checked ones.
        let handler_id = handler.handler_id().to_owned();
        let category = handler.category();
        let node_kind = handler.node_kind();
        let own_types = handler.message_types();
        check_descriptor(&handler_id, &own_types, message_types.as_ref())?;

        let verdict = self.validator.validate(category, node_kind);
        if !verdict.is_allowed() {
            return Err(RegistryError::ValidationFailed {
                handler_id,
                category,
                node_kind,
                rationale: verdict.into_rationale(),
            });
        }

        let message_types = message_types.unwrap_or(own_types);

        let mut open = self.lock_open();
        if self.is_frozen() {
            return Err(RegistryError::invalid_state(
                "register",
                RegistryState::Frozen,
            ));
        }
        if let Some(existing) = open.by_id.get(&handler_id) {
            return Err(RegistryError::DuplicateRegistration {
                handler_id,
                existing: existing.registration_id(),
            });
        }

        let entry = Arc::new(RegistryEntry::new(
            handler,
            handler_id,
            category,
            node_kind,
            message_types,
        ));
        let registration_id = entry.registration_id();
        debug!(
            handler_id = entry.handler_id(),
            %category,
            %node_kind,
            message_types = %entry.message_types(),
            %registration_id,
            "handler registered"
        );
        open.insert(entry);

        Ok(registration_id)
    }

    /// Removes a registered handler.
    ///
    /// Returns `false` if no handler is registered under `handler_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidState`] if the registry is frozen.
    pub fn unregister(&self, handler_id: &str) -> Result<bool, RegistryError> {
        let mut open = self.lock_open();
        if self.is_frozen() {
            return Err(RegistryError::invalid_state(
                "unregister",
                RegistryState::Frozen,
            ));
        }

        match open.remove(handler_id) {
            Some(entry) => {
                debug!(
                    handler_id,
                    registration_id = %entry.registration_id(),
                    "handler unregistered"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Freezes the registry, permitting lookups and forbidding further mutation.
    ///
    /// Calling this on an already frozen registry does nothing.
    pub fn freeze(&self) {
        let mut open = self.lock_open();
        if self.is_frozen() {
            return;
        }

        let index = std::mem::take(&mut *open);
        let handlers = index.len();
        // Only ever set here, while holding the lock and before the flag is raised.
        let published = self.published.set(index);
        debug_assert!(published.is_ok(), "frozen index published twice");
        self.frozen.store(true, Ordering::Release);
        debug!(handlers, "registry frozen");
    }

    /// Returns the handlers registered for `category` which accept `message_type`, in registration order.
    ///
    /// A `message_type` of `None` returns every handler registered for the category.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidState`] if the registry is not frozen.
    pub fn lookup(
        &self,
        category: MessageCategory,
        message_type: Option<&str>,
    ) -> Result<Vec<&RegistryEntry>, RegistryError> {
        let index = self.published("lookup")?;
        let entries: Vec<_> = index
            .category(category)
            .iter()
            .map(|entry| &**entry)
            .filter(|entry| entry.accepts(message_type))
            .collect();
        trace!(%category, message_type, matched = entries.len(), "lookup");

        Ok(entries)
    }

    /// Returns the handler registered under `handler_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidState`] if the registry is not frozen.
    pub fn lookup_by_id(&self, handler_id: &str) -> Result<Option<&RegistryEntry>, RegistryError> {
        let index = self.published("lookup_by_id")?;
        Ok(index.by_id.get(handler_id).map(|entry| &**entry))
    }

    /// Returns every registered entry, grouped by category and in registration order within a category.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidState`] if the registry is not frozen.
    pub fn entries(&self) -> Result<Vec<&RegistryEntry>, RegistryError> {
        let index = self.published("entries")?;
        Ok(MessageCategory::ALL
            .into_iter()
            .flat_map(|category| index.category(category))
            .map(|entry| &**entry)
            .collect())
    }

    /// Returns every registered handler id, in the same order as [`HandlerRegistry::entries`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidState`] if the registry is not frozen.
    pub fn handler_ids(&self) -> Result<Vec<&str>, RegistryError> {
        Ok(self
            .entries()?
            .into_iter()
            .map(RegistryEntry::handler_id)
            .collect())
    }

    /// The number of registered handlers.
    ///
    /// Before the registry is frozen the count is only a snapshot.
    pub fn handler_count(&self) -> usize {
        if let Some(index) = self.published.get() {
            return index.len();
        }

        let open = self.lock_open();
        match self.published.get() {
            Some(index) => index.len(),
            None => open.len(),
        }
    }

    /// Returns `true` if the registry has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// The registry's current lifecycle phase.
    pub fn state(&self) -> RegistryState {
        if self.is_frozen() {
            RegistryState::Frozen
        } else {
            RegistryState::Open
        }
    }

    fn published(&self, operation: &'static str) -> Result<&Index, RegistryError> {
        if !self.is_frozen() {
            return Err(RegistryError::invalid_state(operation, RegistryState::Open));
        }

        self.published
            .get()
            .ok_or_else(|| RegistryError::invalid_state(operation, RegistryState::Open))
    }

    fn lock_open(&self) -> MutexGuard<'_, Index> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("state", &self.state())
            .field("handler_count", &self.handler_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::{future::BoxFuture, FutureExt};

    use super::*;
    use crate::{
        handler::{HandlerDescriptor, HandlerOutput, HandlerResult, NodeKind},
        message::Envelope,
        shape::ValidationResult,
    };

    struct TestHandler {
        id: &'static str,
        category: MessageCategory,
        node_kind: NodeKind,
        types: &'static [&'static str],
    }

    impl TestHandler {
        fn reducer(id: &'static str, types: &'static [&'static str]) -> Self {
            TestHandler {
                id,
                category: MessageCategory::Event,
                node_kind: NodeKind::Reducer,
                types,
            }
        }
    }

    impl HandlerDescriptor for TestHandler {
        fn handler_id(&self) -> &str {
            self.id
        }

        fn category(&self) -> MessageCategory {
            self.category
        }

        fn node_kind(&self) -> NodeKind {
            self.node_kind
        }

        fn message_types(&self) -> MessageTypes {
            self.types.iter().copied().collect()
        }
    }

    impl Handler for TestHandler {
        fn handle<'a>(&'a self, _envelope: &'a Envelope) -> BoxFuture<'a, HandlerResult> {
            async move { Ok(HandlerOutput::none()) }.boxed()
        }
    }

    #[test]
    fn registry_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HandlerRegistry>();
    }

    #[test]
    fn index_stays_in_sync_on_remove() {
        let registry = HandlerRegistry::new();
        registry.register(TestHandler::reducer("a", &[])).unwrap();
        registry.register(TestHandler::reducer("b", &[])).unwrap();
        assert!(registry.unregister("a").unwrap());
        assert!(registry.unregister("b").unwrap());

        let open = registry.lock_open();
        assert!(open.by_id.is_empty());
        assert!(open.by_category.is_empty());
    }

    #[test]
    fn reregistration_gets_a_new_registration_id() {
        let registry = HandlerRegistry::new();
        let first = registry.register(TestHandler::reducer("a", &[])).unwrap();
        assert!(registry.unregister("a").unwrap());
        let second = registry.register(TestHandler::reducer("a", &[])).unwrap();
        assert_ne!(first, second);

        registry.freeze();
        let entry = registry.lookup_by_id("a").unwrap().unwrap();
        assert_eq!(entry.registration_id(), second);
        assert_eq!(registry.lookup(MessageCategory::Event, None).unwrap().len(), 1);
    }

    #[test]
    fn freeze_releases_the_open_index() {
        let registry = HandlerRegistry::new();
        registry.register(TestHandler::reducer("a", &[])).unwrap();
        registry.freeze();

        assert_eq!(registry.lock_open().len(), 0);
        assert_eq!(registry.handler_count(), 1);
        assert_eq!(registry.state(), RegistryState::Frozen);
    }

    #[test]
    fn custom_validator_is_consulted() {
        let registry = HandlerRegistry::with_validator(|category: MessageCategory, node_kind: NodeKind| {
            ValidationResult::denied(format!("{category} -> {node_kind} is closed"))
        });
        let err = registry
            .register(TestHandler::reducer("a", &[]))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::ValidationFailed {
                handler_id: "a".to_string(),
                category: MessageCategory::Event,
                node_kind: NodeKind::Reducer,
                rationale: "EVENT -> REDUCER is closed".to_string(),
            }
        );
        assert_eq!(registry.handler_count(), 0);
    }

    #[test]
    fn entries_are_grouped_by_category() {
        let registry = HandlerRegistry::new();
        registry
            .register(TestHandler {
                id: "ship",
                category: MessageCategory::Command,
                node_kind: NodeKind::Effect,
                types: &[],
            })
            .unwrap();
        registry.register(TestHandler::reducer("count", &[])).unwrap();
        registry
            .register(TestHandler {
                id: "saga",
                category: MessageCategory::Event,
                node_kind: NodeKind::Orchestrator,
                types: &[],
            })
            .unwrap();
        registry.freeze();

        assert_eq!(registry.handler_ids().unwrap(), ["count", "saga", "ship"]);
    }
}
