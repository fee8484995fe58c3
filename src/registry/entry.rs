use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::{
    handler::{Handler, MessageTypes, NodeKind},
    message::MessageCategory,
};

static REGISTRATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A process-wide unique token identifying a single registration.
///
/// Re-registering a handler id after unregistering it always yields a new `RegistrationId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(u64);

impl RegistrationId {
    /// Generates a new `RegistrationId` with an automatically incremented sequence number.
    pub(crate) fn generate() -> Self {
        RegistrationId(REGISTRATION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the sequence number of the registration.
    pub fn sequence_id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registration #{}", self.0)
    }
}

/// A registered handler together with its routing metadata.
///
/// The metadata is read from the handler once at registration time. `message_types` is the effective set,
/// which is the override supplied to the registry if there was one.
pub struct RegistryEntry {
    registration_id: RegistrationId,
    handler_id: String,
    category: MessageCategory,
    node_kind: NodeKind,
    message_types: MessageTypes,
    handler: Arc<dyn Handler>,
}

impl RegistryEntry {
    pub(crate) fn new(
        handler: Arc<dyn Handler>,
        handler_id: String,
        category: MessageCategory,
        node_kind: NodeKind,
        message_types: MessageTypes,
    ) -> Self {
        RegistryEntry {
            registration_id: RegistrationId::generate(),
            handler_id,
            category,
            node_kind,
            message_types,
            handler,
        }
    }

    /// The registration token.
    pub fn registration_id(&self) -> RegistrationId {
        self.registration_id
    }

    /// The handler's id.
    pub fn handler_id(&self) -> &str {
        &self.handler_id
    }

    /// The category the handler is registered under.
    pub fn category(&self) -> MessageCategory {
        self.category
    }

    /// The handler's node kind.
    pub fn node_kind(&self) -> NodeKind {
        self.node_kind
    }

    /// The effective message types.
    pub fn message_types(&self) -> &MessageTypes {
        &self.message_types
    }

    /// The registered handler.
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Returns `true` if this entry matches a lookup for `message_type`.
    ///
    /// `None` matches every entry.
    pub fn accepts(&self, message_type: Option<&str>) -> bool {
        match message_type {
            Some(message_type) => self.message_types.accepts(message_type),
            None => true,
        }
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("registration_id", &self.registration_id)
            .field("handler_id", &self.handler_id)
            .field("category", &self.category)
            .field("node_kind", &self.node_kind)
            .field("message_types", &self.message_types)
            .finish_non_exhaustive()
    }
}
