//! Handler traits and the metadata the registry routes on.
//!
//! A handler is split along its capabilities. [`HandlerDescriptor`] identifies and classifies the handler
//! and declares which message types it accepts; it is all the registry ever reads. [`Handler`] adds the
//! execution entry point, which only the dispatcher calls.
//!
//! The descriptor half can be derived:
//!
//! ```
//! use switchyard::prelude::*;
//!
//! #[derive(HandlerDescriptor)]
//! #[handler(id = "user_projection", category = event, node_kind = reducer, message_types("UserCreated"))]
//! struct UserProjection;
//!
//! impl Handler for UserProjection {
//!     fn handle<'a>(&'a self, _envelope: &'a Envelope) -> BoxFuture<'a, HandlerResult> {
//!         async move { Ok(HandlerOutput::none()) }.boxed()
//!     }
//! }
//!
//! assert_eq!(UserProjection.handler_id(), "user_projection");
//! assert!(UserProjection.message_types().accepts("UserCreated"));
//! ```

use std::{collections::BTreeSet, fmt, str::FromStr};

use futures::future::BoxFuture;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    error::{BoxError, RegistryError},
    message::{Envelope, MessageCategory},
};

/// Result returned by [`Handler::handle`].
pub type HandlerResult = Result<HandlerOutput, BoxError>;

/// The architectural role a handler plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    /// Folds messages into state.
    Reducer,
    /// Coordinates work across other nodes.
    Orchestrator,
    /// Performs side effects against the outside world.
    Effect,
    /// Pure computation.
    Compute,
}

impl NodeKind {
    /// Every node kind, in declaration order.
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Reducer,
        NodeKind::Orchestrator,
        NodeKind::Effect,
        NodeKind::Compute,
    ];

    /// Returns the canonical upper case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Reducer => "REDUCER",
            NodeKind::Orchestrator => "ORCHESTRATOR",
            NodeKind::Effect => "EFFECT",
            NodeKind::Compute => "COMPUTE",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                RegistryError::invalid_parameter(
                    "node_kind",
                    None,
                    format!("unrecognized node kind '{s}'"),
                )
            })
    }
}

/// The set of message type names a handler accepts.
///
/// An empty set accepts every message type within the handler's category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageTypes(BTreeSet<String>);

impl MessageTypes {
    /// Creates an empty set, accepting every message type.
    pub fn any() -> Self {
        MessageTypes(BTreeSet::new())
    }

    /// Returns `true` if this set accepts every message type.
    pub fn accepts_any(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if a message of type `message_type` is accepted.
    pub fn accepts(&self, message_type: &str) -> bool {
        self.accepts_any() || self.0.contains(message_type)
    }

    /// Returns `true` if `message_type` is listed explicitly.
    pub fn contains(&self, message_type: &str) -> bool {
        self.0.contains(message_type)
    }

    /// Adds a message type name.
    pub fn insert(&mut self, message_type: impl Into<String>) -> bool {
        self.0.insert(message_type.into())
    }

    /// The number of explicitly listed types.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no types are listed, see [`MessageTypes::accepts_any`].
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the listed type names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for MessageTypes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        MessageTypes(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for MessageTypes {
    fn from(types: [S; N]) -> Self {
        types.into_iter().collect()
    }
}

impl fmt::Display for MessageTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.accepts_any() {
            write!(f, "*")
        } else {
            write!(f, "{{{}}}", self.0.iter().join(", "))
        }
    }
}

/// Identifies and classifies a handler.
///
/// These are the only members the registry reads. Values must be stable for the lifetime of the handler.
pub trait HandlerDescriptor: Send + Sync + 'static {
    /// Unique, non-empty identifier of the handler.
    fn handler_id(&self) -> &str;

    /// The message category this handler processes.
    fn category(&self) -> MessageCategory;

    /// The architectural role this handler implements.
    fn node_kind(&self) -> NodeKind;

    /// The message types this handler accepts.
    ///
    /// Defaults to accepting every type within [`HandlerDescriptor::category`].
    fn message_types(&self) -> MessageTypes {
        MessageTypes::any()
    }
}

/// A handler that can execute envelopes.
///
/// `handle` may run concurrently for different envelopes. Handlers that share mutable state must synchronize
/// it themselves.
pub trait Handler: HandlerDescriptor {
    /// Processes an envelope.
    fn handle<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, HandlerResult>;
}

/// The output produced by a handler.
#[derive(Clone, Debug, Default)]
pub struct HandlerOutput {
    emitted: Vec<Envelope>,
}

impl HandlerOutput {
    /// An output emitting nothing.
    pub fn none() -> Self {
        HandlerOutput::default()
    }

    /// An output emitting a single envelope.
    pub fn emit(envelope: Envelope) -> Self {
        HandlerOutput {
            emitted: vec![envelope],
        }
    }

    /// Adds an emitted envelope.
    pub fn and_emit(mut self, envelope: Envelope) -> Self {
        self.emitted.push(envelope);
        self
    }

    /// The envelopes emitted by the handler, in emission order.
    pub fn emitted(&self) -> &[Envelope] {
        &self.emitted
    }

    /// Consumes the output, returning the emitted envelopes.
    pub fn into_emitted(self) -> Vec<Envelope> {
        self.emitted
    }
}

/// Checks the value-level invariants of a descriptor before it is registered.
///
/// Takes values already read from the descriptor, so the checked values are the ones that get stored.
/// Checked in order: the handler id, the descriptor's own message types, then the override set if given.
pub(crate) fn check_descriptor(
    handler_id: &str,
    message_types: &MessageTypes,
    message_types_override: Option<&MessageTypes>,
) -> Result<(), RegistryError> {
    if handler_id.trim().is_empty() {
        return Err(RegistryError::invalid_parameter(
            "handler_id",
            None,
            "handler id must be a non-empty string",
        ));
    }

    check_message_types(handler_id, "message_types", message_types)?;
    if let Some(types) = message_types_override {
        check_message_types(handler_id, "message_types_override", types)?;
    }

    Ok(())
}

fn check_message_types(
    handler_id: &str,
    parameter: &'static str,
    types: &MessageTypes,
) -> Result<(), RegistryError> {
    if types.iter().any(|name| name.trim().is_empty()) {
        return Err(RegistryError::invalid_parameter(
            parameter,
            Some(handler_id),
            "message type names must be non-empty strings",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_types_accept_everything() {
        let types = MessageTypes::any();
        assert!(types.accepts_any());
        assert!(types.accepts("AnythingAtAll"));
        assert!(!types.contains("AnythingAtAll"));
        assert_eq!(types.to_string(), "*");
    }

    #[test]
    fn listed_types_only_accept_members() {
        let types = MessageTypes::from(["UserCreated", "UserRenamed"]);
        assert!(types.accepts("UserCreated"));
        assert!(!types.accepts("UserDeleted"));
        assert_eq!(types.len(), 2);
        assert_eq!(types.to_string(), "{UserCreated, UserRenamed}");
    }

    #[test]
    fn node_kind_round_trips_through_text() {
        for kind in NodeKind::ALL {
            assert_eq!(kind.to_string().parse::<NodeKind>(), Ok(kind));
        }
        assert!(matches!(
            "gateway".parse::<NodeKind>(),
            Err(RegistryError::InvalidParameter {
                parameter: "node_kind",
                ..
            })
        ));
    }

    #[test]
    fn blank_handler_id_is_rejected() {
        for id in ["", "   "] {
            let err = check_descriptor(id, &MessageTypes::any(), None).unwrap_err();
            assert!(matches!(
                err,
                RegistryError::InvalidParameter {
                    parameter: "handler_id",
                    ..
                }
            ));
        }
    }

    #[test]
    fn blank_message_type_is_rejected() {
        let types = MessageTypes::from(["UserCreated", ""]);
        let err = check_descriptor("projection", &types, None).unwrap_err();
        assert_eq!(err.handler_id(), Some("projection"));
        assert!(matches!(
            err,
            RegistryError::InvalidParameter {
                parameter: "message_types",
                ..
            }
        ));

        let types = MessageTypes::any();
        let err = check_descriptor("projection", &types, Some(&MessageTypes::from([" "]))).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidParameter {
                parameter: "message_types_override",
                ..
            }
        ));
    }
}
