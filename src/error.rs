//! Defines error handling constructs for switchyard.
//!
//! [`RegistryError`] covers every way a registry operation can be refused. Each variant carries enough
//! context (handler id, category, node kind, rationale) for the caller to log an actionable diagnostic
//! without inspecting registry internals. Errors are always returned at the point of detection and a
//! refused operation never leaves partial state behind.
//!
//! [`HandlerFailure`] describes what went wrong when a dispatched handler did not produce an output.

use std::{
    any::Any,
    borrow::Cow,
    error, fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    handler::NodeKind,
    message::MessageCategory,
    registry::{RegistrationId, RegistryState},
};

/// A dyn boxed error.
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// An error returned by [`HandlerRegistry`](crate::registry::HandlerRegistry) operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// A supplied argument failed a structural precondition.
    InvalidParameter {
        /// The name of the offending parameter, eg. `handler_id`.
        parameter: &'static str,
        /// The handler the parameter belongs to, when known.
        handler_id: Option<String>,
        /// What is wrong with the value.
        reason: Cow<'static, str>,
    },
    /// The (category, node kind) pair is not a permitted execution shape.
    ValidationFailed {
        /// The handler being registered.
        handler_id: String,
        /// The category the handler declared.
        category: MessageCategory,
        /// The node kind the handler declared.
        node_kind: NodeKind,
        /// The shape validator's explanation.
        rationale: String,
    },
    /// A handler with the same id is already registered.
    DuplicateRegistration {
        /// The conflicting handler id.
        handler_id: String,
        /// The registration currently holding the id.
        existing: RegistrationId,
    },
    /// The operation is not permitted in the registry's current lifecycle phase.
    InvalidState {
        /// The refused operation, eg. `register` or `lookup`.
        operation: &'static str,
        /// The phase the registry was in.
        state: RegistryState,
    },
}

impl RegistryError {
    pub(crate) fn invalid_parameter(
        parameter: &'static str,
        handler_id: Option<&str>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        RegistryError::InvalidParameter {
            parameter,
            handler_id: handler_id.map(ToOwned::to_owned),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, state: RegistryState) -> Self {
        RegistryError::InvalidState { operation, state }
    }

    /// Returns the handler id this error refers to, if any.
    pub fn handler_id(&self) -> Option<&str> {
        match self {
            RegistryError::InvalidParameter { handler_id, .. } => handler_id.as_deref(),
            RegistryError::ValidationFailed { handler_id, .. }
            | RegistryError::DuplicateRegistration { handler_id, .. } => Some(handler_id),
            RegistryError::InvalidState { .. } => None,
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidParameter {
                parameter,
                handler_id: Some(handler_id),
                reason,
            } => write!(
                f,
                "invalid parameter '{parameter}' for handler '{handler_id}': {reason}"
            ),
            RegistryError::InvalidParameter {
                parameter,
                handler_id: None,
                reason,
            } => write!(f, "invalid parameter '{parameter}': {reason}"),
            RegistryError::ValidationFailed {
                handler_id,
                category,
                node_kind,
                rationale,
            } => write!(
                f,
                "handler '{handler_id}' has invalid execution shape {category} -> {node_kind}: {rationale}"
            ),
            RegistryError::DuplicateRegistration {
                handler_id,
                existing,
            } => write!(
                f,
                "handler '{handler_id}' is already registered ({existing})"
            ),
            RegistryError::InvalidState {
                operation,
                state: RegistryState::Frozen,
            } => write!(f, "cannot {operation}: registry is frozen"),
            RegistryError::InvalidState {
                operation,
                state: RegistryState::Open,
            } => write!(
                f,
                "cannot {operation}: registry is not frozen yet, reads are only permitted after freeze"
            ),
        }
    }
}

impl error::Error for RegistryError {}

/// Reason a dispatched handler produced no output.
#[derive(Clone)]
pub enum HandlerFailure {
    /// The handler returned an error.
    Failed(Arc<dyn error::Error + Send + Sync + 'static>),
    /// The handler panicked.
    Panicked(PanicError),
    /// The handler's task was cancelled before it completed.
    Cancelled,
}

impl From<BoxError> for HandlerFailure {
    fn from(err: BoxError) -> Self {
        HandlerFailure::Failed(Arc::from(err))
    }
}

impl fmt::Debug for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFailure::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
            HandlerFailure::Panicked(_) => write!(f, "Panicked"),
            HandlerFailure::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFailure::Failed(err) => err.fmt(f),
            HandlerFailure::Panicked(err) => err.fmt(f),
            HandlerFailure::Cancelled => write!(f, "handler cancelled"),
        }
    }
}

impl error::Error for HandlerFailure {}

/// A shared error holding the payload of a handler panic.
#[derive(Clone)]
#[allow(missing_debug_implementations)]
pub struct PanicError(Arc<Mutex<Box<dyn Any + Send>>>);

impl PanicError {
    /// Creates a new PanicError from a panic payload.
    pub fn new_boxed(payload: Box<dyn Any + Send>) -> Self {
        PanicError(Arc::new(Mutex::new(payload)))
    }

    /// Calls the passed closure `f` with the panic message, or `None` if the payload is not a string.
    pub fn with_str<F, R>(
        &self,
        f: F,
    ) -> Result<Option<R>, PoisonError<MutexGuard<'_, Box<dyn Any + Send>>>>
    where
        F: FnOnce(&str) -> R,
    {
        let lock = self.0.lock()?;
        Ok(lock
            .downcast_ref::<&'static str>()
            .copied()
            .or_else(|| lock.downcast_ref::<String>().map(String::as_str))
            .map(f))
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.with_str(|s| write!(f, "panicked: {s}")) {
            Ok(Some(res)) => res,
            _ => write!(f, "panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_messages_name_the_phase() {
        let err = RegistryError::invalid_state("register", RegistryState::Frozen);
        assert_eq!(err.to_string(), "cannot register: registry is frozen");

        let err = RegistryError::invalid_state("lookup", RegistryState::Open);
        assert!(err.to_string().starts_with("cannot lookup: registry is not frozen"));
        assert_eq!(err.handler_id(), None);
    }

    #[test]
    fn validation_failed_carries_shape_and_rationale() {
        let err = RegistryError::ValidationFailed {
            handler_id: "audit".to_string(),
            category: MessageCategory::Command,
            node_kind: NodeKind::Reducer,
            rationale: "no".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "handler 'audit' has invalid execution shape COMMAND -> REDUCER: no"
        );
        assert_eq!(err.handler_id(), Some("audit"));
    }

    #[test]
    fn panic_error_extracts_message() {
        let err = PanicError::new_boxed(Box::new("boom"));
        assert_eq!(err.to_string(), "panicked: boom");

        let err = PanicError::new_boxed(Box::new(String::from("owned boom")));
        assert_eq!(err.to_string(), "panicked: owned boom");

        let err = PanicError::new_boxed(Box::new(42_u32));
        assert_eq!(err.to_string(), "panicked");
    }
}
