//! Message classification and the envelope handed to handlers.
//!
//! Every inbound message is wrapped in an [`Envelope`] which carries the message's [`MessageCategory`] and its
//! message type name next to an opaque payload. The registry only ever inspects the metadata; the payload is
//! for handlers to downcast.

use std::{any::Any, borrow::Cow, fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Coarse classification of a message's semantic intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageCategory {
    /// An immutable fact that is already true.
    Event,
    /// An imperative request to do something.
    Command,
    /// A desired future goal.
    Intent,
}

impl MessageCategory {
    /// Every category, in declaration order.
    pub const ALL: [MessageCategory; 3] = [
        MessageCategory::Event,
        MessageCategory::Command,
        MessageCategory::Intent,
    ];

    /// Returns the canonical upper case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageCategory::Event => "EVENT",
            MessageCategory::Command => "COMMAND",
            MessageCategory::Intent => "INTENT",
        }
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageCategory {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageCategory::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                RegistryError::invalid_parameter(
                    "category",
                    None,
                    format!("unrecognized message category '{s}'"),
                )
            })
    }
}

/// An inbound message: category and type metadata wrapped around an opaque payload.
///
/// Cloning an envelope is cheap, the payload is shared.
#[derive(Clone)]
pub struct Envelope {
    category: MessageCategory,
    message_type: Cow<'static, str>,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Envelope {
    /// Creates a new envelope carrying `payload`.
    pub fn new<T>(
        category: MessageCategory,
        message_type: impl Into<Cow<'static, str>>,
        payload: T,
    ) -> Self
    where
        T: Any + Send + Sync,
    {
        Envelope {
            category,
            message_type: message_type.into(),
            payload: Arc::new(payload),
        }
    }

    /// Creates an envelope with an empty `()` payload.
    pub fn empty(category: MessageCategory, message_type: impl Into<Cow<'static, str>>) -> Self {
        Envelope::new(category, message_type, ())
    }

    /// The message's category.
    pub fn category(&self) -> MessageCategory {
        self.category
    }

    /// The message's type name, eg. `UserCreated`.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Returns the payload downcast to `T`, or `None` if it holds another type.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    /// Returns `true` if the payload is of type `T`.
    pub fn payload_is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("category", &self.category)
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("event".parse::<MessageCategory>(), Ok(MessageCategory::Event));
        assert_eq!(" COMMAND ".parse::<MessageCategory>(), Ok(MessageCategory::Command));
        assert_eq!("Intent".parse::<MessageCategory>(), Ok(MessageCategory::Intent));
    }

    #[test]
    fn unknown_category_is_invalid_parameter() {
        let err = "query".parse::<MessageCategory>().unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidParameter {
                parameter: "category",
                handler_id: None,
                ..
            }
        ));
    }

    #[test]
    fn envelope_payload_downcasts() {
        #[derive(Debug, PartialEq)]
        struct UserCreated {
            name: &'static str,
        }

        let envelope = Envelope::new(
            MessageCategory::Event,
            "UserCreated",
            UserCreated { name: "ferris" },
        );
        assert_eq!(envelope.category(), MessageCategory::Event);
        assert_eq!(envelope.message_type(), "UserCreated");
        assert!(envelope.payload_is::<UserCreated>());
        assert_eq!(
            envelope.payload::<UserCreated>(),
            Some(&UserCreated { name: "ferris" })
        );
        assert_eq!(envelope.payload::<String>(), None);
    }
}
