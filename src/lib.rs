#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]
#![deny(unused_must_use)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod dispatch;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod shape;

pub use dispatch::Dispatcher;
pub use handler::{Handler, HandlerDescriptor};
#[cfg(feature = "macros")]
pub use switchyard_macros::HandlerDescriptor;
pub use registry::HandlerRegistry;

/// Commonly used types and traits for writing and registering handlers.
pub mod prelude {
    pub use futures::future::{BoxFuture, FutureExt};

    pub use crate::dispatch::{DispatchReport, Dispatcher, HandlerReport};
    pub use crate::error::{BoxError, HandlerFailure, RegistryError};
    pub use crate::handler::{
        Handler, HandlerDescriptor, HandlerOutput, HandlerResult, MessageTypes, NodeKind,
    };
    pub use crate::message::{Envelope, MessageCategory};
    pub use crate::registry::{HandlerRegistry, RegistrationId, RegistryEntry, RegistryState};
    pub use crate::shape::{ShapePolicy, ShapeRule, ShapeValidator, ValidationResult};
    #[cfg(feature = "macros")]
    pub use switchyard_macros::HandlerDescriptor;
}
