//! Runs envelopes through the handlers a frozen registry resolves for them.
//!
//! The [`Dispatcher`] is a thin consumer of [`HandlerRegistry::lookup`]. Each matched handler runs on its own
//! tokio task, so handlers for the same envelope execute in parallel on a multi-threaded runtime. The
//! dispatcher waits for all of them and reports each outcome in lookup order. It does not retry, reorder, or
//! apply backpressure.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use switchyard::prelude::*;
//!
//! #[derive(HandlerDescriptor)]
//! #[handler(id = "greeter", category = command, node_kind = effect, message_types("Greet"))]
//! struct Greeter;
//!
//! impl Handler for Greeter {
//!     fn handle<'a>(&'a self, envelope: &'a Envelope) -> BoxFuture<'a, HandlerResult> {
//!         async move {
//!             let name = envelope.payload::<&str>().copied().unwrap_or("stranger");
//!             let greeted = Envelope::new(MessageCategory::Event, "Greeted", name.to_string());
//!             Ok(HandlerOutput::emit(greeted))
//!         }
//!         .boxed()
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let registry = HandlerRegistry::new();
//! registry.register(Greeter)?;
//! registry.freeze();
//!
//! let dispatcher = Dispatcher::new(Arc::new(registry))?;
//! let report = dispatcher
//!     .dispatch(&Envelope::new(MessageCategory::Command, "Greet", "ferris"))
//!     .await?;
//!
//! let greeted: Vec<_> = report.emitted().collect();
//! assert_eq!(greeted.len(), 1);
//! assert_eq!(greeted[0].payload::<String>().map(String::as_str), Some("ferris"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::future::join_all;
use tokio::task::{JoinError, JoinHandle};
use tracing::{trace, warn};

use crate::{
    error::{HandlerFailure, PanicError, RegistryError},
    handler::HandlerOutput,
    message::{Envelope, MessageCategory},
    registry::{HandlerRegistry, RegistryState},
};

/// Dispatches envelopes to the handlers of a frozen [`HandlerRegistry`].
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over a frozen registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidState`] if the registry has not been frozen.
    pub fn new(registry: Arc<HandlerRegistry>) -> Result<Self, RegistryError> {
        if !registry.is_frozen() {
            return Err(RegistryError::invalid_state(
                "dispatch",
                RegistryState::Open,
            ));
        }

        Ok(Dispatcher { registry })
    }

    /// The registry handlers are resolved from.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Runs `envelope` through every handler registered for its category and message type.
    ///
    /// Must be called from within a tokio runtime. A failing or panicking handler does not affect the
    /// others, its failure is recorded in the returned report.
    ///
    /// Dropping the returned future before it completes aborts every handler task it spawned.
    ///
    /// # Errors
    ///
    /// Only fails if the registry lookup fails.
    pub async fn dispatch(&self, envelope: &Envelope) -> Result<DispatchReport, RegistryError> {
        let entries = self
            .registry
            .lookup(envelope.category(), Some(envelope.message_type()))?;
        trace!(
            category = %envelope.category(),
            message_type = envelope.message_type(),
            handlers = entries.len(),
            "dispatching envelope"
        );

        let mut handler_ids = Vec::with_capacity(entries.len());
        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            let handler = Arc::clone(entry.handler());
            let envelope = envelope.clone();
            handler_ids.push(entry.handler_id().to_owned());
            tasks.push(AbortOnDrop(tokio::spawn(async move {
                handler.handle(&envelope).await
            })));
        }

        let reports = handler_ids
            .into_iter()
            .zip(join_all(tasks).await)
            .map(|(handler_id, joined)| {
                let outcome = match joined {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(err)) => Err(HandlerFailure::from(err)),
                    Err(err) if err.is_panic() => Err(HandlerFailure::Panicked(
                        PanicError::new_boxed(err.into_panic()),
                    )),
                    Err(_) => Err(HandlerFailure::Cancelled),
                };
                if let Err(failure) = &outcome {
                    warn!(%handler_id, %failure, "handler failed");
                }

                HandlerReport {
                    handler_id,
                    outcome,
                }
            })
            .collect();

        Ok(DispatchReport {
            category: envelope.category(),
            message_type: envelope.message_type().to_owned(),
            reports,
        })
    }
}

/// A spawned handler task which is aborted if dropped before it completes.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The outcome of a single handler.
#[derive(Clone, Debug)]
pub struct HandlerReport {
    handler_id: String,
    outcome: Result<HandlerOutput, HandlerFailure>,
}

impl HandlerReport {
    /// The handler that produced this outcome.
    pub fn handler_id(&self) -> &str {
        &self.handler_id
    }

    /// The handler's output, or why it failed.
    pub fn outcome(&self) -> Result<&HandlerOutput, &HandlerFailure> {
        self.outcome.as_ref()
    }

    /// Returns `true` if the handler produced an output.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// The combined outcome of dispatching an envelope.
#[derive(Clone, Debug)]
pub struct DispatchReport {
    category: MessageCategory,
    message_type: String,
    reports: Vec<HandlerReport>,
}

impl DispatchReport {
    /// The dispatched envelope's category.
    pub fn category(&self) -> MessageCategory {
        self.category
    }

    /// The dispatched envelope's message type.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// One report per matched handler, in lookup order.
    pub fn reports(&self) -> &[HandlerReport] {
        &self.reports
    }

    /// Returns `true` if no handler matched the envelope.
    pub fn is_unhandled(&self) -> bool {
        self.reports.is_empty()
    }

    /// Returns `true` if every matched handler produced an output.
    pub fn is_success(&self) -> bool {
        self.reports.iter().all(HandlerReport::is_ok)
    }

    /// Envelopes emitted by successful handlers, in lookup then emission order.
    pub fn emitted(&self) -> impl Iterator<Item = &Envelope> {
        self.reports
            .iter()
            .filter_map(|report| report.outcome.as_ref().ok())
            .flat_map(HandlerOutput::emitted)
    }

    /// Reports of handlers that failed.
    pub fn failures(&self) -> impl Iterator<Item = &HandlerReport> {
        self.reports.iter().filter(|report| !report.is_ok())
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} handled, {} failed",
            self.category,
            self.message_type,
            self.reports.len(),
            self.failures().count()
        )
    }
}
