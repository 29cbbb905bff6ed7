//! handler: the invocation boundary of the counter service.
//!
//! A `CounterHandler` turns an [`Invocation`] into a [`ResponseEnvelope`] by
//! running one increment. Every failure is caught here and mapped onto the
//! envelope's status and a generic error message; details go to the log.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use atomic_counter::{handler, CounterConfig, CounterStore, InMemoryCounterBackend};
//!
//! let store = CounterStore::new(InMemoryCounterBackend::new(), CounterConfig::new("visitors"));
//! let handler = Arc::new(handler::CounterHandler::new(store));
//!
//! // Direct invocation
//! let envelope = handler.handle(handler::Invocation::new()).await;
//!
//! // HTTP transport (requires "http" feature)
//! // handler::serve(handler, "0.0.0.0:3000").await?;
//! ```

mod envelope;
mod error;

use tracing::{debug, instrument};

use crate::counter::{CounterBackend, CounterStore};

pub use envelope::{Invocation, ResponseEnvelope};
pub use error::{error_envelope, public_message, status_code};

// HTTP transport (requires "http" feature)
#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::{router, serve};

/// Runs one increment per invocation.
pub struct CounterHandler<B> {
    store: CounterStore<B>,
}

impl<B: CounterBackend> CounterHandler<B> {
    pub fn new(store: CounterStore<B>) -> Self {
        Self { store }
    }

    /// Handle one invocation. Never fails: errors become error envelopes.
    #[instrument(skip_all)]
    pub async fn handle(&self, invocation: Invocation) -> ResponseEnvelope {
        debug!(payload = %invocation.payload, "invocation received");

        match self.store.increment().await {
            Ok(count) => ResponseEnvelope::count(count),
            Err(e) => error_envelope(&e),
        }
    }

    pub fn store(&self) -> &CounterStore<B> {
        &self.store
    }
}
