//! Typed observer registry for responder events.
//!
//! Each event type carries its own subscriber list. Subscribers are invoked
//! synchronously by the dispatch task, in registration order.

use std::net::SocketAddr;

use parking_lot::Mutex;

use crate::error::RecvFailure;
use crate::responder::InboundMessage;

type OpenedHandler = Box<dyn Fn() + Send + Sync>;
type MessageHandler = Box<dyn Fn(&InboundMessage, SocketAddr) + Send + Sync>;
type ErrorHandler = Box<dyn Fn(&RecvFailure) + Send + Sync>;
type ClosedHandler = Box<dyn Fn() + Send + Sync>;

/// Subscriber lists for the four responder events.
#[derive(Default)]
pub struct EventRegistry {
    opened: Mutex<Vec<OpenedHandler>>,
    message: Mutex<Vec<MessageHandler>>,
    error: Mutex<Vec<ErrorHandler>>,
    closed: Mutex<Vec<ClosedHandler>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_opened(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.opened.lock().push(Box::new(handler));
    }

    pub fn on_message(
        &self,
        handler: impl Fn(&InboundMessage, SocketAddr) + Send + Sync + 'static,
    ) {
        self.message.lock().push(Box::new(handler));
    }

    pub fn on_error(&self, handler: impl Fn(&RecvFailure) + Send + Sync + 'static) {
        self.error.lock().push(Box::new(handler));
    }

    pub fn on_closed(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.closed.lock().push(Box::new(handler));
    }

    pub fn emit_opened(&self) {
        for handler in self.opened.lock().iter() {
            handler();
        }
    }

    pub fn emit_message(&self, message: &InboundMessage, sender: SocketAddr) {
        for handler in self.message.lock().iter() {
            handler(message, sender);
        }
    }

    /// Emits to `error` subscribers; with zero subscribers this is a no-op.
    /// Returns whether anyone observed the failure.
    pub fn emit_error(&self, failure: &RecvFailure) -> bool {
        let handlers = self.error.lock();
        for handler in handlers.iter() {
            handler(failure);
        }
        !handlers.is_empty()
    }

    pub fn emit_closed(&self) {
        for handler in self.closed.lock().iter() {
            handler();
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("opened", &self.opened.lock().len())
            .field("message", &self.message.lock().len())
            .field("error", &self.error.lock().len())
            .field("closed", &self.closed.lock().len())
            .finish()
    }
}
