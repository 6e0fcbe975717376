//! The responder: composes codec, signer, and transport into the public
//! protocol behavior, and owns the inbound validation pipeline.

use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec::{self, Frame, DELIMITER, KIND_JSON, KIND_TEXT};
use crate::config::{Config, ConfigError, ConfigWarning};
use crate::error::{RecvFailure, Rejection, ResponderError, TransportError};
use crate::events::EventRegistry;
use crate::signer;
use crate::transport::{DatagramTransport, MulticastTransport};

/// Message payload, tagged at the API boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(serde_json::Value),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => KIND_TEXT,
            Payload::Json(_) => KIND_JSON,
        }
    }

    fn wire_value(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Json(value) => value.to_string(),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

/// A fully validated inbound message: signature verified, fresh, payload
/// decoded. Constructed per datagram and handed to `message` subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub command: String,
    /// Sender-clock milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub payload: Payload,
}

/// Runs the validation pipeline over a decoded frame, in strict order:
/// signature, freshness, payload type, payload content.
fn validate(
    frame: &Frame,
    secret: &[u8],
    ttl_ms: u64,
    now_ms: u64,
) -> Result<InboundMessage, Rejection> {
    if !signer::verify(secret, &frame.signed_portion(), &frame.signature) {
        return Err(Rejection::InvalidSignature);
    }

    // A timestamp token that does not parse can never be fresh.
    let age_ms = match frame.timestamp.parse::<u64>() {
        Ok(timestamp) => now_ms.saturating_sub(timestamp),
        Err(_) => u64::MAX,
    };
    if age_ms > ttl_ms {
        return Err(Rejection::Expired {
            overage_ms: age_ms - ttl_ms,
        });
    }

    let payload = match frame.kind.as_str() {
        KIND_TEXT => Payload::Text(frame.value.clone()),
        KIND_JSON => serde_json::from_str(&frame.value)
            .map(Payload::Json)
            .map_err(|_| Rejection::InvalidDataType)?,
        other => return Err(Rejection::UnknownDataType(other.to_string())),
    };

    Ok(InboundMessage {
        command: frame.command.clone(),
        timestamp_ms: frame.timestamp.parse().unwrap_or_default(),
        payload,
    })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Authenticated multicast responder.
///
/// Composes the codec, signer, and a [`DatagramTransport`] and exposes the
/// event surface: `opened`, `message`, `error`, `closed`. Lifecycle is
/// unopened -> open -> closed, with closed terminal.
///
/// # Guarantees
/// * Inbound datagrams are validated and dispatched in delivery order by a
///   single task; no reordering is introduced by this layer.
/// * Rejections of received frames go to `error` subscribers and never stop
///   the receive loop; with zero subscribers they are dropped after a trace.
/// * Misuse of `broadcast` fails the call itself, regardless of subscribers.
pub struct Responder<T: DatagramTransport + 'static = MulticastTransport> {
    config: Arc<Config>,
    transport: Arc<T>,
    events: Arc<EventRegistry>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl Responder<MulticastTransport> {
    /// Builds a responder over a real multicast socket pair.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] for configuration that can never work. A
    /// usable but insecure configuration (the placeholder secret) is returned
    /// as a [`ConfigWarning`] advisory instead; how to surface it is up to
    /// the embedding application.
    pub fn new(config: Config) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let transport = MulticastTransport::new(config.multicast_addr, config.port);
        Self::with_transport(config, transport)
    }
}

impl<T: DatagramTransport + 'static> Responder<T> {
    /// Builds a responder over a caller-supplied transport.
    pub fn with_transport(
        config: Config,
        transport: T,
    ) -> Result<(Self, Vec<ConfigWarning>), ConfigError> {
        let warnings = config.validate()?;
        Ok((
            Self {
                config: Arc::new(config),
                transport: Arc::new(transport),
                events: Arc::new(EventRegistry::new()),
                recv_task: Mutex::new(None),
            },
            warnings,
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribes to the `opened` event.
    pub fn on_opened(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.events.on_opened(handler);
    }

    /// Subscribes to validated inbound messages.
    pub fn on_message(
        &self,
        handler: impl Fn(&InboundMessage, SocketAddr) + Send + Sync + 'static,
    ) {
        self.events.on_message(handler);
    }

    /// Subscribes to rejections and receive-path faults.
    pub fn on_error(&self, handler: impl Fn(&RecvFailure) + Send + Sync + 'static) {
        self.events.on_error(handler);
    }

    /// Subscribes to the `closed` event.
    pub fn on_closed(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.events.on_closed(handler);
    }

    /// Opens the transport, emits `opened`, and starts the receive pipeline.
    ///
    /// # Errors
    /// Propagates transport failures (bind, group join, reopen after close).
    pub async fn open(&self) -> Result<(), ResponderError> {
        self.transport.open().await?;
        self.events.emit_opened();

        let transport = self.transport.clone();
        let events = self.events.clone();
        let config = self.config.clone();
        let handle = tokio::spawn(async move {
            receive_loop(transport, events, config).await;
        });
        *self.recv_task.lock() = Some(handle);
        Ok(())
    }

    /// Signs and broadcasts a message to the configured multicast group.
    ///
    /// # Errors
    /// Fails synchronously with [`ResponderError::CommandEmpty`] or
    /// [`ResponderError::CommandInvalid`] on misuse, and with a transport
    /// error when the socket is not open or the send is refused. Misuse is
    /// never routed through the `error` event channel.
    pub async fn broadcast(
        &self,
        command: &str,
        payload: impl Into<Payload>,
    ) -> Result<(), ResponderError> {
        let target = SocketAddr::V4(SocketAddrV4::new(
            self.config.multicast_addr,
            self.config.port,
        ));
        self.broadcast_to(command, payload, target).await
    }

    /// Signs and sends a message to an explicit unicast or multicast target.
    pub async fn broadcast_to(
        &self,
        command: &str,
        payload: impl Into<Payload>,
        target: SocketAddr,
    ) -> Result<(), ResponderError> {
        let frame = build_frame(command, &payload.into(), self.config.secret.as_bytes())?;
        let wire = codec::encode(&frame);
        self.transport.send_to(wire.as_bytes(), target).await?;
        Ok(())
    }

    /// Closes the transport, stops the receive pipeline, and emits `closed`.
    pub async fn close(&self) {
        self.transport.close();
        let handle = self.recv_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.events.emit_closed();
    }
}

fn build_frame(command: &str, payload: &Payload, secret: &[u8]) -> Result<Frame, ResponderError> {
    if command.is_empty() {
        return Err(ResponderError::CommandEmpty);
    }
    if command.contains(DELIMITER) {
        return Err(ResponderError::CommandInvalid);
    }

    let mut frame = Frame {
        command: command.to_string(),
        signature: String::new(),
        timestamp: now_ms().to_string(),
        kind: payload.kind().to_string(),
        value: payload.wire_value(),
    };
    frame.signature = signer::sign(secret, &frame.signed_portion());
    Ok(frame)
}

async fn receive_loop<T: DatagramTransport>(
    transport: Arc<T>,
    events: Arc<EventRegistry>,
    config: Arc<Config>,
) {
    loop {
        match transport.recv().await {
            Ok((bytes, sender)) => {
                let wire = String::from_utf8_lossy(&bytes);
                let frame = codec::decode(&wire);
                match validate(&frame, config.secret.as_bytes(), config.ttl_ms, now_ms()) {
                    Ok(message) => events.emit_message(&message, sender),
                    Err(rejection) => {
                        debug!(%rejection, %sender, command = %frame.command, "frame rejected");
                        events.emit_error(&RecvFailure::Rejection {
                            rejection,
                            frame,
                            sender,
                        });
                    }
                }
            }
            Err(TransportError::Closed) => break,
            Err(fault) => {
                // Receive faults are environment errors, not noise. With no
                // subscriber to carry them the loop must not keep spinning as
                // if nothing happened.
                let failure = RecvFailure::Fault(fault);
                if !events.emit_error(&failure) {
                    warn!(?failure, "receive fault with no error subscriber; stopping receive loop");
                    break;
                }
            }
        }
    }
}
