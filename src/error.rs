//! Two-tier error taxonomy.
//!
//! Received frames that fail validation produce a [`Rejection`]: an expected,
//! non-fatal outcome under noisy or adversarial traffic, delivered through
//! the `error` event channel and never allowed to stop the receive loop.
//! Everything else — API misuse and socket-level faults — is an error in the
//! ordinary sense and surfaces as a failed call or a terminated loop.

use std::net::SocketAddr;

use thiserror::Error;

use crate::codec::Frame;

/// Validation failure on a received frame.
///
/// The variants mirror the pipeline stages in order: signature, freshness,
/// payload type, payload content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The signature did not match the HMAC recomputed with the local secret.
    #[error("message received but had an invalid signature")]
    InvalidSignature,
    /// The frame is older than the configured TTL window.
    #[error("message received but expired {overage_ms} milliseconds ago")]
    Expired { overage_ms: u64 },
    /// The payload type token is not one this protocol implements.
    #[error("message received but the data type `{0}` is unimplemented")]
    UnknownDataType(String),
    /// The payload declared itself `json` but did not parse.
    #[error("message received with invalid JSON content that could not be parsed")]
    InvalidDataType,
}

/// Socket-level failures owned by the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),
    #[error("receive failed: {0}")]
    Recv(#[source] std::io::Error),
    #[error("transport is not open")]
    NotOpen,
    #[error("transport is already open")]
    AlreadyOpen,
    #[error("transport is closed")]
    Closed,
}

/// Failures of responder calls.
///
/// These indicate misuse of the API or an environment fault, never a
/// network-origin condition; network-origin conditions are [`Rejection`]s.
#[derive(Debug, Error)]
pub enum ResponderError {
    /// `broadcast` was called without a command.
    #[error("a command must be specified when sending a message")]
    CommandEmpty,
    /// The command contains the field delimiter and cannot be framed.
    #[error("the command may not contain the `|` delimiter")]
    CommandInvalid,
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// A failure delivered to `error` event subscribers.
///
/// Rejections always carry the partially decoded frame and the sender
/// address. Faults originate inside the receive loop and carry neither.
#[derive(Debug)]
pub enum RecvFailure {
    Rejection {
        rejection: Rejection,
        frame: Frame,
        sender: SocketAddr,
    },
    Fault(TransportError),
}
