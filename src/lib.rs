//! Authenticated broadcast protocol over UDP multicast.
//!
//! Peers on a local network exchange signed, timestamped messages with no
//! central server. Every frame carries an HMAC-SHA256 tag keyed by a shared
//! secret and a sender timestamp checked against a freshness window; frames
//! that fail validation are surfaced as non-fatal rejections. UDP stays
//! best-effort: no ordering, no delivery guarantees, no payload encryption.
//!
//! ```no_run
//! use groupcast::{Config, Payload, Responder};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     secret: "shared-secret".into(),
//!     ..Config::default()
//! };
//! let (responder, warnings) = Responder::new(config)?;
//! assert!(warnings.is_empty());
//!
//! responder.on_message(|message, sender| {
//!     println!("{} from {}: {:?}", message.command, sender, message.payload);
//! });
//! responder.on_error(|failure| eprintln!("{:?}", failure));
//!
//! responder.open().await?;
//! responder
//!     .broadcast("HELLO", Payload::Json(serde_json::json!({"name": "Joe"})))
//!     .await?;
//! responder.close().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod responder;
pub mod signer;
pub mod transport;

pub use codec::Frame;
pub use config::{Config, ConfigError, ConfigWarning};
pub use error::{RecvFailure, Rejection, ResponderError, TransportError};
pub use responder::{InboundMessage, Payload, Responder};
pub use transport::{DatagramTransport, MulticastTransport};
