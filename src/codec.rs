//! Wire codec for the frame format `COMMAND|SIGNATURE|TIMESTAMP|TYPE|VALUE`.
//!
//! Frames travel as UTF-8 text. The first four fields are strict and may not
//! contain the delimiter; the trailing `VALUE` field is taken verbatim, so
//! payload text containing `|` survives the round trip byte for byte.

/// Field separator in the wire text.
pub const DELIMITER: char = '|';

/// Payload type token for plain text.
pub const KIND_TEXT: &str = "text";

/// Payload type token for JSON.
pub const KIND_JSON: &str = "json";

/// One protocol message in its wire shape.
///
/// Every field is the raw wire token, untouched by parsing, so the signer
/// input (`timestamp|kind|value`) is byte-exact between sender and receiver.
/// Validation of the tokens happens downstream in the responder pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub signature: String,
    /// Milliseconds since the Unix epoch, sender's clock, as a decimal token.
    pub timestamp: String,
    /// Payload type token, `text` or `json` for well-formed frames.
    pub kind: String,
    /// Raw payload text; JSON payloads are still undecoded here.
    pub value: String,
}

impl Frame {
    /// The portion of the frame covered by the signature.
    pub fn signed_portion(&self) -> String {
        format!("{}|{}|{}", self.timestamp, self.kind, self.value)
    }
}

/// Encodes a frame into its wire text.
pub fn encode(frame: &Frame) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        frame.command, frame.signature, frame.timestamp, frame.kind, frame.value
    )
}

/// Decodes wire text into a frame, best effort.
///
/// Never fails: missing tokens decode to empty fields and are left for the
/// validation pipeline to reject. Surrounding whitespace is trimmed before
/// splitting; only the four leading fields are split, the remainder becomes
/// `value` verbatim.
pub fn decode(wire: &str) -> Frame {
    let mut tokens = wire.trim().splitn(5, DELIMITER);
    let mut next = || tokens.next().unwrap_or_default().to_string();
    Frame {
        command: next(),
        signature: next(),
        timestamp: next(),
        kind: next(),
        value: next(),
    }
}
