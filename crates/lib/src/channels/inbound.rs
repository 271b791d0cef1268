//! Inbound message from a channel: handed to the dispatcher for relay handling.

/// A text message from a sender, to be answered by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender identifier; replies go back to the same id.
    pub sender_id: String,
    /// Provider message id, when present (logging only).
    pub message_id: Option<String>,
    pub text: String,
}

/// Why an inbound payload produced no message. None of these are errors for the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotApplicable {
    /// Body was not JSON of the expected shape.
    Malformed(String),
    /// No message at the expected path (e.g. delivery status updates).
    NoMessage,
    /// Message type other than text (image, audio, reaction, ...).
    UnsupportedType(String),
    /// Text message without a sender or body.
    MissingField(&'static str),
}

impl std::fmt::Display for NotApplicable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotApplicable::Malformed(e) => write!(f, "malformed payload: {}", e),
            NotApplicable::NoMessage => write!(f, "no message in payload"),
            NotApplicable::UnsupportedType(t) => write!(f, "unsupported message type: {}", t),
            NotApplicable::MissingField(name) => write!(f, "message missing {}", name),
        }
    }
}

/// Result of extracting a message from a webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundParse {
    Message(InboundMessage),
    NotApplicable(NotApplicable),
}
