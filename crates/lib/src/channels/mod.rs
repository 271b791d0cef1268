//! Messaging channels (WhatsApp Cloud API).
//!
//! Inbound webhook bodies are parsed into [`InboundParse`]; replies go out through a
//! [`ChannelHandle`] so the relay can be exercised without the provider.

mod inbound;
pub mod whatsapp;

use async_trait::async_trait;

pub use inbound::{InboundMessage, InboundParse, NotApplicable};
pub use whatsapp::WhatsAppChannel;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel not configured: {0}")]
    NotConfigured(&'static str),
    #[error("send request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("send failed: {status} {body}")]
    Api { status: u16, body: String },
}

/// Outbound side of a channel.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "whatsapp").
    fn id(&self) -> &str;
    /// Send one text message to a recipient. No retry.
    async fn send_message(&self, recipient: &str, text: &str) -> Result<(), ChannelError>;
}
