//! WhatsApp channel: Cloud API webhook payloads, handshake check, and sendMessage.

use crate::channels::inbound::{InboundMessage, InboundParse, NotApplicable};
use crate::channels::{ChannelError, ChannelHandle};
use crate::config::{self, Config};
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

/// Webhook notification body. Only the path down to `messages` is typed; other fields
/// are ignored whatever their shape. Every level is optional so a missing message surfaces
/// as [`NotApplicable`] instead of a deserialization error.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub value: Option<WebhookValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookValue {
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub text: Option<WebhookText>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookText {
    #[serde(default)]
    pub body: Option<String>,
}

impl WebhookPayload {
    /// The message the provider delivers at `entry[0].changes[0].value.messages[0]`.
    pub fn first_message(&self) -> Option<&WebhookMessage> {
        self.entry
            .first()?
            .changes
            .first()?
            .value
            .as_ref()?
            .messages
            .first()
    }

    /// Extract the single text message, or say why there is none.
    pub fn into_inbound(self) -> InboundParse {
        let Some(msg) = self.first_message() else {
            return InboundParse::NotApplicable(NotApplicable::NoMessage);
        };
        match msg.message_type.as_deref() {
            Some("text") => {}
            Some(other) => {
                return InboundParse::NotApplicable(NotApplicable::UnsupportedType(
                    other.to_string(),
                ))
            }
            None => return InboundParse::NotApplicable(NotApplicable::MissingField("type")),
        }
        let Some(sender_id) = msg.from.clone() else {
            return InboundParse::NotApplicable(NotApplicable::MissingField("from"));
        };
        let Some(text) = msg.text.as_ref().and_then(|t| t.body.clone()) else {
            return InboundParse::NotApplicable(NotApplicable::MissingField("text.body"));
        };
        InboundParse::Message(InboundMessage {
            sender_id,
            message_id: msg.id.clone(),
            text,
        })
    }
}

/// Parse a raw webhook body. Never fails: anything unusable is `NotApplicable`.
pub fn parse_webhook(body: &[u8]) -> InboundParse {
    match serde_json::from_slice::<WebhookPayload>(body) {
        Ok(payload) => payload.into_inbound(),
        Err(e) => InboundParse::NotApplicable(NotApplicable::Malformed(e.to_string())),
    }
}

/// Handshake query parameters (`hub.mode`, `hub.verify_token`, `hub.challenge`).
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Handshake rejected: wrong mode, wrong token, or no token configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("webhook verification failed")]
pub struct Forbidden;

/// Returns the challenge to echo iff mode is "subscribe" and the token matches `expected`.
pub fn verify_handshake(params: &VerifyParams, expected: Option<&str>) -> Result<String, Forbidden> {
    let expected = expected.ok_or(Forbidden)?;
    if params.mode.as_deref() != Some("subscribe") {
        return Err(Forbidden);
    }
    if params.verify_token.as_deref() != Some(expected) {
        return Err(Forbidden);
    }
    Ok(params.challenge.clone().unwrap_or_default())
}

/// WhatsApp Cloud API connector for outbound text messages.
pub struct WhatsAppChannel {
    id: String,
    api_base: String,
    api_version: String,
    phone_number_id: Option<String>,
    access_token: Option<Secret<String>>,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(
        api_base: impl Into<String>,
        api_version: impl Into<String>,
        phone_number_id: Option<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            id: "whatsapp".to_string(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
            phone_number_id,
            access_token: access_token.map(Secret::new),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config::resolve_whatsapp_api_base(config),
            config::resolve_whatsapp_api_version(config),
            config.whatsapp.phone_number_id.clone(),
            config.whatsapp.access_token.clone(),
        )
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!(
            "{}/{}/{}/messages",
            self.api_base, self.api_version, phone_number_id
        )
    }

    /// POST /{version}/{phone_number_id}/messages with a text body.
    pub async fn send_text(&self, to: &str, text: &str) -> Result<(), ChannelError> {
        let phone_number_id = self
            .phone_number_id
            .as_deref()
            .ok_or(ChannelError::NotConfigured("whatsapp phone number id"))?;
        let token = self
            .access_token
            .as_ref()
            .ok_or(ChannelError::NotConfigured("whatsapp access token"))?;
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": text },
        });
        let res = self
            .client
            .post(self.messages_url(phone_number_id))
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api { status, body });
        }
        log::info!("whatsapp: message sent to {}", to);
        Ok(())
    }
}

#[async_trait]
impl ChannelHandle for WhatsAppChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        self.send_text(recipient, text).await
    }
}
