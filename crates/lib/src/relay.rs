//! Conversation relay: one inbound text in, one WhatsApp reply out.
//!
//! `respond` runs the agent turn; `process` adds the apology fallback, the scheduling link
//! substitution and the outbound send. Failures are logged and never retried.

use crate::agent::{self, AgentError};
use crate::channels::{ChannelHandle, InboundMessage, WhatsAppChannel};
use crate::config::{self, Config};
use crate::dispatch::DispatchOutcome;
use crate::history::{HistoryStore, MemoryHistoryStore, RedisHistoryStore};
use crate::llm::{GeminiClient, LlmBackend};
use crate::prompt;
use crate::scheduling::SchedulingLinks;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Sent to the user when the completion (or history) call fails.
pub const APOLOGY: &str = "Desculpe, tive um problema técnico. Por favor, tente novamente.";

/// Collaborators for relaying one message. Shared across background tasks.
pub struct Relay {
    history: Arc<dyn HistoryStore>,
    backend: Arc<dyn LlmBackend>,
    channel: Arc<dyn ChannelHandle>,
    links: SchedulingLinks,
    model: String,
    system_prompt: String,
}

impl Relay {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        backend: Arc<dyn LlmBackend>,
        channel: Arc<dyn ChannelHandle>,
        links: SchedulingLinks,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            history,
            backend,
            channel,
            links,
            model: model.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Gemini backend, WhatsApp channel, Redis history (in-memory when no URL is set).
    pub fn from_config(config: &Config) -> Result<Self> {
        let history: Arc<dyn HistoryStore> = match config::resolve_history_url(config) {
            Some(url) => Arc::new(
                RedisHistoryStore::open(
                    &url,
                    config::resolve_history_key_prefix(config),
                    config.history.ttl_secs,
                )
                .context("opening history store")?,
            ),
            None => Arc::new(MemoryHistoryStore::new()),
        };
        let backend = Arc::new(GeminiClient::new(
            config::resolve_gemini_base_url(config),
            config.agent.api_key.clone(),
            config::resolve_temperature(config),
        ));
        let channel = Arc::new(WhatsAppChannel::from_config(config));
        let system_prompt = prompt::load_system_prompt(config.agent.prompt_file.as_deref());
        Ok(Self::new(
            history,
            backend,
            channel,
            SchedulingLinks::from_config(config),
            config::resolve_model(config),
            system_prompt,
        ))
    }

    /// Run the agent turn for one sender; returns the raw assistant text.
    pub async fn respond(&self, sender_id: &str, text: &str) -> Result<String, AgentError> {
        agent::run_turn(
            self.history.as_ref(),
            sender_id,
            text,
            self.backend.as_ref(),
            &self.model,
            Some(&self.system_prompt),
        )
        .await
    }

    /// Final text for the user and whether it is the apology.
    pub async fn reply_text(&self, msg: &InboundMessage) -> (String, bool) {
        match self.respond(&msg.sender_id, &msg.text).await {
            Ok(reply) => (self.links.apply(&reply).await, false),
            Err(e) => {
                log::warn!("relay: turn failed for {}: {}", msg.sender_id, e);
                (APOLOGY.to_string(), true)
            }
        }
    }

    /// Relay one inbound message end to end.
    pub async fn process(&self, msg: InboundMessage) -> DispatchOutcome {
        log::info!("relay: processing message from {}", msg.sender_id);
        let (reply, fallback) = self.reply_text(&msg).await;
        match self.channel.send_message(&msg.sender_id, &reply).await {
            Ok(()) => DispatchOutcome::Delivered { reply, fallback },
            Err(e) => {
                log::warn!(
                    "relay: {} send to {} failed: {}",
                    self.channel.id(),
                    msg.sender_id,
                    e
                );
                DispatchOutcome::SendFailed {
                    reply,
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelError;
    use crate::history::HistoryMessage;
    use crate::llm::{ChatMessage, ChatResponse, LlmError};
    use crate::scheduling::SCHEDULING_MARKER;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedBackend(Result<String, ()>);

    #[async_trait]
    impl LlmBackend for FixedBackend {
        async fn chat(&self, _model: &str, _messages: Vec<ChatMessage>) -> Result<ChatResponse, LlmError> {
            match &self.0 {
                Ok(text) => Ok(ChatResponse {
                    message: Some(ChatMessage::assistant(text.clone())),
                }),
                Err(()) => Err(LlmError::Api("500 Internal Server Error".to_string())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl ChannelHandle for RecordingChannel {
        fn id(&self) -> &str {
            "test"
        }

        async fn send_message(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), text.to_string()));
            if self.fail {
                return Err(ChannelError::Api {
                    status: 401,
                    body: "invalid token".to_string(),
                });
            }
            Ok(())
        }
    }

    fn relay_with(
        reply: Result<String, ()>,
        event_type: Option<&str>,
        channel: Arc<RecordingChannel>,
        history: Arc<MemoryHistoryStore>,
    ) -> Relay {
        Relay::new(
            history,
            Arc::new(FixedBackend(reply)),
            channel,
            SchedulingLinks::new(
                "https://calendly.com/cognoxai",
                event_type.unwrap_or(config::DEFAULT_EVENT_TYPE),
            ),
            "gemini-1.5-flash",
            prompt::DEFAULT_PROMPT,
        )
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            sender_id: "5511999990000".to_string(),
            message_id: None,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn reply_is_sent_once_to_sender() {
        let channel = Arc::new(RecordingChannel::default());
        let history = Arc::new(MemoryHistoryStore::new());
        let relay = relay_with(Ok("Olá! Como posso ajudar?".into()), None, channel.clone(), history.clone());
        let outcome = relay.process(inbound("oi")).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Delivered {
                reply: "Olá! Como posso ajudar?".to_string(),
                fallback: false
            }
        );
        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "5511999990000");
        assert_eq!(history.len("5511999990000").await, 2);
    }

    #[tokio::test]
    async fn marker_becomes_configured_link() {
        let channel = Arc::new(RecordingChannel::default());
        let relay = relay_with(
            Ok("Perfeito! Agende aqui: [LINK_CALENDLY]".into()),
            Some("abc-123"),
            channel.clone(),
            Arc::new(MemoryHistoryStore::new()),
        );
        relay.process(inbound("sim, quero agendar")).await;
        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent[0].1, "Perfeito! Agende aqui: https://calendly.com/cognoxai/abc-123");
        assert!(!sent[0].1.contains(SCHEDULING_MARKER));
    }

    #[tokio::test]
    async fn marker_without_event_type_uses_default_segment() {
        let channel = Arc::new(RecordingChannel::default());
        let relay = relay_with(
            Ok("[LINK_CALENDLY]".into()),
            None,
            channel.clone(),
            Arc::new(MemoryHistoryStore::new()),
        );
        relay.process(inbound("ok")).await;
        assert_eq!(
            channel.sent.lock().unwrap()[0].1,
            "https://calendly.com/cognoxai/15min"
        );
    }

    #[tokio::test]
    async fn completion_failure_sends_apology() {
        let channel = Arc::new(RecordingChannel::default());
        let history = Arc::new(MemoryHistoryStore::new());
        let relay = relay_with(Err(()), None, channel.clone(), history.clone());
        let outcome = relay.process(inbound("oi")).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Delivered {
                reply: APOLOGY.to_string(),
                fallback: true
            }
        );
        assert_eq!(channel.sent.lock().unwrap()[0].1, APOLOGY);
        assert_eq!(history.len("5511999990000").await, 0);
    }

    #[tokio::test]
    async fn send_failure_is_reported_not_retried() {
        let channel = Arc::new(RecordingChannel {
            fail: true,
            ..Default::default()
        });
        let history = Arc::new(MemoryHistoryStore::new());
        let relay = relay_with(Ok("resposta".into()), None, channel.clone(), history.clone());
        let outcome = relay.process(inbound("oi")).await;
        assert!(matches!(outcome, DispatchOutcome::SendFailed { .. }));
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
        // the turn itself succeeded, so history still records it
        assert_eq!(
            history.load("5511999990000").await.unwrap()[1],
            HistoryMessage::assistant("resposta")
        );
    }
}
