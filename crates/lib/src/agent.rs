//! Agent turn: load sender history, call the LLM with the system prompt, append the exchange.

use crate::history::{HistoryError, HistoryMessage, HistoryStore, Role};
use crate::llm::{ChatMessage, LlmBackend, LlmError};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Run one turn for `sender_id`: history + new user text go to the model; on success the user
/// turn and the assistant reply are appended together and the reply text is returned.
/// A failed turn leaves history untouched.
pub async fn run_turn<B: LlmBackend + ?Sized>(
    history: &dyn HistoryStore,
    sender_id: &str,
    text: &str,
    backend: &B,
    model: &str,
    system_context: Option<&str>,
) -> Result<String, AgentError> {
    let past = history.load(sender_id).await?;

    let mut messages: Vec<ChatMessage> = Vec::with_capacity(past.len() + 2);
    if let Some(ctx) = system_context {
        if !ctx.trim().is_empty() {
            messages.push(ChatMessage::system(ctx));
        }
    }
    messages.extend(past.iter().map(|m| match m.role {
        Role::User => ChatMessage::user(m.content.clone()),
        Role::Assistant => ChatMessage::assistant(m.content.clone()),
    }));
    messages.push(ChatMessage::user(text));

    log::debug!(
        "agent: {} prior turn(s) for {}, model {}",
        past.len(),
        sender_id,
        model
    );
    let res = backend.chat(model, messages).await?;
    let reply = res.content().to_string();
    if reply.trim().is_empty() {
        return Err(LlmError::EmptyReply.into());
    }

    history
        .append(
            sender_id,
            &[HistoryMessage::user(text), HistoryMessage::assistant(reply.clone())],
        )
        .await?;
    Ok(reply)
}
