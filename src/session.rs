//! Conversation state and the turn protocol.
//!
//! A [`Conversation`] is an append-only log whose first message is always the
//! system seed. [`Conversation::submit`] runs one turn:
//!
//! ```text
//!   Idle ──submit(text)──▶ AwaitingResponse ──reply──▶ Idle
//!                                 │
//!                                 └──completion error──▶ AwaitingResponse
//! ```
//!
//! # Failed turns
//!
//! The log is never truncated. When the completion call fails, the user
//! message stays in the log unanswered and the error goes back to the caller.
//! A later `submit` appends another user message after it, so strict
//! user/assistant alternation holds only across turns that completed.
//! [`Conversation::unanswered`] counts the dangling user messages.
//!
//! Exclusive access (`&mut self`) for the whole turn guarantees at most one
//! completion call in flight per conversation.

use serde::{Deserialize, Serialize};

use crate::completion::CompletionProvider;
use crate::corpus::CorpusReport;
use crate::error::CompletionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingResponse,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(seed)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true: the seed is always present.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn seed(&self) -> &str {
        &self.messages[0].content
    }

    pub fn state(&self) -> SessionState {
        match self.messages.last().map(|m| m.role) {
            Some(Role::User) => SessionState::AwaitingResponse,
            _ => SessionState::Idle,
        }
    }

    /// User messages that never received a reply.
    pub fn unanswered(&self) -> usize {
        let tail = &self.messages[1..];
        tail.iter()
            .enumerate()
            .filter(|(i, m)| {
                m.role == Role::User && tail.get(i + 1).map(|n| n.role) != Some(Role::Assistant)
            })
            .count()
    }

    /// History for display: seed hidden, most recent message first.
    pub fn display_history(&self) -> impl Iterator<Item = &Message> {
        self.messages[1..].iter().rev()
    }

    /// Run one turn. Blank input is a no-op and returns `Ok(None)`.
    ///
    /// On success the assistant reply is appended and returned. On failure the
    /// user message remains as the last entry and the error is returned.
    pub async fn submit(
        &mut self,
        provider: &dyn CompletionProvider,
        user_text: &str,
    ) -> Result<Option<&Message>, CompletionError> {
        if user_text.trim().is_empty() {
            return Ok(None);
        }

        self.messages.push(Message::user(user_text));

        let result = match provider.complete(&self.messages).await {
            Ok(reply) if reply.role == Role::Assistant => Ok(reply),
            Ok(reply) => Err(CompletionError::InvalidResponse(format!(
                "expected assistant reply, got {:?}",
                reply.role
            ))),
            Err(e) => Err(e),
        };
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    model = provider.model_name(),
                    error = %e,
                    unanswered = self.unanswered(),
                    "completion failed; turn left unanswered"
                );
                return Err(e);
            }
        };

        self.messages.push(reply);
        Ok(self.messages.last())
    }
}

/// Build the seed system message, optionally followed by the corpus.
///
/// The corpus is cut at `max_chars` characters.
pub fn compose_seed(base: &str, corpus: Option<&CorpusReport>, max_chars: usize) -> String {
    let Some(report) = corpus else {
        return base.to_string();
    };
    if report.text.is_empty() {
        return base.to_string();
    }
    let excerpt: String = report.text.chars().take(max_chars).collect();
    format!("{}\n\n{}", base, excerpt)
}
