use serde::{Deserialize, Serialize};

use crate::text::truncate_chars;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message of a thread. Callers convert whatever shape they hold into this
/// type once, at the boundary; nothing downstream inspects raw payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// The trailing `size` turns of a history, oldest first.
pub fn recent_window(history: &[ConversationTurn], size: usize) -> &[ConversationTurn] {
    let start = history.len().saturating_sub(size);
    &history[start..]
}

/// Windowed copy of the history with assistant turns shortened, used to keep
/// prompts bounded while preserving the user's own words verbatim.
pub fn condensed_window(
    history: &[ConversationTurn],
    size: usize,
    assistant_max_chars: usize,
) -> Vec<ConversationTurn> {
    recent_window(history, size)
        .iter()
        .map(|turn| match turn.role {
            Role::User => turn.clone(),
            Role::Assistant => {
                ConversationTurn::assistant(truncate_chars(&turn.content, assistant_max_chars))
            }
        })
        .collect()
}

pub fn last_user_question(history: &[ConversationTurn]) -> Option<&str> {
    history.iter().rev().find(|turn| turn.is_user()).map(|turn| turn.content.as_str())
}
