use funnelsight_core::domain::conversation::{condensed_window, ConversationTurn};

use crate::llm::ChatMessage;

/// Prompt-ready slice of a thread: the trailing `size` turns, assistant turns
/// shortened to `assistant_max_chars`.
pub fn chat_window(
    history: &[ConversationTurn],
    size: usize,
    assistant_max_chars: usize,
) -> Vec<ChatMessage> {
    condensed_window(history, size, assistant_max_chars).iter().map(ChatMessage::from).collect()
}

/// Transcript kept by an interactive session between runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn new(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Appends one question and the response it received.
    pub fn record_exchange(&mut self, question: impl Into<String>, response: impl Into<String>) {
        self.turns.push(ConversationTurn::user(question));
        self.turns.push(ConversationTurn::assistant(response));
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
