use std::collections::HashSet;

use uuid::Uuid;

use crate::llm::types::{ContentBlock, Message};

/// Append-only conversation log.
///
/// Messages are never edited or removed once appended. One instance per
/// conversation; the turn loop borrows it mutably for the length of a turn,
/// so no locking is involved.
#[derive(Debug, Clone)]
pub struct Conversation {
    id: Uuid,
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Owned copy of the log, for handing to the model client.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Ids of tool uses that have no matching tool result yet, in the order
    /// they were requested. Empty whenever the log is safe to send.
    pub fn unresolved_tool_uses(&self) -> Vec<String> {
        let resolved: HashSet<&str> = self
            .messages
            .iter()
            .flat_map(|m| &m.content)
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect();

        self.messages
            .iter()
            .flat_map(|m| &m.content)
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, .. } if !resolved.contains(id.as_str()) => {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect()
    }
}
