//! Open conversation between the local user and one counterpart.

pub mod model;

pub use model::{format_sent_at, Message, OutgoingMessage, Side};

use chrono::{DateTime, Utc};
use tracing::debug;

/// A message together with its display side.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub message: Message,
    pub side: Side,
}

/// Local message collection of one open chat.
///
/// `read` only ever goes from false to true.
#[derive(Debug, Clone)]
pub struct ChatView {
    me: String,
    counterpart: String,
    entries: Vec<ChatEntry>,
}

impl ChatView {
    pub fn new(me: impl Into<String>, counterpart: impl Into<String>) -> Self {
        Self {
            me: me.into(),
            counterpart: counterpart.into(),
            entries: Vec::new(),
        }
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    pub fn counterpart(&self) -> &str {
        &self.counterpart
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn get(&self, id: i64) -> Option<&ChatEntry> {
        self.entries.iter().find(|e| e.message.id == id)
    }

    /// Messages addressed to the local user that are still unread.
    pub fn unread_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.message.read && e.message.receiver_username == self.me)
            .count()
    }

    fn belongs_here(&self, message: &Message) -> bool {
        let (s, r) = (&message.sender_username, &message.receiver_username);
        (s == &self.me && r == &self.counterpart) || (s == &self.counterpart && r == &self.me)
    }

    fn side_of(&self, message: &Message) -> Side {
        if message.receiver_username == self.me {
            Side::Left
        } else {
            Side::Right
        }
    }

    /// Load the fetched history. Messages pushed while the fetch was in
    /// flight are kept after it. Returns the ids of history messages still
    /// unread and addressed to the local user, which the caller marks as
    /// read in one command.
    pub fn load_history(&mut self, history: Vec<Message>) -> Vec<i64> {
        let pushed = std::mem::take(&mut self.entries);
        let mut candidates = Vec::new();
        for message in history {
            if !self.belongs_here(&message) {
                continue;
            }
            if !message.read && message.receiver_username == self.me {
                candidates.push(message.id);
            }
            self.upsert(message);
        }
        for entry in pushed {
            self.upsert(entry.message);
        }
        candidates.retain(|id| self.get(*id).is_some_and(|e| !e.message.read));
        candidates
    }

    /// Merge a pushed message. Returns its id when it is newly seen, unread
    /// and addressed to the local user, so the caller can issue a read
    /// receipt.
    pub fn receive(&mut self, message: Message) -> Option<i64> {
        if !self.belongs_here(&message) {
            debug!(
                message_id = message.id,
                counterpart = %self.counterpart,
                "Ignoring message for another conversation"
            );
            return None;
        }
        let id = message.id;
        let wants_receipt = !message.read && message.receiver_username == self.me;
        let is_new = self.upsert(message);
        (is_new && wants_receipt).then_some(id)
    }

    /// Insert, or merge into the entry with the same id. Returns true when
    /// the message was not present before.
    fn upsert(&mut self, message: Message) -> bool {
        let side = self.side_of(&message);
        match self.entries.iter_mut().find(|e| e.message.id == message.id) {
            Some(entry) => {
                let was_read = entry.message.read;
                entry.message = message;
                entry.message.read |= was_read;
                entry.side = side;
                false
            }
            None => {
                self.entries.push(ChatEntry { message, side });
                true
            }
        }
    }

    /// Flip `read` on every local message whose id is in `ids`. Unknown ids
    /// are ignored. Returns how many messages changed.
    pub fn mark_read(&mut self, ids: &[i64]) -> usize {
        let mut changed = 0;
        for entry in self.entries.iter_mut() {
            if !entry.message.read && ids.contains(&entry.message.id) {
                entry.message.read = true;
                changed += 1;
            }
        }
        changed
    }

    /// Build an outgoing message; blank input yields nothing.
    pub fn compose(&self, content: &str, now: DateTime<Utc>) -> Option<OutgoingMessage> {
        if content.trim().is_empty() {
            return None;
        }
        Some(OutgoingMessage {
            sender_username: self.me.clone(),
            content: content.to_string(),
            sent_at: format_sent_at(now),
            receiver_username: self.counterpart.clone(),
        })
    }
}
