use alpha_shared::MessageRole;
use chrono::{DateTime, Local};
use tracing::debug;

use crate::animator::AnimationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Placeholder waiting for the relay.
    Pending,
    /// Being written by the given animation; no one else may write it.
    Revealing(AnimationId),
    Settled,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: EntryId,
    pub role: MessageRole,
    pub text: String,
    /// Number of characters of `text` currently shown.
    pub rendered_length: usize,
    pub state: EntryState,
    pub created_at: DateTime<Local>,
}

impl ChatMessage {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn visible_text(&self) -> &str {
        match self.text.char_indices().nth(self.rendered_length) {
            Some((byte_index, _)) => &self.text[..byte_index],
            None => &self.text,
        }
    }

    pub fn is_fully_rendered(&self) -> bool {
        self.rendered_length >= self.char_len()
    }
}

/// Ordered, in-memory list of the session's chat entries.
///
/// Ids are never reused, including across [`Transcript::clear`], so a late
/// write aimed at a removed entry can never land on a newer one.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<ChatMessage>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&ChatMessage> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    fn get_mut(&mut self, id: EntryId) -> Option<&mut ChatMessage> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    fn push(&mut self, role: MessageRole, text: String, state: EntryState) -> EntryId {
        self.next_id += 1;
        let id = EntryId(self.next_id);
        let rendered_length = match state {
            EntryState::Pending => 0,
            _ => text.chars().count(),
        };
        self.entries.push(ChatMessage {
            id,
            role,
            text,
            rendered_length,
            state,
            created_at: Local::now(),
        });
        id
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> EntryId {
        self.push(MessageRole::User, text.into(), EntryState::Settled)
    }

    /// Appends an assistant entry that is shown in full straight away.
    pub fn push_assistant(&mut self, text: impl Into<String>) -> EntryId {
        self.push(MessageRole::Assistant, text.into(), EntryState::Settled)
    }

    pub fn push_placeholder(&mut self) -> EntryId {
        self.push(MessageRole::Assistant, String::new(), EntryState::Pending)
    }

    /// Hands a pending placeholder to an animation. Nothing is shown until
    /// the first frame arrives.
    pub fn begin_reveal(&mut self, id: EntryId, text: String, animation: AnimationId) -> bool {
        match self.get_mut(id) {
            Some(entry) if entry.state == EntryState::Pending => {
                entry.text = text;
                entry.rendered_length = 0;
                entry.state = EntryState::Revealing(animation);
                true
            }
            _ => false,
        }
    }

    /// Applies one animation frame. Frames from anything but the owning
    /// animation, and frames that would move backwards, are ignored.
    pub fn reveal(&mut self, id: EntryId, animation: AnimationId, rendered: usize) -> bool {
        let Some(entry) = self.get_mut(id) else {
            debug!("Dropping frame for removed entry {:?}", id);
            return false;
        };
        if entry.state != EntryState::Revealing(animation) {
            debug!("Dropping frame for entry {:?} not owned by {:?}", id, animation);
            return false;
        }

        let rendered = rendered.min(entry.char_len());
        if rendered <= entry.rendered_length {
            return false;
        }
        entry.rendered_length = rendered;
        true
    }

    pub fn settle(&mut self, id: EntryId, animation: AnimationId) -> bool {
        match self.get_mut(id) {
            Some(entry) if entry.state == EntryState::Revealing(animation) => {
                entry.rendered_length = entry.char_len();
                entry.state = EntryState::Settled;
                true
            }
            _ => false,
        }
    }

    /// Replaces an unsettled assistant entry with an inline error.
    pub fn fail(&mut self, id: EntryId, text: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(entry) if matches!(entry.state, EntryState::Pending | EntryState::Revealing(_)) => {
                entry.text = text.into();
                entry.rendered_length = entry.char_len();
                entry.state = EntryState::Failed;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }
}
