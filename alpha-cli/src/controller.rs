use alpha_shared::{ChatRequest, ChatResponse, DEFAULT_PROFILE, PROFILES};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::animator::{AnimationEvent, AnimationHandle, AnimationId, TypingAnimator};
use crate::client::Relay;
use crate::transcript::{EntryId, Transcript};

pub const NOTICE_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Transient banner shown above the input.
#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
    raised_at: Instant,
}

impl Notice {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.raised_at) >= NOTICE_TTL
    }
}

/// Single-line input with a cursor measured in characters.
#[derive(Debug, Default)]
pub struct InputBox {
    text: String,
    cursor: usize,
}

impl InputBox {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn byte_index(&self) -> usize {
        self.text
            .char_indices()
            .nth(self.cursor)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    #[cfg(test)]
    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.cursor = self.text.chars().count();
    }

    pub fn insert(&mut self, c: char) {
        let at = self.byte_index();
        self.text.insert(at, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let at = self.byte_index();
            self.text.remove(at);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.text.chars().count() {
            self.cursor += 1;
        }
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

#[derive(Debug)]
pub struct Reply {
    pub entry: EntryId,
    pub result: anyhow::Result<ChatResponse>,
}

#[derive(Debug)]
pub enum SessionEvent {
    Reply(Reply),
    Animation(AnimationEvent),
}

/// What the in-flight slot currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    AwaitingReply,
    Revealing,
}

enum InFlight {
    Awaiting { entry: EntryId },
    Animating(AnimationHandle),
}

/// Owns the transcript and the single in-flight slot. Relay calls and
/// animations run on their own tasks but only report back through
/// [`SessionEvent`]s; every mutation happens in [`InputController::handle`]
/// on the caller's task.
pub struct InputController {
    transcript: Transcript,
    input: InputBox,
    profile: usize,
    in_flight: Option<InFlight>,
    notice: Option<Notice>,
    relay: Arc<dyn Relay>,
    animator: TypingAnimator,
    replies_tx: mpsc::UnboundedSender<Reply>,
    replies_rx: mpsc::UnboundedReceiver<Reply>,
    frames_rx: mpsc::UnboundedReceiver<AnimationEvent>,
}

impl InputController {
    pub fn new(relay: Arc<dyn Relay>, cadence: Duration) -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let profile = PROFILES
            .iter()
            .position(|p| *p == DEFAULT_PROFILE)
            .unwrap_or(0);

        Self {
            transcript: Transcript::new(),
            input: InputBox::default(),
            profile,
            in_flight: None,
            notice: None,
            relay,
            animator: TypingAnimator::new(cadence, frames_tx),
            replies_tx,
            replies_rx,
            frames_rx,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn input(&self) -> &InputBox {
        &self.input
    }

    /// `None` while a send is in flight: the input is disabled.
    pub fn input_mut(&mut self) -> Option<&mut InputBox> {
        if self.is_busy() {
            None
        } else {
            Some(&mut self.input)
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn activity(&self) -> Activity {
        match self.in_flight {
            None => Activity::Idle,
            Some(InFlight::Awaiting { .. }) => Activity::AwaitingReply,
            Some(InFlight::Animating(_)) => Activity::Revealing,
        }
    }

    pub fn profile(&self) -> &'static str {
        PROFILES[self.profile]
    }

    pub fn cycle_profile(&mut self) -> &'static str {
        self.profile = (self.profile + 1) % PROFILES.len();
        self.profile()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn notify(&mut self, message: impl Into<String>, kind: NoticeKind) {
        self.notice = Some(Notice {
            message: message.into(),
            kind,
            raised_at: Instant::now(),
        });
    }

    pub fn expire_notice(&mut self, now: Instant) -> bool {
        if self.notice.as_ref().is_some_and(|n| n.is_expired(now)) {
            self.notice = None;
            return true;
        }
        false
    }

    pub fn welcome(&mut self, text: &str) {
        self.transcript.push_assistant(text);
    }

    /// Sends the current input. Returns the placeholder entry the reply
    /// will be written into, or `None` if nothing was sent.
    pub fn send(&mut self) -> Option<EntryId> {
        if self.is_busy() {
            debug!("Ignoring send while a request is in flight");
            return None;
        }

        let message = self.input.text().trim().to_string();
        if message.is_empty() {
            return None;
        }

        self.transcript.push_user(message.clone());
        self.input.clear();
        let placeholder = self.transcript.push_placeholder();
        self.in_flight = Some(InFlight::Awaiting { entry: placeholder });

        let request = ChatRequest {
            message,
            profile: self.profile().to_string(),
        };
        let relay = self.relay.clone();
        let replies = self.replies_tx.clone();
        tokio::spawn(async move {
            // a panicking relay must still release the in-flight slot
            let call = tokio::spawn(async move { relay.chat(request).await });
            let result = match call.await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("Relay task failed: {}", e)),
            };
            let _ = replies.send(Reply {
                entry: placeholder,
                result,
            });
        });

        Some(placeholder)
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            Some(reply) = self.replies_rx.recv() => Some(SessionEvent::Reply(reply)),
            Some(event) = self.frames_rx.recv() => Some(SessionEvent::Animation(event)),
            else => None,
        }
    }

    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Reply(reply) => self.on_reply(reply),
            SessionEvent::Animation(event) => self.on_animation(event),
        }
    }

    fn on_reply(&mut self, reply: Reply) {
        let Reply { entry, result } = reply;
        match self.in_flight {
            Some(InFlight::Awaiting { entry: awaited }) if awaited == entry => {}
            _ => {
                warn!("Dropping reply for entry {:?}: not awaited", entry);
                return;
            }
        }
        self.in_flight = None;

        if self.transcript.get(entry).is_none() {
            debug!("Reply arrived after entry {:?} was cleared", entry);
            return;
        }

        match result {
            Ok(ChatResponse::Success { answer_text }) => {
                let handle = self.animator.start(entry, &answer_text);
                self.transcript.begin_reveal(entry, answer_text, handle.id());
                self.in_flight = Some(InFlight::Animating(handle));
            }
            Ok(ChatResponse::Failure { error_message }) => {
                warn!("Relay returned an error: {}", error_message);
                self.transcript.fail(entry, format!("Error: {}", error_message));
                self.notify(error_message, NoticeKind::Error);
            }
            Err(e) => {
                error!("Relay call failed: {:#}", e);
                self.transcript.fail(entry, format!("Network error: {:#}", e));
                self.notify("Network error or server connection failed.", NoticeKind::Error);
            }
        }
    }

    fn current_animation(&self) -> Option<AnimationId> {
        match &self.in_flight {
            Some(InFlight::Animating(handle)) => Some(handle.id()),
            _ => None,
        }
    }

    fn on_animation(&mut self, event: AnimationEvent) {
        match event {
            AnimationEvent::Frame {
                animation,
                entry,
                rendered,
            } => {
                if self.current_animation() == Some(animation) {
                    self.transcript.reveal(entry, animation, rendered);
                }
            }
            AnimationEvent::Completed { animation, entry } => {
                if self.current_animation() != Some(animation) {
                    return;
                }
                self.transcript.settle(entry, animation);
                self.in_flight = None;
                info!("Reply for entry {:?} fully revealed", entry);
            }
        }
    }

    /// Empties the transcript. A running reveal is cancelled and releases
    /// the slot; an outstanding relay call keeps it until its reply lands.
    pub fn clear_transcript(&mut self) {
        match self.in_flight.take() {
            Some(InFlight::Animating(mut handle)) => {
                if !handle.is_finished() {
                    handle.cancel();
                    debug!("Cancelled animation {:?} for entry {:?}", handle.id(), handle.entry());
                }
            }
            other => self.in_flight = other,
        }

        let removed = self.transcript.clear();
        debug!("Cleared {} transcript entries", removed);
    }
}
