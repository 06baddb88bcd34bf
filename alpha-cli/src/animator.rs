use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::transcript::EntryId;

pub const DEFAULT_CADENCE: Duration = Duration::from_millis(30);

static NEXT_ANIMATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnimationId(u64);

impl AnimationId {
    pub fn next() -> Self {
        Self(NEXT_ANIMATION.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnimationEvent {
    /// The first `rendered` characters of the entry should now be visible.
    Frame {
        animation: AnimationId,
        entry: EntryId,
        rendered: usize,
    },
    /// Sent once, after the last frame. Never sent for a cancelled animation.
    Completed {
        animation: AnimationId,
        entry: EntryId,
    },
}

/// Starts typewriter reveals. The animator never touches the transcript
/// itself: it only emits [`AnimationEvent`]s, which the UI task applies.
#[derive(Debug, Clone)]
pub struct TypingAnimator {
    cadence: Duration,
    events: mpsc::UnboundedSender<AnimationEvent>,
}

impl TypingAnimator {
    pub fn new(cadence: Duration, events: mpsc::UnboundedSender<AnimationEvent>) -> Self {
        // tokio intervals reject a zero period
        let cadence = cadence.max(Duration::from_millis(1));
        Self { cadence, events }
    }

    pub fn start(&self, entry: EntryId, text: &str) -> AnimationHandle {
        let id = AnimationId::next();
        let total = text.chars().count();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        debug!("Starting animation {:?} for entry {:?} ({} chars)", id, entry, total);
        let task = tokio::spawn(run(id, entry, total, self.cadence, self.events.clone(), cancel_rx));

        AnimationHandle {
            id,
            entry,
            cancel: Some(cancel_tx),
            task,
        }
    }
}

async fn run(
    animation: AnimationId,
    entry: EntryId,
    total: usize,
    cadence: Duration,
    events: mpsc::UnboundedSender<AnimationEvent>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for rendered in 1..=total {
        tokio::select! {
            biased;
            // fires on an explicit cancel and when the handle is dropped
            _ = &mut cancel => {
                debug!("Animation {:?} cancelled at {}/{}", animation, rendered - 1, total);
                return;
            }
            _ = ticker.tick() => {}
        }

        let frame = AnimationEvent::Frame {
            animation,
            entry,
            rendered,
        };
        if events.send(frame).is_err() {
            return;
        }
    }

    let _ = events.send(AnimationEvent::Completed { animation, entry });
}

/// Owner of one running reveal. Dropping it cancels the reveal.
#[derive(Debug)]
pub struct AnimationHandle {
    id: AnimationId,
    entry: EntryId,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AnimationHandle {
    pub fn id(&self) -> AnimationId {
        self.id
    }

    pub fn entry(&self) -> EntryId {
        self.entry
    }

    /// Stops scheduling further frames. Frames already queued are still
    /// delivered and must be filtered by animation id on the receiving side.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AnimationHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Transcript;
    use tokio::time::{sleep, timeout};

    fn entry_id() -> EntryId {
        Transcript::new().push_placeholder()
    }

    async fn collect_until_completed(
        rx: &mut mpsc::UnboundedReceiver<AnimationEvent>,
    ) -> Vec<AnimationEvent> {
        let mut events = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("animation stalled")
                .expect("channel closed");
            let done = matches!(event, AnimationEvent::Completed { .. });
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[tokio::test]
    async fn emits_one_frame_per_character_then_completes_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let animator = TypingAnimator::new(Duration::from_millis(1), tx);
        let entry = entry_id();

        let handle = animator.start(entry, "Hello");
        let events = collect_until_completed(&mut rx).await;

        let frames: Vec<usize> = events
            .iter()
            .filter_map(|event| match event {
                AnimationEvent::Frame { rendered, .. } => Some(*rendered),
                _ => None,
            })
            .collect();
        assert_eq!(frames, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            events.last(),
            Some(&AnimationEvent::Completed {
                animation: handle.id(),
                entry
            })
        );

        sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn counts_characters_not_bytes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let animator = TypingAnimator::new(Duration::from_millis(1), tx);

        let _handle = animator.start(entry_id(), "héllo👋");
        let events = collect_until_completed(&mut rx).await;

        assert_eq!(events.len(), 7);
    }

    #[tokio::test]
    async fn empty_text_completes_without_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let animator = TypingAnimator::new(Duration::from_millis(1), tx);

        let _handle = animator.start(entry_id(), "");
        let events = collect_until_completed(&mut rx).await;

        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn cancel_stops_further_frames() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let animator = TypingAnimator::new(Duration::from_millis(5), tx);
        let text = "x".repeat(200);

        let mut handle = animator.start(entry_id(), &text);
        for _ in 0..2 {
            timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        }
        handle.cancel();
        sleep(Duration::from_millis(50)).await;

        let mut late = Vec::new();
        while let Ok(event) = rx.try_recv() {
            late.push(event);
        }
        assert!(late.len() < 198);
        assert!(!late.iter().any(|e| matches!(e, AnimationEvent::Completed { .. })));
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let animator = TypingAnimator::new(Duration::from_millis(5), tx);

        let handle = animator.start(entry_id(), &"y".repeat(200));
        timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        drop(handle);
        sleep(Duration::from_millis(50)).await;

        let mut completed = false;
        let mut frames = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                AnimationEvent::Frame { .. } => frames += 1,
                AnimationEvent::Completed { .. } => completed = true,
            }
        }
        assert!(!completed);
        assert!(frames < 199);
    }

    #[tokio::test]
    async fn each_start_gets_its_own_id() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let animator = TypingAnimator::new(DEFAULT_CADENCE, tx);
        let entry = entry_id();

        let first = animator.start(entry, "a");
        let second = animator.start(entry, "b");
        assert_ne!(first.id(), second.id());
        assert_eq!(first.entry(), second.entry());
    }
}
