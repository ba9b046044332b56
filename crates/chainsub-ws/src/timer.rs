//! Cancellable one-shot timers owned by the manager task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Reconnect,
    Sweep,
}

/// A fired timer: kind plus the sequence number it was scheduled with.
pub(crate) type TimerFired = (TimerKind, u64);

/// Holds at most one pending timer of a given kind.
///
/// Every `schedule` bumps the sequence number, so a timer that fired just
/// before being cancelled is recognised as stale by [`TimerSlot::fire`].
pub(crate) struct TimerSlot {
    kind: TimerKind,
    seq: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub(crate) fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            seq: 0,
            handle: None,
        }
    }

    /// Replace any pending timer with a new one firing after `delay`.
    pub(crate) fn schedule(&mut self, delay: Duration, tx: &mpsc::UnboundedSender<TimerFired>) {
        self.cancel();
        self.seq += 1;
        let fired = (self.kind, self.seq);
        let tx = tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(fired);
        }));
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    /// Consume a fired timer. Returns `false` if it was superseded.
    pub(crate) fn fire(&mut self, seq: u64) -> bool {
        if seq != self.seq || self.handle.is_none() {
            return false;
        }
        self.handle = None;
        true
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::Sweep);
        slot.schedule(Duration::from_secs(1), &tx);
        assert!(slot.is_pending());

        let (kind, seq) = rx.recv().await.unwrap();
        assert_eq!(kind, TimerKind::Sweep);
        assert!(slot.fire(seq));
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_supersedes_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::Reconnect);
        slot.schedule(Duration::from_millis(10), &tx);
        slot.schedule(Duration::from_millis(20), &tx);

        let (_, seq) = rx.recv().await.unwrap();
        assert_eq!(seq, 2);
        assert!(slot.fire(seq));
        assert!(!slot.fire(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel::<TimerFired>();
        let mut slot = TimerSlot::new(TimerKind::Sweep);
        slot.schedule(Duration::from_millis(10), &tx);
        slot.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
