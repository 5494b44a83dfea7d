use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::frame::Frame;

struct Slot {
    pending: Option<Frame>,
    last_publish: Instant,
}

/// Latest-wins single-slot hand-off between the capture thread and a consumer.
pub struct FrameMailbox {
    slot: Mutex<Slot>,
    liveness_timeout: Duration,
}

/// Result of [`FrameMailbox::pop`].
#[derive(Debug)]
pub struct VideoPoll {
    pub frame: Option<Frame>,
    /// `false` once nothing was published for longer than the liveness timeout and no frame is
    /// waiting.
    pub alive: bool,
}

impl FrameMailbox {
    pub fn new(liveness_timeout: Duration) -> Self {
        Self::starting_at(liveness_timeout, Instant::now())
    }

    /// The liveness clock starts at `now`, as if a frame had been published then.
    pub fn starting_at(liveness_timeout: Duration, now: Instant) -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                last_publish: now,
            }),
            liveness_timeout,
        }
    }

    pub fn liveness_timeout(&self) -> Duration {
        self.liveness_timeout
    }

    /// Restart the liveness clock without publishing.
    pub fn reset_clock(&self, now: Instant) {
        self.slot.lock().last_publish = now;
    }

    pub fn publish(&self, frame: Frame) {
        self.publish_at(frame, Instant::now());
    }

    /// Store `frame`, replacing any unread one. Returns `true` if a frame was overwritten.
    pub fn publish_at(&self, frame: Frame, now: Instant) -> bool {
        let replaced = {
            let mut slot = self.slot.lock();
            slot.last_publish = now;
            slot.pending.replace(frame)
        };
        // Dropped outside the lock; it returns its buffer to the pool.
        let overwritten = replaced.is_some();
        drop(replaced);
        overwritten
    }

    pub fn pop(&self) -> VideoPoll {
        self.pop_at(Instant::now())
    }

    pub fn pop_at(&self, now: Instant) -> VideoPoll {
        let mut slot = self.slot.lock();
        let frame = slot.pending.take();
        let idle = now.saturating_duration_since(slot.last_publish);
        let alive = frame.is_some() || idle <= self.liveness_timeout;
        VideoPoll { frame, alive }
    }

    pub fn has_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameShape;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn frame(width: u32, at: Instant) -> Frame {
        let shape = FrameShape::packed(width, 1);
        Frame::detached(shape, vec![0; shape.byte_len()], at).unwrap()
    }

    #[test]
    fn test_latest_wins() {
        let t0 = Instant::now();
        let mailbox = FrameMailbox::starting_at(TIMEOUT, t0);

        assert!(!mailbox.publish_at(frame(1, t0), t0));
        assert!(mailbox.publish_at(frame(2, t0), t0));
        assert!(mailbox.publish_at(frame(3, t0), t0));

        let polled = mailbox.pop_at(t0);
        assert_eq!(polled.frame.map(|f| f.width()), Some(3));
        assert!(polled.alive);

        let polled = mailbox.pop_at(t0);
        assert!(polled.frame.is_none());
        assert!(polled.alive);
    }

    #[test]
    fn test_liveness_expires_and_recovers() {
        let t0 = Instant::now();
        let mailbox = FrameMailbox::starting_at(TIMEOUT, t0);

        assert!(mailbox.pop_at(t0 + Duration::from_millis(200)).alive);
        assert!(!mailbox.pop_at(t0 + Duration::from_millis(201)).alive);

        let t1 = t0 + Duration::from_millis(500);
        mailbox.publish_at(frame(1, t1), t1);
        assert!(mailbox.pop_at(t1 + Duration::from_millis(1)).alive);
    }

    #[test]
    fn test_pending_frame_keeps_alive() {
        let t0 = Instant::now();
        let mailbox = FrameMailbox::starting_at(TIMEOUT, t0);
        mailbox.publish_at(frame(1, t0), t0);

        let late = t0 + Duration::from_secs(5);
        let polled = mailbox.pop_at(late);
        assert!(polled.frame.is_some());
        assert!(polled.alive);
        assert!(!mailbox.pop_at(late).alive);
    }
}
