//! Duplicate suppression for relayed frames
//!
//! A node in promiscuous mode hears retransmissions, and in a wormhole it may
//! also hear its peer's replay. Identical frames arriving in quick succession
//! are forwarded once.

use sniplay_protocol::LinkFrame;
use std::time::{Duration, Instant};

/// Default window on the capturing side
pub const SNIFFER_MIN_INTERVAL: Duration = Duration::from_secs(1);
/// Default window on the replaying side
pub const REPLAYER_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Remembers the last forwarded frame and when it went out
#[derive(Debug)]
pub struct DuplicateFilter {
    min_interval: Duration,
    last: Option<(LinkFrame, Instant)>,
    filtered: u64,
}

impl DuplicateFilter {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
            filtered: 0,
        }
    }

    /// Whether `frame` repeats the last forwarded one within the window.
    ///
    /// The window runs from the moment the previous copy was forwarded, not
    /// from when it arrived.
    pub fn is_repeat(&mut self, frame: &LinkFrame, now: Instant) -> bool {
        if let Some((last, at)) = &self.last {
            if last == frame && now.saturating_duration_since(*at) < self.min_interval {
                self.filtered += 1;
                return true;
            }
        }
        false
    }

    /// Note that `frame` was forwarded at `now`
    pub fn record(&mut self, frame: &LinkFrame, now: Instant) {
        self.last = Some((frame.clone(), now));
    }

    /// Number of frames rejected so far
    #[must_use]
    pub fn filtered(&self) -> u64 {
        self.filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: &[u8]) -> LinkFrame {
        LinkFrame::from_slice(data).unwrap()
    }

    fn admit(filter: &mut DuplicateFilter, data: &LinkFrame, now: Instant) -> bool {
        if filter.is_repeat(data, now) {
            return false;
        }
        filter.record(data, now);
        true
    }

    #[test]
    fn test_repeat_within_window_filtered() {
        let mut filter = DuplicateFilter::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(admit(&mut filter, &frame(&[1, 2]), t0));
        assert!(!admit(&mut filter, &frame(&[1, 2]), t0 + Duration::from_millis(400)));
        assert_eq!(filter.filtered(), 1);
    }

    #[test]
    fn test_repeat_after_window_admitted() {
        let mut filter = DuplicateFilter::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(admit(&mut filter, &frame(&[1, 2]), t0));
        assert!(admit(&mut filter, &frame(&[1, 2]), t0 + Duration::from_secs(2)));
    }

    #[test]
    fn test_different_frame_admitted() {
        let mut filter = DuplicateFilter::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(admit(&mut filter, &frame(&[1, 2]), t0));
        assert!(admit(&mut filter, &frame(&[1, 3]), t0));
        // The window now tracks the newer frame
        assert!(admit(&mut filter, &frame(&[1, 2]), t0));
    }

    #[test]
    fn test_window_starts_when_frame_forwarded() {
        let mut filter = DuplicateFilter::new(Duration::from_secs(1));
        let arrived = Instant::now();
        let data = frame(&[0x41, 0x88, 0x07]);

        assert!(!filter.is_repeat(&data, arrived));
        // Forwarded after a 300 ms hold
        filter.record(&data, arrived + Duration::from_millis(300));

        // 1.2 s after arrival is only 0.9 s after forwarding
        assert!(filter.is_repeat(&data, arrived + Duration::from_millis(1200)));
        assert!(!filter.is_repeat(&data, arrived + Duration::from_millis(1300)));
        assert_eq!(filter.filtered(), 1);
    }

    #[test]
    fn test_unforwarded_frame_not_remembered() {
        let mut filter = DuplicateFilter::new(Duration::from_secs(1));
        let t0 = Instant::now();
        let data = frame(&[1, 2, 3]);

        assert!(!filter.is_repeat(&data, t0));
        // Forwarding failed, nothing recorded
        assert!(!filter.is_repeat(&data, t0 + Duration::from_millis(10)));
    }
}
