//! # Sequence & Loss Tracker
//!
//! Per-session accounting of received and lost packets from the source
//! packet counter. Counters wrap, duplicates arrive, and numbers go
//! missing; the tracker keeps `lost` monotone through all of it.

use tracing::debug;

use crate::frame::schema::PACKET_COUNTER_MODULUS;

/// Ground counters assigned to a record on acceptance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceCounts {
    /// Records accepted this session, including unnumbered ones
    pub accepted: u64,

    /// Cumulative packets inferred lost this session; never decreases
    pub lost: u64,
}

/// Tracks the source packet counter across one ingestion session
///
/// A fresh tracker is created when a source session opens; stopping and
/// restarting a session starts the accounting over.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last_packet: Option<u32>,
    accepted: u64,
    lost: u64,
}

impl SequenceTracker {
    /// Create a tracker in the initial state
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one accepted record
    ///
    /// Every record bumps `accepted` by exactly 1 whether or not it carries
    /// a packet number. Numbered packets drive gap detection: the forward
    /// distance from the expected next number, modulo
    /// [`PACKET_COUNTER_MODULUS`], is added to `lost`; a distance in the
    /// backward half of the cycle is a duplicate or reorder and changes
    /// nothing.
    ///
    /// # Arguments
    ///
    /// * `packet_count` - Source packet number, if the record had one
    ///
    /// # Returns
    ///
    /// * `SequenceCounts` - Counters after this record
    pub fn observe(&mut self, packet_count: Option<u32>) -> SequenceCounts {
        self.accepted += 1;

        if let Some(raw) = packet_count {
            let current = raw % PACKET_COUNTER_MODULUS;

            if let Some(last) = self.last_packet {
                let expected = (last + 1) % PACKET_COUNTER_MODULUS;
                let ahead =
                    (current + PACKET_COUNTER_MODULUS - expected) % PACKET_COUNTER_MODULUS;

                if ahead == 0 {
                    // In order
                } else if ahead < PACKET_COUNTER_MODULUS / 2 {
                    debug!(
                        "packet gap: expected {}, got {}, {} lost",
                        expected, current, ahead
                    );
                    self.lost += u64::from(ahead);
                } else {
                    debug!(
                        "packet {} is behind expected {}, duplicate or reorder",
                        current, expected
                    );
                }
            }

            self.last_packet = Some(current);
        }

        self.counts()
    }

    /// Current counters without accepting anything
    pub fn counts(&self) -> SequenceCounts {
        SequenceCounts {
            accepted: self.accepted,
            lost: self.lost,
        }
    }

    /// Last packet number seen this session
    pub fn last_packet(&self) -> Option<u32> {
        self.last_packet
    }

    /// Return to the initial state
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe_all(tracker: &mut SequenceTracker, packets: &[u32]) -> SequenceCounts {
        let mut counts = tracker.counts();
        for &packet in packets {
            counts = tracker.observe(Some(packet));
        }
        counts
    }

    #[test]
    fn test_first_packet_seeds_without_loss() {
        let mut tracker = SequenceTracker::new();
        let counts = tracker.observe(Some(41));
        assert_eq!(counts, SequenceCounts { accepted: 1, lost: 0 });
        assert_eq!(tracker.last_packet(), Some(41));
    }

    #[test]
    fn test_in_order_sequence_has_no_loss() {
        let mut tracker = SequenceTracker::new();
        let counts = observe_all(&mut tracker, &[1, 2, 3, 4]);
        assert_eq!(counts, SequenceCounts { accepted: 4, lost: 0 });
    }

    #[test]
    fn test_gaps_and_duplicates() {
        // One packet missing before 5, then a duplicate 5, then 6 missing
        let mut tracker = SequenceTracker::new();
        let counts = observe_all(&mut tracker, &[1, 2, 3, 5, 5, 7]);
        assert_eq!(counts, SequenceCounts { accepted: 6, lost: 2 });
    }

    #[test]
    fn test_unnumbered_records_count_accepted_only() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(Some(1));
        tracker.observe(None);
        let counts = tracker.observe(Some(2));
        assert_eq!(counts, SequenceCounts { accepted: 3, lost: 0 });
    }

    #[test]
    fn test_counter_wrap_is_not_loss() {
        let mut tracker = SequenceTracker::new();
        let counts = observe_all(&mut tracker, &[9998, 9999, 0, 1]);
        assert_eq!(counts, SequenceCounts { accepted: 4, lost: 0 });
    }

    #[test]
    fn test_gap_across_wrap_counts_lost() {
        // 9999, 0 and 1 never arrive
        let mut tracker = SequenceTracker::new();
        let counts = observe_all(&mut tracker, &[9998, 2]);
        assert_eq!(counts, SequenceCounts { accepted: 2, lost: 3 });
    }

    #[test]
    fn test_backward_packet_never_decreases_lost() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[1, 2, 3, 5]);
        let before = tracker.counts().lost;
        let counts = tracker.observe(Some(3));
        assert_eq!(counts.lost, before);
        assert_eq!(counts.accepted, 5);
    }

    #[test]
    fn test_packet_numbers_normalize_to_counter_width() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(Some(10_017));
        assert_eq!(tracker.last_packet(), Some(17));
    }

    #[test]
    fn test_reset_returns_to_initial_state() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[1, 2, 9]);
        tracker.reset();
        assert_eq!(tracker.counts(), SequenceCounts::default());
        assert_eq!(tracker.last_packet(), None);

        // A session restart seeds again without inheriting loss
        let counts = tracker.observe(Some(500));
        assert_eq!(counts, SequenceCounts { accepted: 1, lost: 0 });
    }
}
