use crate::clock::Millis;

/// Number of entries in `sorted` within `[from, to]`.
///
/// `sorted` must be ascending. Two binary searches locate the bounds, so the
/// cost is O(log n) regardless of window size.
pub fn count_between(sorted: &[Millis], from: Millis, to: Millis) -> usize {
    if from > to {
        return 0;
    }
    sorted.partition_point(|&t| t <= to) - sorted.partition_point(|&t| t < from)
}

/// Bounded, time-ordered log of event instants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    timestamps: Vec<Millis>,
    total_count: u64,
    cap: usize,
    trim_to: usize,
}

impl EventLog {
    pub const DEFAULT_CAP: usize = 12_000;
    pub const DEFAULT_TRIM_TO: usize = 10_000;

    pub fn new(cap: usize, trim_to: usize) -> Self {
        let cap = cap.max(1);
        Self {
            timestamps: Vec::new(),
            total_count: 0,
            cap,
            trim_to: trim_to.clamp(1, cap),
        }
    }

    /// Rebuild a log from persisted parts. Returns `None` when the instants are
    /// not ascending.
    pub fn restore(
        mut timestamps: Vec<Millis>,
        total_count: u64,
        cap: usize,
        trim_to: usize,
    ) -> Option<Self> {
        if !timestamps.windows(2).all(|w| w[0] <= w[1]) {
            return None;
        }
        let mut log = Self::new(cap, trim_to);
        std::mem::swap(&mut log.timestamps, &mut timestamps);
        log.total_count = total_count;
        log.enforce_cap();
        Some(log)
    }

    /// Append an event. A clock that stepped backwards is pinned to the last
    /// logged instant so the log stays sorted.
    pub fn push(&mut self, at: Millis) -> Millis {
        let at = self.timestamps.last().map_or(at, |&last| at.max(last));
        self.timestamps.push(at);
        self.total_count += 1;
        self.enforce_cap();
        at
    }

    /// Remove the newest event. `total_count` never drops below zero.
    pub fn pop(&mut self) -> Option<Millis> {
        let popped = self.timestamps.pop();
        self.total_count = self.total_count.saturating_sub(1);
        popped
    }

    /// Events in `[now - window_ms, now]`. Instants after `now` are not counted.
    pub fn count_in_window(&self, window_ms: Millis, now: Millis) -> usize {
        count_between(&self.timestamps, now.saturating_sub(window_ms), now)
    }

    /// Drop events older than `now - retention_ms`. Returns how many were removed.
    pub fn prune_before(&mut self, retention_ms: Millis, now: Millis) -> usize {
        let cutoff = now.saturating_sub(retention_ms);
        let stale = self.timestamps.partition_point(|&t| t < cutoff);
        if stale > 0 {
            self.timestamps.drain(..stale);
        }
        stale
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
        self.total_count = 0;
    }

    pub fn timestamps(&self) -> &[Millis] {
        &self.timestamps
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn last(&self) -> Option<Millis> {
        self.timestamps.last().copied()
    }

    fn enforce_cap(&mut self) {
        if self.timestamps.len() > self.cap {
            let excess = self.timestamps.len() - self.trim_to;
            self.timestamps.drain(..excess);
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAP, Self::DEFAULT_TRIM_TO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn linear_count(sorted: &[Millis], cutoff: Millis, now: Millis) -> usize {
        sorted.iter().filter(|&&t| cutoff <= t && t <= now).count()
    }

    #[test]
    fn count_between_empty() {
        assert_eq!(count_between(&[], 0, 0), 0);
        assert_eq!(count_between(&[], 0, 1_000), 0);
    }

    #[test]
    fn window_entirely_before_first_event_is_empty() {
        let mut log = EventLog::default();
        log.push(100_000);
        log.push(100_500);
        // window [30_000, 50_000] ends before the first event
        assert_eq!(log.count_in_window(20_000, 50_000), 0);
    }

    #[test]
    fn events_after_now_are_not_counted() {
        let mut log = EventLog::default();
        log.push(1_000);
        log.push(2_000);
        log.push(1_500); // pinned to 2_000
        assert_eq!(log.count_in_window(60_000, 1_500), 1);
        assert_eq!(log.count_in_window(60_000, 2_000), 3);
    }

    #[test]
    fn count_between_bounds_are_inclusive() {
        let ts = [10, 20, 20, 30];
        assert_eq!(count_between(&ts, 20, 20), 2);
        assert_eq!(count_between(&ts, 11, 29), 2);
        assert_eq!(count_between(&ts, 0, 100), 4);
        assert_eq!(count_between(&ts, 30, 10), 0);
    }

    #[test]
    fn window_larger_than_now_counts_everything() {
        let mut log = EventLog::default();
        log.push(5);
        log.push(7);
        assert_eq!(log.count_in_window(1_000_000, 10), 2);
    }

    #[test]
    fn push_pins_backwards_clock() {
        let mut log = EventLog::default();
        log.push(1_000);
        assert_eq!(log.push(900), 1_000);
        assert_eq!(log.timestamps(), &[1_000, 1_000]);
    }

    #[test]
    fn cap_trims_to_most_recent() {
        let mut log = EventLog::default();
        for i in 0..12_000u64 {
            log.push(i);
            assert!(log.len() <= EventLog::DEFAULT_CAP);
        }
        assert_eq!(log.len(), 12_000);

        log.push(12_000);
        assert_eq!(log.len(), 10_000);
        assert_eq!(log.timestamps()[0], 2_001);
        assert_eq!(log.last(), Some(12_000));
        assert_eq!(log.total_count(), 12_001);
    }

    #[test]
    fn pop_on_empty_keeps_count_at_zero() {
        let mut log = EventLog::default();
        assert_eq!(log.pop(), None);
        assert_eq!(log.total_count(), 0);
    }

    #[test]
    fn pop_removes_newest() {
        let mut log = EventLog::default();
        log.push(1);
        log.push(2);
        assert_eq!(log.pop(), Some(2));
        assert_eq!(log.total_count(), 1);
        assert_eq!(log.timestamps(), &[1]);
    }

    #[test]
    fn prune_drops_only_stale_front() {
        let mut log = EventLog::default();
        for t in [100, 200, 300, 400] {
            log.push(t);
        }
        assert_eq!(log.prune_before(150, 400), 2);
        assert_eq!(log.timestamps(), &[300, 400]);
        assert_eq!(log.total_count(), 4);
    }

    #[test]
    fn restore_rejects_unsorted() {
        assert!(EventLog::restore(vec![3, 1, 2], 3, 12_000, 10_000).is_none());
    }

    #[test]
    fn restore_trims_oversize() {
        let ts: Vec<Millis> = (0..13_000).collect();
        let log = EventLog::restore(ts, 13_000, 12_000, 10_000).unwrap();
        assert_eq!(log.len(), 10_000);
        assert_eq!(log.timestamps()[0], 3_000);
    }

    proptest! {
        #[test]
        fn binary_search_matches_linear_scan(
            gaps in proptest::collection::vec(0u64..5_000, 0..400),
            window in 0u64..200_000,
            shift in -100_000i64..100_000,
        ) {
            let mut log = EventLog::default();
            let mut t = 1_000_000u64;
            for g in gaps {
                t += g;
                log.push(t);
            }
            // `now` may fall before the newest event
            let now = t.saturating_add_signed(shift);
            let expected = linear_count(log.timestamps(), now.saturating_sub(window), now);
            prop_assert_eq!(log.count_in_window(window, now), expected);
        }
    }
}
