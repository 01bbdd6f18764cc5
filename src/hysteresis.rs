/// Two-threshold switch with a dead band between `off_at` and `on_at`.
///
/// Readings `>= on_at` turn it on, readings `<= off_at` turn it off, anything
/// strictly in between keeps the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchmittTrigger {
    on_at: usize,
    off_at: usize,
    active: bool,
}

impl SchmittTrigger {
    /// `off_at` is clamped below `on_at` so the band is never inverted.
    pub fn new(on_at: usize, off_at: usize) -> Self {
        Self {
            on_at,
            off_at: off_at.min(on_at.saturating_sub(1)),
            active: false,
        }
    }

    pub fn update(&mut self, reading: usize) -> bool {
        if reading >= self.on_at {
            self.active = true;
        } else if reading <= self.off_at {
            self.active = false;
        }
        self.active
    }

    pub fn force_off(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn dead_band(&self) -> std::ops::RangeInclusive<usize> {
        (self.off_at + 1)..=(self.on_at.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_sequence_enters_at_30_exits_at_28() {
        let mut boost = SchmittTrigger::new(30, 28);
        let seen: Vec<bool> = [29, 30, 29, 28, 29]
            .into_iter()
            .map(|c| boost.update(c))
            .collect();
        assert_eq!(seen, vec![false, true, true, false, false]);
    }

    #[test]
    fn dead_band_keeps_prior_on_state() {
        let mut t = SchmittTrigger::new(30, 28);
        t.update(45);
        assert!(t.update(29));
    }

    #[test]
    fn force_off_clears() {
        let mut t = SchmittTrigger::new(3, 1);
        t.update(10);
        t.force_off();
        assert!(!t.is_active());
    }

    #[test]
    fn inverted_thresholds_are_clamped() {
        let t = SchmittTrigger::new(10, 20);
        assert_eq!(t.dead_band(), 10..=9);
        let mut t = t;
        assert!(t.update(10));
        assert!(!t.update(9));
    }

    #[test]
    fn dead_band_width() {
        let t = SchmittTrigger::new(30, 28);
        assert_eq!(t.dead_band(), 29..=29);
    }
}
