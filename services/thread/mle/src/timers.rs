//! Logical timers driven by `Event::Tick`.

use rand::Rng;
use std::collections::BTreeMap;

/// Timers an interface runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKind {
    /// Start-up jitter before the first parent request
    Scan,
    /// End of a parent-request window
    ParentRequest,
    /// Child ID Response deadline
    ChildIdResponse,
    /// Resynchronisation answer deadline
    Resync,
    /// REED advertisement
    ReedAdvertisement,
    /// Router advertisement (trickle)
    RouterAdvertisement,
    /// Upgrade/downgrade poll
    RouterSelection,
    /// Child keep-alive towards the parent
    ChildUpdate,
    /// Delay before the next orphan scan
    OrphanBackoff,
}

/// Deadlines of running timers
#[derive(Debug, Clone, Default)]
pub struct Timers {
    deadlines: BTreeMap<TimerKind, u64>,
}

impl Timers {
    /// No timers running
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start a timer
    pub fn start(&mut self, kind: TimerKind, now_ms: u64, delay_ms: u64) {
        self.deadlines.insert(kind, now_ms.saturating_add(delay_ms));
    }

    /// Stop a timer
    pub fn stop(&mut self, kind: TimerKind) {
        self.deadlines.remove(&kind);
    }

    /// Stop every timer
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    /// Whether a timer is running
    pub fn is_running(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    /// Deadline of a timer
    pub fn deadline(&self, kind: TimerKind) -> Option<u64> {
        self.deadlines.get(&kind).copied()
    }

    /// Remove and return timers due at `now_ms`, earliest first
    pub fn expired(&mut self, now_ms: u64) -> Vec<TimerKind> {
        let mut due: Vec<(u64, TimerKind)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now_ms)
            .map(|(kind, at)| (*at, *kind))
            .collect();
        due.sort();
        for (_, kind) in &due {
            self.deadlines.remove(kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}

/// Trickle interval state for router advertisements
#[derive(Debug, Clone)]
pub struct Trickle {
    imin_ms: u64,
    imax_ms: u64,
    interval_ms: u64,
}

impl Trickle {
    /// Create a trickle timer at its minimum interval
    pub fn new(imin_ms: u64, imax_ms: u64) -> Self {
        let imin_ms = imin_ms.max(2);
        Self {
            imin_ms,
            imax_ms: imax_ms.max(imin_ms),
            interval_ms: imin_ms,
        }
    }

    /// Current interval
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Back to the minimum interval; returns the delay of the next firing
    pub fn reset<R: Rng>(&mut self, rng: &mut R) -> u64 {
        self.interval_ms = self.imin_ms;
        self.pick(rng)
    }

    /// Double the interval after a firing; returns the next delay
    pub fn next<R: Rng>(&mut self, rng: &mut R) -> u64 {
        self.interval_ms = (self.interval_ms * 2).min(self.imax_ms);
        self.pick(rng)
    }

    fn pick<R: Rng>(&self, rng: &mut R) -> u64 {
        rng.gen_range(self.interval_ms / 2..self.interval_ms)
    }
}

/// Random delay in `[base, base + jitter]`
pub fn jittered<R: Rng>(rng: &mut R, base_ms: u64, jitter_ms: u64) -> u64 {
    base_ms + rng.gen_range(0..=jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_timers_fire_in_order() {
        let mut timers = Timers::new();
        timers.start(TimerKind::ReedAdvertisement, 0, 500);
        timers.start(TimerKind::Scan, 0, 100);
        timers.start(TimerKind::OrphanBackoff, 0, 1000);
        assert!(timers.expired(99).is_empty());
        assert_eq!(
            timers.expired(500),
            vec![TimerKind::Scan, TimerKind::ReedAdvertisement]
        );
        assert!(!timers.is_running(TimerKind::Scan));
        timers.stop(TimerKind::OrphanBackoff);
        assert!(timers.expired(2000).is_empty());
    }

    #[test]
    fn test_trickle_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut trickle = Trickle::new(1000, 8000);
        let first = trickle.reset(&mut rng);
        assert!((500..1000).contains(&first));
        for _ in 0..10 {
            let d = trickle.next(&mut rng);
            assert!(d < trickle.interval_ms() && d >= trickle.interval_ms() / 2);
        }
        assert_eq!(trickle.interval_ms(), 8000);
        trickle.reset(&mut rng);
        assert_eq!(trickle.interval_ms(), 1000);
    }
}
