use std::time::{Duration, Instant};

/// Bookkeeping for one independently-paced periodic check.
#[derive(Debug, Clone)]
pub(crate) struct Cadence {
    name: &'static str,
    every: Duration,
    last: Option<Instant>,
}

impl Cadence {
    pub(crate) fn new(name: &'static str, every: Duration) -> Self {
        Self {
            name,
            every,
            last: None,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// A cadence that never fired is due immediately.
    pub(crate) fn due(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.duration_since(last) >= self.every,
        }
    }

    pub(crate) fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cadence_is_due() {
        let c = Cadence::new("queue", Duration::from_secs(15));
        assert!(c.due(Instant::now()));
    }

    #[test]
    fn due_only_after_interval_elapses() {
        let mut c = Cadence::new("health", Duration::from_secs(10));
        let start = Instant::now();
        c.mark(start);

        assert!(!c.due(start + Duration::from_secs(9)));
        assert!(c.due(start + Duration::from_secs(10)));
        assert!(c.due(start + Duration::from_secs(11)));
    }

    #[test]
    fn mark_resets_the_clock() {
        let mut c = Cadence::new("stale", Duration::from_secs(5));
        let start = Instant::now();
        c.mark(start);
        c.mark(start + Duration::from_secs(4));

        assert!(!c.due(start + Duration::from_secs(5)));
        assert!(c.due(start + Duration::from_secs(9)));
    }
}
