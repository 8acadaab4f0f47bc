/// Fixed period schedule. A late tick re-bases the schedule, so an
/// overrun shifts all later ticks and is not reported.
#[derive(Debug, Clone)]
pub struct LoopTimer {
    period: u64, // [us]
    next: u64,
}

impl LoopTimer {
    pub fn new(period_us: u64, now: u64) -> Self {
        let period = period_us.max(1);
        LoopTimer {
            period,
            next: now + period,
        }
    }

    /// Returns true when a tick is due at `now` [us].
    pub fn poll(&mut self, now: u64) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.period;
        if now >= self.next {
            self.next = now + self.period;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_follow_the_period() {
        let mut timer = LoopTimer::new(1000, 0);
        assert!(!timer.poll(999));
        assert!(timer.poll(1000));
        assert!(!timer.poll(1500));
        assert!(timer.poll(2003));
        assert!(timer.poll(3000));
    }

    #[test]
    fn overrun_shifts_later_ticks() {
        let mut timer = LoopTimer::new(1000, 0);
        assert!(timer.poll(4500));
        // the missed ticks are dropped, the next one is a full period later
        assert!(!timer.poll(5000));
        assert!(timer.poll(5500));
    }
}
