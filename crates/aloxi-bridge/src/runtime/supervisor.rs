//! Restart policy for supervised workers.

use std::time::Duration;

/// How long to wait before rebuilding a worker that panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartStrategy {
    /// A panic stops the worker for good.
    Never,
    #[default]
    Immediate,
    FixedDelay(Duration),
    /// `initial`, doubled per consecutive restart, capped at `max`.
    ExponentialBackoff { initial: Duration, max: Duration },
}

impl RestartStrategy {
    /// Delay before restart number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match *self {
            RestartStrategy::Never | RestartStrategy::Immediate => Duration::ZERO,
            RestartStrategy::FixedDelay(delay) => delay,
            RestartStrategy::ExponentialBackoff { initial, max } => {
                let shift = u32::try_from(attempt.min(31)).unwrap_or(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }
}

/// Strategy plus restart budget for one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisionPolicy {
    pub strategy: RestartStrategy,
    pub max_restarts: usize,
}

impl Default for SupervisionPolicy {
    fn default() -> Self {
        Self {
            strategy: RestartStrategy::Immediate,
            max_restarts: 5,
        }
    }
}

impl SupervisionPolicy {
    /// Whether restart number `attempt` (0-based) is still within budget.
    pub fn allows(&self, attempt: usize) -> bool {
        self.strategy != RestartStrategy::Never && attempt < self.max_restarts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let s = RestartStrategy::ExponentialBackoff {
            initial: 100 * MS,
            max: 5000 * MS,
        };
        let delays: Vec<u128> = (0..8).map(|a| s.delay_for_attempt(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 3200, 5000, 5000]);
        assert_eq!(s.delay_for_attempt(usize::MAX), 5000 * MS);
    }

    #[test]
    fn fixed_and_immediate_do_not_grow() {
        assert_eq!(RestartStrategy::FixedDelay(250 * MS).delay_for_attempt(9), 250 * MS);
        assert_eq!(RestartStrategy::Immediate.delay_for_attempt(9), Duration::ZERO);
    }

    #[test]
    fn budget_counts_restarts_and_never_allows_none() {
        let policy = SupervisionPolicy {
            strategy: RestartStrategy::Immediate,
            max_restarts: 2,
        };
        assert!(policy.allows(1));
        assert!(!policy.allows(2));

        let never = SupervisionPolicy {
            strategy: RestartStrategy::Never,
            max_restarts: 10,
        };
        assert!(!never.allows(0));
    }
}
