//! Retry state machine for batched remote calls.
//!
//! A batch moves `Attempting -> Succeeded`, or `Attempting -> Backoff -> Attempting` while
//! rate-limit retries remain, or `Attempting -> Failed`. Only rate-limit failures are retried.

use std::time::Duration;

/// Bounds for rate-limit retries and the pacing between batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Growth factor applied to the delay after every retry.
    pub multiplier: u32,
    /// Pause between successfully committed batches.
    pub batch_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            multiplier: 2,
            batch_pause: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), capped at `max_backoff`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// How an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Throttled by the remote service; may succeed later.
    RateLimited {
        /// Wait requested by the service, if any.
        retry_after: Option<Duration>,
    },
    /// Anything else; never retried.
    Fatal,
}

/// Where a batch is in its retry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `attempt` (1-based) is in flight.
    Attempting {
        /// Current attempt.
        attempt: u32,
    },
    /// Attempt `attempt` was throttled; wait `delay` before the next one.
    Backoff {
        /// Attempt that failed.
        attempt: u32,
        /// Wait before retrying.
        delay: Duration,
    },
    /// Committed after `attempts` tries.
    Succeeded {
        /// Attempts used.
        attempts: u32,
    },
    /// Abandoned after `attempts` tries.
    Failed {
        /// Attempts used.
        attempts: u32,
    },
}

/// Drives one batch through [`RetryState`].
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryMachine {
    /// Start at the first attempt.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting { attempt: 1 },
        }
    }

    /// Current state.
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Attempts made so far, counting the one in flight.
    pub fn attempts(&self) -> u32 {
        match self.state {
            RetryState::Attempting { attempt } | RetryState::Backoff { attempt, .. } => attempt,
            RetryState::Succeeded { attempts } | RetryState::Failed { attempts } => attempts,
        }
    }

    /// The in-flight attempt succeeded.
    pub fn record_success(&mut self) -> RetryState {
        if let RetryState::Attempting { attempt } = self.state {
            self.state = RetryState::Succeeded { attempts: attempt };
        }
        self.state
    }

    /// The in-flight attempt failed; decide between backing off and giving up.
    pub fn record_failure(&mut self, failure: Failure) -> RetryState {
        let RetryState::Attempting { attempt } = self.state else {
            return self.state;
        };
        self.state = match failure {
            Failure::RateLimited { retry_after } if attempt <= self.policy.max_retries => {
                let planned = self.policy.backoff(attempt);
                let delay = retry_after
                    .map_or(planned, |requested| requested.max(planned))
                    .min(self.policy.max_backoff);
                RetryState::Backoff { attempt, delay }
            }
            _ => RetryState::Failed { attempts: attempt },
        };
        self.state
    }

    /// Leave backoff and begin the next attempt.
    pub fn resume(&mut self) -> RetryState {
        if let RetryState::Backoff { attempt, .. } = self.state {
            self.state = RetryState::Attempting {
                attempt: attempt + 1,
            };
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
            multiplier: 2,
            batch_pause: Duration::ZERO,
        }
    }

    const THROTTLED: Failure = Failure::RateLimited { retry_after: None };

    #[test]
    fn backoff_doubles_until_the_cap() {
        let policy = policy(5);
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn first_try_success() {
        let mut machine = RetryMachine::new(policy(3));
        assert_eq!(
            machine.record_success(),
            RetryState::Succeeded { attempts: 1 }
        );
    }

    #[test]
    fn throttled_attempt_backs_off_then_succeeds() {
        let mut machine = RetryMachine::new(policy(3));
        assert_eq!(
            machine.record_failure(THROTTLED),
            RetryState::Backoff {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(machine.resume(), RetryState::Attempting { attempt: 2 });
        assert_eq!(
            machine.record_success(),
            RetryState::Succeeded { attempts: 2 }
        );
    }

    #[test]
    fn retries_are_capped() {
        let mut machine = RetryMachine::new(policy(2));
        machine.record_failure(THROTTLED);
        machine.resume();
        machine.record_failure(THROTTLED);
        machine.resume();
        assert_eq!(
            machine.record_failure(THROTTLED),
            RetryState::Failed { attempts: 3 }
        );
        assert_eq!(machine.resume(), RetryState::Failed { attempts: 3 });
    }

    #[test]
    fn fatal_failures_are_not_retried() {
        let mut machine = RetryMachine::new(policy(5));
        assert_eq!(
            machine.record_failure(Failure::Fatal),
            RetryState::Failed { attempts: 1 }
        );
    }

    #[test]
    fn provider_hint_extends_the_delay_within_the_cap() {
        let mut machine = RetryMachine::new(policy(5));
        let hinted = Failure::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(
            machine.record_failure(hinted),
            RetryState::Backoff {
                attempt: 1,
                delay: Duration::from_secs(7)
            }
        );

        let mut capped = RetryMachine::new(policy(5));
        let excessive = Failure::RateLimited {
            retry_after: Some(Duration::from_secs(600)),
        };
        assert!(matches!(
            capped.record_failure(excessive),
            RetryState::Backoff { delay, .. } if delay == Duration::from_secs(10)
        ));
    }
}
