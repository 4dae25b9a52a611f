//! Timing gates and the bounded data-ready poll used by slow sensors.

use crate::config::DataReadyPolicy;
use crate::time_utils::Clock;
use embedded_hal::delay::DelayNs;
use log::{debug, warn};

/// Minimum spacing between two reads of the same sensor.
#[derive(Clone, Copy, Debug)]
pub struct ReadinessGate {
    min_interval_ms: u64,
    last_read_ms: Option<u64>,
}

impl ReadinessGate {
    pub const fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_read_ms: None,
        }
    }

    pub fn is_open(&self, clock: &impl Clock) -> bool {
        self.remaining_ms(clock) == 0
    }

    pub fn remaining_ms(&self, clock: &impl Clock) -> u64 {
        match self.last_read_ms {
            None => 0,
            Some(last) => self
                .min_interval_ms
                .saturating_sub(clock.now_ms().saturating_sub(last)),
        }
    }

    /// Record a read attempt, successful or not.
    pub fn mark(&mut self, clock: &impl Clock) {
        self.last_read_ms = Some(clock.now_ms());
    }

    pub fn last_read_ms(&self) -> Option<u64> {
        self.last_read_ms
    }
}

/// Fixed delay after bring-up before the first trustworthy measurement.
#[derive(Clone, Copy, Debug)]
pub struct WarmupGate {
    warmup_ms: u64,
    started_ms: Option<u64>,
}

impl WarmupGate {
    pub const fn new(warmup_ms: u64) -> Self {
        Self {
            warmup_ms,
            started_ms: None,
        }
    }

    pub fn start(&mut self, clock: &impl Clock) {
        self.started_ms = Some(clock.now_ms());
    }

    pub fn reset(&mut self) {
        self.started_ms = None;
    }

    pub fn started_ms(&self) -> Option<u64> {
        self.started_ms
    }

    /// `None` until started.
    pub fn remaining_ms(&self, clock: &impl Clock) -> Option<u64> {
        self.started_ms.map(|started| {
            self.warmup_ms
                .saturating_sub(clock.now_ms().saturating_sub(started))
        })
    }

    pub fn is_elapsed(&self, clock: &impl Clock) -> bool {
        self.remaining_ms(clock) == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    /// The device kept failing to answer within the communication retry budget.
    Communication { attempts: u16, error: E },
    /// The device answered but never raised the flag.
    Exhausted { attempts: u16 },
}

/// Poll `probe` until it reports ready.
///
/// Communication errors are retried with `comm_retry_delay_ms` backoff while
/// fewer than `comm_retry_attempts` polls have been made; after that the first
/// error ends the poll. A clear flag is re-polled every `poll_delay_ms` up to
/// `max_attempts` polls in total. Returns the number of polls on success.
pub fn poll_data_ready<E: core::fmt::Debug>(
    policy: &DataReadyPolicy,
    delay: &mut impl DelayNs,
    mut probe: impl FnMut() -> Result<bool, E>,
) -> Result<u16, PollError<E>> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts: u16 = 0;

    loop {
        attempts += 1;

        match probe() {
            Ok(true) => {
                debug!("data ready after {} attempts", attempts);
                return Ok(attempts);
            }
            Ok(false) => {
                if attempts >= max_attempts {
                    return Err(PollError::Exhausted { attempts });
                }
                delay.delay_ms(policy.poll_delay_ms);
            }
            Err(error) if attempts < policy.comm_retry_attempts => {
                warn!(
                    "communication retry {}/{}: {:?}",
                    attempts, policy.comm_retry_attempts, error
                );
                if attempts >= max_attempts {
                    return Err(PollError::Exhausted { attempts });
                }
                delay.delay_ms(policy.comm_retry_delay_ms);
            }
            Err(error) => return Err(PollError::Communication { attempts, error }),
        }
    }
}
