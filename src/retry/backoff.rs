use std::time::Duration;

use rand::Rng;

/// Delay strategy applied between retries.
///
/// # Example
///
/// ```
/// use shardwire::Backoff;
/// use std::time::Duration;
///
/// let backoff = Backoff::exponential(Duration::from_micros(8000), Duration::from_micros(512000));
/// assert_eq!(backoff.compute(0), Duration::from_micros(8000));
/// assert_eq!(backoff.compute(3), Duration::from_micros(64000));
/// assert_eq!(backoff.compute(6), Duration::from_micros(512000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    NoBackoff,
    /// Constant delay.
    Equal {
        /// Delay before every retry.
        base: Duration,
    },
    /// `min(cap, base * 2^failures)`, or with full jitter
    /// `min(cap, random[0, 1) * base * 2^failures)`.
    Exponential {
        /// Delay after the first failure.
        base: Duration,
        /// Upper bound of any delay.
        cap: Duration,
        /// Randomize over the whole interval instead of using its top.
        jitter: bool,
    },
}

impl Backoff {
    /// No delay.
    pub fn none() -> Self {
        Backoff::NoBackoff
    }

    /// Constant `base` delay.
    pub fn equal(base: Duration) -> Self {
        Backoff::Equal { base }
    }

    /// Doubling delay without jitter.
    pub fn exponential(base: Duration, cap: Duration) -> Self {
        Backoff::Exponential {
            base,
            cap,
            jitter: false,
        }
    }

    /// Doubling delay with full jitter.
    pub fn exponential_jitter(base: Duration, cap: Duration) -> Self {
        Backoff::Exponential {
            base,
            cap,
            jitter: true,
        }
    }

    /// Delay after `failures` consecutive failures (zero-based).
    pub fn compute(&self, failures: u32) -> Duration {
        self.compute_with(failures, &mut rand::thread_rng())
    }

    /// Like [`compute`](Backoff::compute) with a caller-supplied random
    /// source for the jitter.
    pub fn compute_with<R: Rng + ?Sized>(&self, failures: u32, rng: &mut R) -> Duration {
        match *self {
            Backoff::NoBackoff => Duration::ZERO,
            Backoff::Equal { base } => base,
            Backoff::Exponential { base, cap, jitter } => {
                // Saturating nanosecond arithmetic keeps large failure counts
                // exact for a zero or tiny base.
                let grown = base
                    .as_nanos()
                    .saturating_mul(2u128.saturating_pow(failures));
                let nanos = if jitter {
                    (grown as f64 * rng.gen::<f64>()) as u128
                } else {
                    grown
                };
                if nanos >= cap.as_nanos() {
                    return cap;
                }
                u64::try_from(nanos).map_or(cap, Duration::from_nanos)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::exponential_jitter(Duration::from_millis(8), Duration::from_millis(512))
    }
}
