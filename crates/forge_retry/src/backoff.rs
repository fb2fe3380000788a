//! Exponential backoff with jitter.

use std::time::Duration;

use uuid::Uuid;

/// Uniform sample in `[0, 1]`, drawn from the random bits of a v4 UUID.
pub fn random_unit() -> f64 {
    // The top 48 bits precede the version nibble and are fully random.
    let bits = (Uuid::new_v4().as_u128() >> 80) as u64;
    bits as f64 / ((1u64 << 48) - 1) as f64
}

/// Delay actually waited after a failure.
///
/// `sample` in `[0, 1]` maps linearly onto
/// `current ± jitter_fraction * current`; the result never exceeds `max`.
pub fn jittered_delay(current: Duration, jitter_fraction: f64, max: Duration, sample: f64) -> Duration {
    let base = current.as_nanos() as f64;
    let offset = base * jitter_fraction * (2.0 * sample.clamp(0.0, 1.0) - 1.0);
    Duration::from_nanos((base + offset).max(0.0).round() as u64).min(max)
}

/// Backoff delay for the failure after this one.
pub fn next_delay(current: Duration, multiplier: f64, max: Duration) -> Duration {
    let grown = current.as_nanos() as f64 * multiplier;
    if !grown.is_finite() || grown >= max.as_nanos() as f64 {
        return max;
    }
    Duration::from_nanos(grown.round() as u64).max(current)
}
