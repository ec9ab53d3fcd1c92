//! Backoff computation shared by the uploader, the sync worker and the
//! ingest supervisor.
//!
//! The upload/sync delay for attempt `n >= 1` with base `B` is
//! `min(B * 2^(n-1) + uniform(0, B), cap)`. Segmenter restarts use the
//! separate `min(2^restarts, 600) + uniform(0, 5)` schedule.

use std::time::Duration;

use rand::Rng;

/// Hard ceiling on any upload/sync retry delay.
pub const BACKOFF_CAP_SECONDS: u64 = 3_600;

/// Ceiling on the exponential part of a segmenter restart delay.
pub const RESTART_CAP_SECONDS: u64 = 600;

/// Retry delay for a failed upload/sync transaction.
///
/// `attempt` is the 1-based number of failed transactions so far; values
/// below 1 are treated as 1.
pub fn backoff_delay(base_seconds: u64, attempt: u32, cap_seconds: u64) -> Duration {
    let base = base_seconds.max(1) as f64;
    let exponent = attempt.max(1) - 1;
    let exponential = base * 2_f64.powi(exponent.min(63) as i32);
    let jitter = rand::thread_rng().gen_range(0.0..base);
    Duration::from_secs_f64((exponential + jitter).min(cap_seconds as f64))
}

/// Delay before restarting an exited segmenter child.
pub fn restart_delay(restart_count: u32) -> Duration {
    let exponential = 2_u64
        .checked_pow(restart_count.min(63))
        .unwrap_or(RESTART_CAP_SECONDS)
        .min(RESTART_CAP_SECONDS);
    let jitter = rand::thread_rng().gen_range(0.0..5.0);
    Duration::from_secs_f64(exponential as f64 + jitter)
}

/// Whether an HTTP status (0 for transport failures) falls under the retry
/// policy. 5xx and transport errors retry; everything else is permanent.
pub fn is_retryable_status(status: u16) -> bool {
    status == 0 || (500..=599).contains(&status)
}
