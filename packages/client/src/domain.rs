//! Domain logic for the reconnect policy.
//!
//! This module contains pure functions that implement business logic
//! without side effects, making them easy to test.

use std::time::Duration;

use crate::error::ConnectError;

/// Check if the run loop should attempt to reconnect.
///
/// # Arguments
///
/// * `error` - The connection error that ended the last attempt
/// * `auto_reconnect` - Whether reconnecting is enabled at all
/// * `retries_so_far` - Reconnects already made since the last successful login
/// * `max_retries` - The maximum number of reconnects allowed
///
/// # Returns
///
/// `true` if reconnection should be attempted, `false` otherwise
pub fn should_attempt_reconnect(
    error: &ConnectError,
    auto_reconnect: bool,
    retries_so_far: u32,
    max_retries: u32,
) -> bool {
    if !auto_reconnect || !error.is_retryable() {
        return false;
    }

    retries_so_far < max_retries
}

/// Delay before reconnect number `retries_so_far + 1`.
///
/// Doubles from `initial` per consecutive failure and never exceeds `max`.
pub fn reconnect_delay(retries_so_far: u32, initial: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(retries_so_far).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}
