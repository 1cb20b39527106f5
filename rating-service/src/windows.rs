//! Collection window generation.

use chrono::{DateTime, Duration, Utc};

/// Half-open `[start, end)` collection interval.
pub type Window = (DateTime<Utc>, DateTime<Utc>);

/// Split `[start, end)` into consecutive windows of exactly `window_size`.
///
/// Windows are contiguous, non-overlapping and ordered. Generation stops
/// early once `max_windows` is reached so one stale tenant cannot monopolize
/// a collection cycle; the remainder is picked up next cycle. No partial
/// window is ever produced. Pure function of its inputs.
pub fn get_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    window_size: Duration,
    max_windows: usize,
) -> Vec<Window> {
    let mut windows = Vec::new();
    if window_size <= Duration::zero() || max_windows == 0 {
        return windows;
    }

    let mut cursor = start;
    while cursor + window_size <= end {
        let window_end = cursor + window_size;
        windows.push((cursor, window_end));

        if windows.len() >= max_windows {
            break;
        }

        cursor = window_end;
    }

    windows
}
