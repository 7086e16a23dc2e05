//! # Tide Derivation Engine
//!
//! Pure functions that convert a sparse series of predicted extrema into a
//! continuous tide state: the interpolated height at "now", the rising or
//! falling trend, the nearest past/future high and low, and a windowed
//! series for charting.
//!
//! ## Design
//!
//! - **No I/O, no state**: every call takes an explicit `now` and the full
//!   prediction series, and returns a fresh [`TideSnapshot`]. Safe to call
//!   from any number of concurrent tasks.
//! - **Never fails**: empty, unsorted, or non-alternating input degrades the
//!   result (unknown trend, unset extrema) instead of erroring. A broken
//!   dashboard is worse than a dash.
//! - **Kind is ground truth**: the trend is classified from the *labeled*
//!   kind of the bracketing extremum, not from the sign of a height delta.
//!   The prediction source labels its extrema authoritatively, and height
//!   noise around a slack tide would make a delta-based answer flap.
//!
//! ## Interpolation
//!
//! Between the bracketing extrema the height follows a plain linear blend:
//!
//! ```text
//! height = prev.height + alpha * (next.height - prev.height)
//! alpha  = clamp((now - prev.t) / (next.t - prev.t), 0, 1)
//! ```
//!
//! A cosine ease would hug the real curve closer, but the consumers of the
//! interpolated value (a status line and a chart scrub readout) do not need
//! it, and linear keeps the bracketing-bounds property trivially true.

use crate::{ExtremaPoint, TideEvent, TideKind, TideSnapshot, Trend};
use chrono::{DateTime, Duration, Utc};

/// Default chart window behind "now": 12 hours.
pub const CHART_WINDOW_BACK_HOURS: i64 = 12;

/// Default chart window ahead of "now": 24 hours.
pub const CHART_WINDOW_FORWARD_HOURS: i64 = 24;

/// Derive the tide state at `now` from a series of predicted extrema, using
/// the default chart window of 12 hours back and 24 hours forward.
///
/// The input may be empty, unsorted, or contain non-alternating kinds; none
/// of these fail. An empty series yields `Trend::Unknown`, a height of
/// `0.0`, and all four extrema slots unset.
///
/// # Example
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use tide_watch_lib::engine::derive;
/// use tide_watch_lib::{ExtremaPoint, TideKind, Trend};
///
/// let low = Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 0).unwrap();
/// let series = vec![
///     ExtremaPoint { timestamp: low, height: 1.0, kind: TideKind::Low },
///     ExtremaPoint { timestamp: low + Duration::hours(6), height: 5.0, kind: TideKind::High },
/// ];
/// let snap = derive(low + Duration::hours(3), &series);
/// assert_eq!(snap.trend, Trend::Rising);
/// assert_eq!(snap.current_height, 3.0);
/// ```
pub fn derive(now: DateTime<Utc>, predictions: &[ExtremaPoint]) -> TideSnapshot {
    derive_with_window(
        now,
        predictions,
        Duration::hours(CHART_WINDOW_BACK_HOURS),
        Duration::hours(CHART_WINDOW_FORWARD_HOURS),
    )
}

/// [`derive`] with an explicit chart window around `now`.
///
/// Only the `chart_series` field depends on the window; height, trend, and
/// the four extrema slots consider the whole input series.
pub fn derive_with_window(
    now: DateTime<Utc>,
    predictions: &[ExtremaPoint],
    window_back: Duration,
    window_forward: Duration,
) -> TideSnapshot {
    let mut sorted: Vec<ExtremaPoint> = predictions.to_vec();
    sorted.sort_by_key(|p| p.timestamp);

    if sorted.is_empty() {
        return TideSnapshot {
            current_height: 0.0,
            trend: Trend::Unknown,
            last_high: None,
            next_high: None,
            last_low: None,
            next_low: None,
            chart_series: Vec::new(),
        };
    }

    // Partition point: everything before `split` is past (ts <= now).
    let split = sorted.partition_point(|p| p.timestamp <= now);
    let (past, future) = sorted.split_at(split);
    let prev = past.last();
    let next = future.first();

    let (current_height, trend) = match (prev, next) {
        (Some(prev), Some(next)) => {
            let span = (next.timestamp - prev.timestamp).num_seconds();
            let height = if span <= 0 {
                prev.height
            } else {
                let elapsed = (now - prev.timestamp).num_seconds();
                let alpha = (elapsed as f32 / span as f32).clamp(0.0, 1.0);
                prev.height + alpha * (next.height - prev.height)
            };
            (height, trend_after(prev.kind))
        }
        // Past the last known point: extrapolate the trend the last
        // extremum implies (after a LOW the water rises).
        (Some(prev), None) => (prev.height, trend_after(prev.kind)),
        // Before the first known point: extrapolate backward (approaching
        // a HIGH the water is rising).
        (None, Some(next)) => (next.height, trend_before(next.kind)),
        (None, None) => (0.0, Trend::Unknown),
    };

    // Nearest events per kind are independent scans over past/future: the
    // most recent low is not necessarily the immediate predecessor point
    // when the series has gaps or repeated kinds.
    let last_of = |kind: TideKind| past.iter().rev().find(|p| p.kind == kind).map(TideEvent::from);
    let next_of = |kind: TideKind| future.iter().find(|p| p.kind == kind).map(TideEvent::from);

    let window_start = now - window_back;
    let window_end = now + window_forward;
    let chart_series = sorted
        .iter()
        .filter(|p| p.timestamp >= window_start && p.timestamp <= window_end)
        .copied()
        .collect();

    TideSnapshot {
        current_height,
        trend,
        last_high: last_of(TideKind::High),
        next_high: next_of(TideKind::High),
        last_low: last_of(TideKind::Low),
        next_low: next_of(TideKind::Low),
        chart_series,
    }
}

/// Interpolate the height at an arbitrary instant, e.g. for a scrubbed chart
/// position. Returns `None` only for an empty series; when `at` falls outside
/// the series, the nearest endpoint's height is returned.
///
/// Sorting of the input does not matter: the bracketing points are found by
/// scanning for the latest point at or before `at` and the earliest point
/// after it.
pub fn interpolate(at: DateTime<Utc>, series: &[ExtremaPoint]) -> Option<f32> {
    let prev = series
        .iter()
        .filter(|p| p.timestamp <= at)
        .max_by_key(|p| p.timestamp);
    let next = series
        .iter()
        .filter(|p| p.timestamp > at)
        .min_by_key(|p| p.timestamp);

    match (prev, next) {
        (Some(prev), Some(next)) => {
            let span = (next.timestamp - prev.timestamp).num_seconds();
            if span <= 0 {
                return Some(prev.height);
            }
            let elapsed = (at - prev.timestamp).num_seconds();
            let alpha = (elapsed as f32 / span as f32).clamp(0.0, 1.0);
            Some(prev.height + alpha * (next.height - prev.height))
        }
        (Some(only), None) | (None, Some(only)) => Some(only.height),
        (None, None) => None,
    }
}

/// Trend after passing an extremum of the given kind.
fn trend_after(kind: TideKind) -> Trend {
    match kind {
        TideKind::Low => Trend::Rising,
        TideKind::High => Trend::Falling,
    }
}

/// Trend while approaching an extremum of the given kind.
fn trend_before(kind: TideKind) -> Trend {
    match kind {
        TideKind::High => Trend::Rising,
        TideKind::Low => Trend::Falling,
    }
}
