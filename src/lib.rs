//! # Tide Watch Core Library
//!
//! This library turns sparse NOAA high/low tide predictions into a continuous,
//! queryable tide state, and maintains a searchable directory of tide stations
//! backed by a disk cache and a single-flight network refresh.
//!
//! ## Subsystems
//!
//! ### Tide Derivation Engine ([`engine`])
//! Pure, synchronous functions that take a caller-supplied "now" and a series
//! of predicted extrema (alternating highs and lows) and derive the current
//! interpolated height, the rising/falling trend, the nearest past and future
//! high/low events, and a windowed series suitable for charting. The engine
//! holds no state, performs no I/O, and never fails; missing input degrades
//! to a [`Trend::Unknown`] snapshot rather than an error.
//!
//! ### Station Directory ([`directory`])
//! Owns an in-memory catalog of NOAA stations with a 7-day staleness policy.
//! The catalog is loaded from an on-disk cache when fresh, and refreshed from
//! the network otherwise. Concurrent lookups during a cold cache are coalesced
//! by the [`singleflight::FetchCoordinator`] so that exactly one fetch hits
//! the upstream, no matter how many callers are waiting on it.
//!
//! ## Data Flow
//!
//! 1. **Directory**: UI query → freshness check → (coalesced) catalog fetch →
//!    substring or nearest-distance filter over the catalog snapshot.
//! 2. **Tide state**: hilo predictions for the selected station →
//!    [`engine::derive`] → [`TideSnapshot`] consumed by the display and by
//!    the reminder scheduler (which reads `next_high`/`next_low`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod cache;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod noaa;
pub mod singleflight;

pub use error::TideError;

/// Whether a predicted extremum is a high or a low water mark.
///
/// This label comes straight from the prediction source and is treated as
/// ground truth when classifying the tide trend: between a LOW and the next
/// point the water is rising, between a HIGH and the next point it is
/// falling. The engine never re-derives the kind from height deltas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TideKind {
    /// Local maximum of the tide curve (high water).
    High,
    /// Local minimum of the tide curve (low water).
    Low,
}

/// One predicted tide extremum: the instant and height of a high or low.
///
/// Heights are datum-relative (feet above MLLW for NOAA stations) and may be
/// negative. Within a well-formed series the kinds strictly alternate when
/// sorted by time, but the engine does not assume this: upstream data gaps
/// can break alternation, and derivation degrades gracefully instead.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use tide_watch_lib::{ExtremaPoint, TideKind};
///
/// let high = ExtremaPoint {
///     timestamp: Utc.with_ymd_and_hms(2025, 6, 16, 3, 12, 0).unwrap(),
///     height: 9.7,
///     kind: TideKind::High,
/// };
/// assert_eq!(high.kind, TideKind::High);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtremaPoint {
    /// Absolute instant of the extremum, UTC.
    pub timestamp: DateTime<Utc>,
    /// Predicted height in feet relative to the station datum.
    pub height: f32,
    /// High or low water.
    pub kind: TideKind,
}

/// Direction of tide movement at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    /// Water level is increasing toward the next high.
    Rising,
    /// Water level is decreasing toward the next low.
    Falling,
    /// No prediction data available to classify the direction.
    Unknown,
}

/// A bare (instant, height) pair for one of the snapshot's extrema slots.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TideEvent {
    /// Absolute instant of the event, UTC.
    pub timestamp: DateTime<Utc>,
    /// Height in feet relative to the station datum.
    pub height: f32,
}

impl From<&ExtremaPoint> for TideEvent {
    fn from(p: &ExtremaPoint) -> Self {
        TideEvent {
            timestamp: p.timestamp,
            height: p.height,
        }
    }
}

/// Derived tide state at one instant, produced by [`engine::derive`].
///
/// A snapshot is immutable: each derivation call builds a fresh one from the
/// caller's "now" and prediction series, and the previous snapshot is simply
/// superseded. The four extrema slots are `Option` because the prediction
/// window may not contain a past or future event of each kind; `None` means
/// "no data", never a sentinel timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct TideSnapshot {
    /// Linearly interpolated water height at "now", in feet.
    pub current_height: f32,
    /// Rising, falling, or unknown when no data is available.
    pub trend: Trend,
    /// Most recent high at or before "now", if the window contains one.
    pub last_high: Option<TideEvent>,
    /// Earliest high after "now", if the window contains one.
    pub next_high: Option<TideEvent>,
    /// Most recent low at or before "now", if the window contains one.
    pub last_low: Option<TideEvent>,
    /// Earliest low after "now", if the window contains one.
    pub next_low: Option<TideEvent>,
    /// Points within the chart window around "now", sorted ascending.
    pub chart_series: Vec<ExtremaPoint>,
}

/// One entry in the station catalog.
///
/// `id` is the source-assigned NOAA station identifier (e.g. `"8418150"`)
/// and is unique within a catalog. Stations are immutable once constructed;
/// a refresh replaces the whole catalog rather than patching entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Source-assigned unique identifier.
    pub id: String,
    /// Official station name (e.g. "Portland").
    pub name: String,
    /// State or region label, when the source provides one.
    pub region: Option<String>,
    /// WGS84 latitude in degrees.
    pub latitude: f64,
    /// WGS84 longitude in degrees.
    pub longitude: f64,
}

/// The directory's owned catalog state: the station list plus the instant of
/// the last successful refresh.
///
/// `last_refreshed = None` means the catalog has never been populated from
/// the network (or the disk copy was too stale to trust). The catalog is
/// only ever replaced wholesale, so readers always observe a consistent
/// station list from a single fetch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// All known stations, in source order.
    pub stations: Vec<Station>,
    /// Instant of the last successful refresh, if any.
    pub last_refreshed: Option<DateTime<Utc>>,
}
