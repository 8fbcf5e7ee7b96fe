//! Query execution tracking
//!
//! - Abort signal: always available, checked cooperatively between pulls
//! - Fuel: counted per row handed to the top-level consumer; errors once the
//!   total passes the limit
//! - Time: elapsed since the tracker was created, reported in the tally

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Tracking options parsed from query `opts`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingOptions {
    pub track_time: bool,
    pub track_fuel: bool,
    /// None = unlimited, Some(0) also unlimited
    pub max_fuel: Option<u64>,
}

impl TrackingOptions {
    /// Parse tracking options from a JSON `opts` object value.
    ///
    /// Expected shapes:
    /// - `"opts": {"meta": true}` enables all tracking
    /// - `"opts": {"meta": {"time": true, "fuel": true}}` selective
    /// - `"opts": {"max-fuel": 1000}` implicitly enables fuel tracking
    ///
    /// Also accepts camel/snake variants for max-fuel (`max_fuel`, `maxFuel`).
    pub fn from_opts_value(opts: Option<&JsonValue>) -> Self {
        let Some(opts) = opts.and_then(|v| v.as_object()) else {
            return Self::default();
        };

        let meta = opts.get("meta");
        let max_fuel = opts
            .get("max-fuel")
            .or_else(|| opts.get("max_fuel"))
            .or_else(|| opts.get("maxFuel"))
            .and_then(|v| v.as_u64());

        let track_all = matches!(meta, Some(JsonValue::Bool(true)));
        let meta_obj = meta.and_then(|v| v.as_object());

        let meta_flag = |k: &str| -> bool {
            meta_obj
                .and_then(|m| m.get(k))
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
        };

        Self {
            track_time: track_all || meta_flag("time"),
            track_fuel: max_fuel.is_some() || track_all || meta_flag("fuel"),
            max_fuel,
        }
    }

    #[inline]
    pub fn any_enabled(&self) -> bool {
        self.track_time || self.track_fuel
    }

    /// Tracking options with time and fuel enabled, no fuel limit.
    pub fn all_enabled() -> Self {
        Self {
            track_time: true,
            track_fuel: true,
            max_fuel: None,
        }
    }
}

/// Fuel limit exceeded
#[derive(Debug, Clone, Error)]
#[error("Fuel limit exceeded")]
pub struct FuelExceededError {
    pub used: u64,
    pub limit: u64,
}

struct TrackerInner {
    start_time: Option<Instant>,
    fuel_total: AtomicU64,
    fuel_limit: u64, // 0 = unlimited
    options: TrackingOptions,
}

/// Per-query execution tracker.
///
/// Cheap to clone; clones share the abort flag and counters, so a handle kept
/// by the caller can abort a pipeline that owns another clone.
#[derive(Clone, Default)]
pub struct Tracker {
    aborted: Arc<AtomicBool>,
    inner: Option<Arc<TrackerInner>>,
}

impl Tracker {
    /// Create a tracker from options. Time and fuel stay disabled unless requested.
    pub fn new(options: TrackingOptions) -> Self {
        if !options.any_enabled() {
            return Self::disabled();
        }

        Self {
            aborted: Arc::new(AtomicBool::new(false)),
            inner: Some(Arc::new(TrackerInner {
                start_time: options.track_time.then(Instant::now),
                fuel_total: AtomicU64::new(0),
                fuel_limit: options.max_fuel.unwrap_or(0),
                options,
            })),
        }
    }

    /// Tracker with only the abort signal.
    pub fn disabled() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    #[inline]
    pub fn tracks_fuel(&self) -> bool {
        self.inner
            .as_ref()
            .map(|i| i.options.track_fuel)
            .unwrap_or(false)
    }

    /// Request cooperative cancellation of the query.
    pub fn kill(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    /// Whether `kill` has been called on this tracker or any clone.
    #[inline]
    pub fn is_killed(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Consume `n` units of fuel (one per row handed to the consumer).
    pub fn consume_fuel(&self, n: u64) -> Result<(), FuelExceededError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        if !inner.options.track_fuel || n == 0 {
            return Ok(());
        }

        let new_total = inner.fuel_total.fetch_add(n, Ordering::Relaxed) + n;
        if inner.fuel_limit > 0 && new_total > inner.fuel_limit {
            return Err(FuelExceededError {
                used: new_total,
                limit: inner.fuel_limit,
            });
        }
        Ok(())
    }

    /// Fuel consumed so far (0 when fuel is not tracked).
    pub fn fuel_used(&self) -> u64 {
        self.inner
            .as_ref()
            .map(|i| i.fuel_total.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Finalize tracking into a serializable tally.
    pub fn tally(&self) -> Option<TrackingTally> {
        let inner = self.inner.as_ref()?;

        let elapsed = inner.start_time.map(|t| t.elapsed());
        Some(TrackingTally {
            time: elapsed.map(format_time_ms),
            time_ms: elapsed.map(|d| d.as_secs_f64() * 1000.0),
            fuel: inner
                .options
                .track_fuel
                .then(|| inner.fuel_total.load(Ordering::Relaxed)),
        })
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("killed", &self.is_killed())
            .field("enabled", &self.is_enabled())
            .field("fuel_used", &self.fuel_used())
            .finish()
    }
}

/// Tracking tally returned on completion.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingTally {
    /// Formatted time string like `"12.34ms"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Numeric milliseconds for span recording
    #[serde(skip_serializing)]
    pub time_ms: Option<f64>,
    /// Total fuel consumed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel: Option<u64>,
}

fn format_time_ms(duration: Duration) -> String {
    let ms = duration.as_secs_f64() * 1000.0;
    format!("{:.2}ms", ms)
}
