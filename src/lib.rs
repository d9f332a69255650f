//! Spatial indexing for scene objects: a linear (Morton-ordered) BVH with incremental
//! maintenance and a loose octree, both answering ray and frustum queries over
//! caller-owned objects described by an [`Aabb`](aabb::Aabb) and a payload key.

use std::time::{Duration, Instant};

use crate::aabb::Aabb;

pub mod aabb;
pub mod bvh;
pub mod error;
pub mod frustum;
pub mod morton;
pub mod octree;
pub mod par;
pub mod ray;

pub use bvh::{BvhConfig, BvhTree};
pub use error::SpatialIndexError;
pub use octree::{Octree, OctreeConfig};
pub use par::Scheduler;

/// The handle an index tracks: bounds plus a caller-defined payload.
///
/// The payload doubles as the object's identity inside an index and is never
/// interpreted. Indices keep copies of the handle; after changing `bounds` the
/// caller pushes the new value with `update` (or `refit`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneObject<K> {
    pub bounds: Aabb,
    pub user_data: K,
}

impl<K> SceneObject<K> {
    #[inline(always)]
    pub fn new(bounds: Aabb, user_data: K) -> Self {
        Self { bounds, user_data }
    }
}

/// Profiling scope, a no-op unless the `profile` feature is enabled.
#[macro_export]
macro_rules! scope {
    ($label:expr) => {
        #[cfg(feature = "profile")]
        profiling::scope!($label);
    };
}

/// Profiling scope that also logs its duration with the `scope_print` feature.
#[macro_export]
macro_rules! scope_print {
    ($label:expr) => {
        $crate::scope!($label);
        #[cfg(feature = "scope_print")]
        let _scope_timer = $crate::ScopeTimer::new($label);
    };
}

/// Like [`scope_print!`] but for the coarse stages, enabled by `scope_print_major`.
#[macro_export]
macro_rules! scope_print_major {
    ($label:expr) => {
        $crate::scope!($label);
        #[cfg(feature = "scope_print_major")]
        let _scope_timer = $crate::ScopeTimer::new($label);
    };
}

/// Logs the time between its creation and drop.
#[doc(hidden)]
pub struct ScopeTimer {
    label: &'static str,
    start: Instant,
}

impl ScopeTimer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopeTimer {
    fn drop(&mut self) {
        log::debug!("{}: {}", self.label, PrettyDuration(self.start.elapsed()));
    }
}

/// A wrapper struct for `std::time::Duration` to provide pretty-printing of durations.
#[doc(hidden)]
pub struct PrettyDuration(pub Duration);

impl std::fmt::Display for PrettyDuration {
    /// Durations are formatted as follows:
    /// - If the duration is greater than or equal to 1 second, it is formatted in seconds (s).
    /// - If the duration is at least 1 millisecond but less than 1 second, it is
    ///   formatted in milliseconds (ms).
    /// - If the duration is less than 1 millisecond, it is formatted in microseconds (µs).
    ///   Seconds and milliseconds are printed with two decimal places.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let duration = self.0;
        if duration.as_secs() > 0 {
            let seconds =
                duration.as_secs() as f64 + f64::from(duration.subsec_nanos()) / 1_000_000_000.0;
            write!(f, "{seconds:.2}s ")
        } else if duration.subsec_millis() > 0 {
            let milliseconds =
                duration.as_millis() as f64 + f64::from(duration.subsec_micros() % 1_000) / 1_000.0;
            write!(f, "{milliseconds:.2}ms")
        } else {
            let microseconds = duration.as_micros();
            write!(f, "{microseconds}µs")
        }
    }
}
