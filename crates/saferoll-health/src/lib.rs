//! saferoll-health: rolling device-health windows for SafeRoll.
//!
//! Each ring owns a [`HealthWindow`]: a buffer of check-in samples bounded
//! both by age and by count. Aggregation computes the SLO statistics the
//! policy engine gates on.
//!
//! # Architecture
//!
//! ```text
//! RingWindows
//!   └── one Mutex<HealthWindow> per ring
//!       ├── record()    → append, evict past capacity, prune by age
//!       └── aggregate() → prune by age, then WindowMetrics
//! ```
//!
//! Pruning is lazy: it runs on every read and write, never on a timer.

pub mod window;

pub use window::{median, Breach, HealthWindow, RingWindows, WindowMetrics};
