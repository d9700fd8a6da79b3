//! Scheduling.
//!
//! Backoff arithmetic, the host job-scheduler interface and the controller
//! that re-arms each recurring task after every cycle.

pub mod backoff;
pub mod controller;
pub mod jobs;

pub use backoff::*;
pub use controller::*;
pub use jobs::*;
