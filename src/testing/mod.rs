//! Testing utilities: emission recorders and subscription probes.
//!
//! - [`Recorder`] — collects every value pushed to its callback.
//! - [`Probe`] — wraps a source and counts subscribe/unsubscribe calls.

pub mod probe;
pub mod recorder;

pub use probe::Probe;
pub use recorder::Recorder;
