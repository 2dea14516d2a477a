//! Source adapters: concrete value sources speaking the subscription contract.
//!
//! - [`Observable`] — mutable cell with watchers and a current value.
//! - [`FutureSource`] — one-shot future, spawned on first subscribe.
//! - [`StreamSource`] — multi-value stream that cancels on its first error.
//! - [`ValueListenableSource`] — value-holding listenable (e.g. [`ValueNotifier`]).
//! - [`ListenableSource`] — plain listenable, counting ticks (e.g. [`Notifier`]).
//! - [`Absent`] — never subscribes, never delivers.

pub mod absent;
pub mod future;
pub mod listenable;
pub mod observable;
pub mod stream;

pub use absent::Absent;
pub use future::FutureSource;
pub use listenable::{
    Listenable, ListenableSource, ListenerId, Notifier, ValueListenable, ValueListenableSource,
    ValueNotifier,
};
pub use observable::Observable;
pub use stream::{StreamSource, StreamStatus};
