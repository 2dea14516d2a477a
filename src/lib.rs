//! # cellflow
//!
//! Self-adjusting reactive cells for single-threaded Rust programs.
//!
//! cellflow is a small incremental-computation core: values flow from
//! sources through derived combinators into cells that track exactly which
//! sources they read, recompute only when one of them changes, and notify
//! subscribers only when the result actually differs. Everything speaks the
//! same push-based [`Subscribable`] contract, so a cell may depend on another
//! cell, on a derived `sub`, or on any adapter.
//!
//! ## Core Systems
//!
//! - **[`subscribable`]** — The subscription contract, tokens, subscriber registry
//! - **[`adapters`]** — Observables, futures, streams, listenables as sources
//! - **[`combinator`]** — `sub` / `sub_all` derived values with change dedup
//! - **[`cell`]** — The cell engine and the dependency-read context
//! - **[`retriable`]** — Replace-on-retry asynchronous operations
//! - **[`error`]** — Error type shared by every node
//! - **[`config`]** — Per-cell configuration
//! - **[`testing`]** — Recorders and probes for tests
//!
//! ## Example
//!
//! ```ignore
//! use cellflow::{new_cell, Observable, SubscribableExt};
//!
//! let x = Observable::new(0);
//! let y = Observable::new(10);
//! let (xc, yc) = (x.clone(), y.clone());
//! let sum = new_cell(move |cx| Ok(cx.read(&xc)? + cx.read(&yc)?));
//! sum.listen(|v| println!("sum = {v}"))?;
//! x.set(5); // prints "sum = 15"
//! ```
//!
//! All handles are `!Send`. Async sources and [`Retriable`] spawn their work
//! with `tokio::task::spawn_local` and must be driven from a `LocalSet`.

// Foundation
pub mod config;
pub mod error;
pub mod subscribable;

// Sources
pub mod adapters;
pub mod combinator;

// Engine
pub mod cell;
pub mod retriable;

// Test support
pub mod testing;

pub use adapters::{
    Absent, FutureSource, Listenable, ListenableSource, Notifier, Observable, StreamSource,
    StreamStatus, ValueListenable, ValueListenableSource, ValueNotifier,
};
pub use cell::{new_cell, Cell, Phase, ReadCx};
pub use combinator::{sub, sub_all, Sub, SubAll};
pub use config::CellConfig;
pub use error::ReactiveError;
pub use retriable::{new_retriable, retry, Retriable};
pub use subscribable::{callback, Callback, SourceId, Subscribable, SubscribableExt, SubscriptionToken};
