//! Self-adjusting computation cells.
//!
//! - [`engine`] — [`Cell`], its phases, refresh and subscriber staging
//! - [`read`] — [`ReadCx`], the dependency-read operator handed to thunks
//! - `generation` — the two-buffer dependency maps swapped on every refresh

pub mod engine;
pub(crate) mod generation;
pub mod read;

pub use engine::{new_cell, Cell, Phase};
pub use read::ReadCx;
