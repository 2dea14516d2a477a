//! The uniform push-based subscription contract.
//!
//! Every value source in the crate (adapters, derived combinators, cells,
//! retriables) implements [`Subscribable`], so they all compose uniformly.
//!
//! - [`Subscribable`] — subscribe / try-deliver-current / unsubscribe.
//! - [`SubscriptionToken`] — opaque handle naming one subscription.
//! - [`SourceId`] — process-unique identity of a source.
//! - [`SubscriberList`] — ordered registry used by every built-in source.

pub mod registry;
pub mod token;
pub mod traits;

pub use registry::{broadcast, SubscriberList};
pub use token::{SourceId, SubscriptionToken};
pub use traits::{callback, Callback, Subscribable, SubscribableExt};
