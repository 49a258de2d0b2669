//! Backlog collapsing and update coalescing.
//!
//! The feed producer can outrun the display by orders of magnitude. Two
//! stages keep memory and redraw work bounded:
//!
//! - **Collapser**: per poll tick, drains the subscriber under a
//!   [`BackpressurePolicy`] and turns a burst into at most one decoded
//!   envelope (plus any raw frames, which are never merged).
//! - **Update buffer**: between flush ticks, keeps only the latest sample
//!   per signal for everything that is not delivered immediately.

pub mod buffer;
pub mod collapser;
pub mod policy;

pub use buffer::{BufferStats, UpdateBuffer};
pub use collapser::{discard_backlog, drain, DrainReport};
pub use policy::BackpressurePolicy;
