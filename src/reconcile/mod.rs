//! Reconciliation of in-memory views against the store's change streams.

pub mod collection;
pub mod day;
pub mod entity;
pub mod event;
pub mod view;

pub use collection::{Applied, Collection, CollectionState, ConflictPolicy, IgnoreReason, Snapshot};
pub use day::{DayFrames, DayView};
pub use entity::{Entity, Scope};
pub use event::{ChangeEvent, EventType};
pub use view::{LiveView, ViewError, wait_ready};
