//! Participant-side state. No I/O.

pub mod history;
pub mod reconcile;
pub mod throttle;

pub use history::HistoryStack;
pub use reconcile::{Mode, Reconciler};
pub use throttle::{Bounds, CursorThrottler};
