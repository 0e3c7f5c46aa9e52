//! Time source shared by every pipeline component

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};
pub(crate) use clock::{elapsed_ms, has_elapsed};
