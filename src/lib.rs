//! Timeout bookkeeping for event-driven servers.
//!
//! The core is [`TimerList`], an ascending list of timers driven by a clock value supplied by the
//! event loop. [`IdleReaper`] builds the usual "close connections that went quiet" policy on top
//! of it.
pub mod clock;
pub mod error;
pub mod reaper;
pub mod scheduling;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::TimerError;
pub use reaper::{IdleReaper, ReaperConfig};
pub use scheduling::{
    list::TimerList,
    timer::{Callback, Timer, TimerKey},
    Deadline,
};
