//! Scheduling primitives for expiring per-connection timeouts.
//!
//! Currently, this module contains an ascending doubly linked timer list backed by an arena,
//! giving O(1) cancellation and O(1) expiry of the soonest timer.
use std::fmt::Debug;

pub mod list;
pub mod timer;

/// Ordering contract for clock values used as expiry times.
///
/// Unit and epoch are up to the caller, but must stay consistent across every `expire`
/// value and `tick` call of one list.
pub trait Deadline: Ord + Copy + Debug {}

impl<T: Ord + Copy + Debug> Deadline for T {}
