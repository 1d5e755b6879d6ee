use thiserror::Error;

/// Error type for the timer list and the policies built on it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    #[error("Timer handle is stale or belongs to another list")]
    UnknownTimer,
    #[error("Adjust can only move a timer later; remove and re-insert to move it earlier")]
    ExpiryDecreased,
    #[error("Timer list invariant violated: {reason}")]
    Corrupted { reason: String },
    #[error("Invalid reaper configuration: {description}")]
    InvalidConfig { description: String },
    #[error("Connection is not tracked by this reaper")]
    UnknownConnection,
}
