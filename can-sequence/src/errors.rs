//! Error types surfaced by transport endpoints and the sequence engine.

use std::io;
use thiserror::Error;

/// Outcome of a single failed send attempt, classified for the retry loop.
#[derive(Debug, Error)]
pub enum TxError {
    /// The outbound queue is full (`ENOBUFS`).
    #[error("transmit queue full: {0}")]
    QueueFull(io::Error),
    /// The call was interrupted by a signal before anything was sent.
    #[error("interrupted")]
    Interrupted,
    /// Any other link failure.
    #[error(transparent)]
    Link(io::Error),
}

impl From<io::Error> for TxError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::Interrupted {
            TxError::Interrupted
        } else if is_queue_full(&err) {
            TxError::QueueFull(err)
        } else {
            TxError::Link(err)
        }
    }
}

#[cfg(unix)]
fn is_queue_full(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOBUFS)
}

#[cfg(not(unix))]
fn is_queue_full(_err: &io::Error) -> bool {
    false
}

/// Outcome of a single failed receive attempt.
#[derive(Debug, Error)]
pub enum RxError {
    /// A signal interrupted the blocking receive.
    #[error("interrupted")]
    Interrupted,
    /// Any other link failure.
    #[error(transparent)]
    Link(io::Error),
}

impl From<io::Error> for RxError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::Interrupted {
            RxError::Interrupted
        } else {
            RxError::Link(err)
        }
    }
}

/// Fatal errors that end a transmit or receive run.
///
/// The display form names the failed operation followed by the underlying reason.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Queue full while backpressure polling is disabled.
    #[error("write: {0}")]
    QueueFull(io::Error),
    /// Non-recoverable transmit failure.
    #[error("write: {0}")]
    Transmit(io::Error),
    /// Waiting for transmit readiness failed.
    #[error("poll: {0}")]
    Poll(io::Error),
    /// Non-recoverable receive failure.
    #[error("read: {0}")]
    Receive(io::Error),
    /// Writing progress or reports to the console or log sink failed.
    #[error("output: {0}")]
    Output(#[from] io::Error),
}
