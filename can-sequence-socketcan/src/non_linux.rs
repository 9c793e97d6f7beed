use can_sequence::{FrameRx, FrameTx, IdFilter, RxError, RxMeta, SeqFrame, TxError};
use core::fmt;
use core::time::Duration;
use std::io;

/// Returned when attempting to use SocketCAN on a non-Linux target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedPlatformError;

impl fmt::Display for UnsupportedPlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SocketCAN is only supported on Linux targets")
    }
}

impl std::error::Error for UnsupportedPlatformError {}

fn unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, UnsupportedPlatformError)
}

/// SocketCAN endpoint (non-Linux stub).
#[derive(Debug, Default)]
pub struct SocketCanEndpoint;

impl SocketCanEndpoint {
    /// Always fails with [`UnsupportedPlatformError`] on non-Linux targets.
    pub fn open(_iface: &str) -> io::Result<Self> {
        Err(unsupported())
    }

    /// Always fails with [`UnsupportedPlatformError`] on non-Linux targets.
    pub fn install_filter(&mut self, _filter: &IdFilter) -> io::Result<()> {
        Err(unsupported())
    }

    /// Metadata is never available here.
    pub fn enable_rx_metadata(&mut self) -> bool {
        false
    }

    pub fn has_overflow_metadata(&self) -> bool {
        false
    }
}

impl FrameTx for SocketCanEndpoint {
    fn send(&mut self, _frame: &SeqFrame) -> Result<(), TxError> {
        Err(TxError::Link(unsupported()))
    }

    fn wait_writable(&mut self, _timeout: Duration) -> Result<bool, TxError> {
        Err(TxError::Link(unsupported()))
    }
}

impl FrameRx for SocketCanEndpoint {
    fn recv(&mut self) -> Result<(SeqFrame, RxMeta), RxError> {
        Err(RxError::Link(unsupported()))
    }
}
