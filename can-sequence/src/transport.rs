//! Transport driver: the endpoint traits and the send/receive calls built on them.

use core::time::Duration;
use std::time::SystemTime;

use crate::errors::{EngineError, RxError, TxError};
use crate::frame::SeqFrame;
use crate::shutdown::RunFlag;

/// Transmit half of a bus endpoint.
pub trait FrameTx {
    /// Attempt one blocking send of `frame`.
    fn send(&mut self, frame: &SeqFrame) -> Result<(), TxError>;

    /// Wait up to `timeout` for the endpoint to accept another frame.
    ///
    /// Returns `Ok(false)` when the timeout elapsed first.
    fn wait_writable(&mut self, timeout: Duration) -> Result<bool, TxError>;
}

/// Receive half of a bus endpoint.
pub trait FrameRx {
    /// Block until one frame arrives, returning it together with its ancillary metadata.
    fn recv(&mut self) -> Result<(SeqFrame, RxMeta), RxError>;
}

/// Ancillary data delivered alongside a received frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxMeta {
    /// Kernel count of frames dropped on this socket, when the platform reports it.
    pub overflows: Option<u32>,
    /// Receive timestamp, when the platform reports it.
    pub timestamp: Option<SystemTime>,
}

impl RxMeta {
    /// Overflow count, 0 when unavailable.
    pub fn overflows_or_zero(&self) -> u32 {
        self.overflows.unwrap_or(0)
    }
}

/// Backpressure behaviour of [`transmit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxPolicy {
    /// Wait for readiness and retry on a full queue instead of failing.
    pub poll: bool,
    /// Bound on each readiness wait.
    pub poll_timeout: Duration,
}

/// Result of a successful [`transmit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The endpoint accepted the frame.
    Sent,
    /// Shutdown was requested while waiting out backpressure; the frame was not sent.
    Cancelled,
}

/// Send `frame`, retrying on recoverable conditions.
///
/// - interrupted send: retried immediately.
/// - queue full, poll disabled: fatal.
/// - queue full, poll enabled: wait up to `policy.poll_timeout` for readiness, then retry. A
///   timed out or interrupted wait retries the same way. Retries are unbounded; the only way out
///   besides success is `flag` being cleared, which is checked after each wait.
/// - anything else: fatal.
pub fn transmit<T>(
    tx: &mut T,
    frame: &SeqFrame,
    policy: TxPolicy,
    flag: &RunFlag,
) -> Result<Delivery, EngineError>
where
    T: FrameTx + ?Sized,
{
    loop {
        match tx.send(frame) {
            Ok(()) => return Ok(Delivery::Sent),
            Err(TxError::Interrupted) => continue,
            Err(TxError::QueueFull(err)) => {
                if !policy.poll {
                    return Err(EngineError::QueueFull(err));
                }
                match tx.wait_writable(policy.poll_timeout) {
                    Ok(true) => {}
                    Ok(false) => {
                        log::debug!("transmit queue still full after {:?}", policy.poll_timeout);
                    }
                    Err(TxError::Interrupted) => {}
                    Err(TxError::QueueFull(err)) | Err(TxError::Link(err)) => {
                        return Err(EngineError::Poll(err));
                    }
                }
                if !flag.is_running() {
                    return Ok(Delivery::Cancelled);
                }
            }
            Err(TxError::Link(err)) => return Err(EngineError::Transmit(err)),
        }
    }
}

/// Result of a [`receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A frame and its metadata.
    Frame(SeqFrame, RxMeta),
    /// A signal interrupted the wait; nothing was consumed.
    Interrupted,
}

/// Receive exactly one frame. Every failure other than a signal interruption is fatal.
pub fn receive<R>(rx: &mut R) -> Result<Received, EngineError>
where
    R: FrameRx + ?Sized,
{
    match rx.recv() {
        Ok((frame, meta)) => Ok(Received::Frame(frame, meta)),
        Err(RxError::Interrupted) => Ok(Received::Interrupted),
        Err(RxError::Link(err)) => Err(EngineError::Receive(err)),
    }
}
