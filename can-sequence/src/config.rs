//! Run configuration container.

use core::time::Duration;
use std::path::PathBuf;
use thiserror::Error;

use crate::frame::{CanId, MAX_DLC};

/// Identifier used when none is given.
pub const DEFAULT_ID: u32 = 2;

/// How many frames a run handles before stopping on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    /// Stop after this many frames.
    Finite(u64),
    /// Run until cancelled.
    Unbounded,
}

impl LoopCount {
    /// `None` means unbounded.
    pub fn from_option(count: Option<u64>) -> Self {
        count.map_or(LoopCount::Unbounded, LoopCount::Finite)
    }

    pub(crate) fn budget(self) -> LoopBudget {
        match self {
            LoopCount::Finite(n) => LoopBudget(Some(n)),
            LoopCount::Unbounded => LoopBudget(None),
        }
    }
}

/// Countdown over a [`LoopCount`].
#[derive(Debug)]
pub(crate) struct LoopBudget(Option<u64>);

impl LoopBudget {
    /// Claim one iteration. Returns false once a finite budget is exhausted.
    pub(crate) fn take(&mut self) -> bool {
        match &mut self.0 {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }
}

/// Rejected configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Payload length above the classic CAN maximum.
    #[error("payload length {0} exceeds 8 bytes")]
    PayloadTooLong(usize),
    /// A drop threshold of zero can never be reached.
    #[error("drop threshold must be at least 1")]
    ZeroDropThreshold,
}

/// Configuration for one transmit or receive run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Identifier to send on, and the only identifier admitted when receiving.
    pub id: CanId,
    /// Payload length of transmitted frames (0..=8).
    pub len: usize,
    /// Number of frames to send or receive.
    pub loop_count: LoopCount,
    /// Wait for transmit readiness instead of failing when the outbound queue is full.
    pub poll: bool,
    /// Bound on each wait for transmit readiness in poll mode.
    pub poll_timeout: Duration,
    /// Abort the receive run once this many sequence mismatches were seen.
    pub drop_until_quit: Option<u32>,
    /// Verbosity level (0 = quiet).
    pub verbose: u8,
    /// Optional log file mirroring the receive-side reports.
    pub log_file: Option<PathBuf>,
    /// First sequence byte sent by the transmitter.
    pub start_sequence: u8,
    /// Emit a progress line every this many transmitted frames (0 = never).
    pub progress_interval: u64,
}

impl Default for RunConfig {
    /// Standard identifier 2, one payload byte, unbounded, no polling, quiet.
    fn default() -> Self {
        Self {
            id: CanId::standard(DEFAULT_ID),
            len: 1,
            loop_count: LoopCount::Unbounded,
            poll: false,
            poll_timeout: Duration::from_millis(1000),
            drop_until_quit: None,
            verbose: 0,
            log_file: None,
            start_sequence: 0,
            progress_interval: 10_000,
        }
    }
}

impl RunConfig {
    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.len > MAX_DLC {
            return Err(ConfigError::PayloadTooLong(self.len));
        }
        if self.drop_until_quit == Some(0) {
            return Err(ConfigError::ZeroDropThreshold);
        }
        Ok(())
    }
}
