//! Sequence engine: the rolling-byte state machine and the transmit/receive loops.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::config::RunConfig;
use crate::errors::EngineError;
use crate::frame::SeqFrame;
use crate::report::Console;
use crate::shutdown::RunFlag;
use crate::transport::{self, Delivery, FrameRx, FrameTx, Received, TxPolicy};

/// Result of checking one received sequence byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// First frame of the run; it sets the expectation.
    First,
    /// Byte equals the expected value.
    InSequence,
    /// Byte differs from the expected value. `drop` is the 1-based drop number.
    Mismatch {
        /// Value that was expected.
        expected: u8,
        /// Value that arrived.
        got: u8,
        /// Running drop count including this one.
        drop: u32,
    },
}

/// Everything the receive loop needs to know after [`SequenceState::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Comparison result.
    pub check: Check,
    /// The expected value cycled back to 0; carries the wrap index (0-based).
    pub wrapped: Option<u32>,
    /// The configured drop threshold was reached by this frame.
    pub threshold_reached: bool,
}

/// Rolling sequence byte plus frame, drop, mismatch and wrap counters.
#[derive(Debug, Clone)]
pub struct SequenceState {
    expected: u8,
    synchronized: bool,
    last: Option<u8>,
    frames: u64,
    drops: u32,
    mismatches: u32,
    wraps: u32,
    drop_threshold: Option<u32>,
}

impl SequenceState {
    /// Transmit-side state starting at `start`.
    pub fn starting_at(start: u8) -> Self {
        Self {
            expected: start,
            synchronized: true,
            last: None,
            frames: 0,
            drops: 0,
            mismatches: 0,
            wraps: 0,
            drop_threshold: None,
        }
    }

    /// Receive-side state; the first observed byte sets the expectation.
    pub fn unsynchronized(drop_threshold: Option<u32>) -> Self {
        Self {
            synchronized: false,
            drop_threshold,
            ..Self::starting_at(0)
        }
    }

    /// Next byte to send, or the byte the next received frame should carry.
    pub fn expected(&self) -> u8 {
        self.expected
    }

    /// Last byte sent or received.
    pub fn last(&self) -> Option<u8> {
        self.last
    }

    /// Frames sent or received so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Sequence breaks seen so far.
    pub fn drops(&self) -> u32 {
        self.drops
    }

    /// Sequence mismatches seen so far.
    pub fn mismatches(&self) -> u32 {
        self.mismatches
    }

    /// Times the sequence cycled back to 0.
    pub fn wraps(&self) -> u32 {
        self.wraps
    }

    /// Record a sent frame carrying [`Self::expected`] and step to the next byte.
    ///
    /// Returns the wrap index when the byte cycled back to 0.
    pub fn advance(&mut self) -> Option<u32> {
        self.frames += 1;
        self.last = Some(self.expected);
        self.step()
    }

    /// Check a received byte, resynchronising to it on mismatch so that one gap produces one
    /// report.
    pub fn observe(&mut self, got: u8) -> Observation {
        let mut check = Check::InSequence;
        if !self.synchronized {
            self.synchronized = true;
            self.expected = got;
            check = Check::First;
        }
        self.frames += 1;

        let mut threshold_reached = false;
        if got != self.expected {
            self.drops += 1;
            self.mismatches += 1;
            check = Check::Mismatch {
                expected: self.expected,
                got,
                drop: self.drops,
            };
            threshold_reached = self.drop_threshold == Some(self.drops);
            self.expected = got;
        }

        self.last = Some(got);
        let wrapped = self.step();
        Observation {
            check,
            wrapped,
            threshold_reached,
        }
    }

    fn step(&mut self) -> Option<u32> {
        self.expected = self.expected.wrapping_add(1);
        if self.expected != 0 {
            return None;
        }
        let index = self.wraps;
        self.wraps += 1;
        Some(index)
    }
}

/// Why a run loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured frame count was handled.
    Completed,
    /// A termination signal cleared the run flag.
    Signalled(i32),
    /// The receive drop threshold was reached at this drop count.
    DropThreshold(u32),
}

/// Transmit-side statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStats {
    /// Frames accepted by the endpoint.
    pub frames: u64,
    /// Wall time spent in the loop.
    pub elapsed: Duration,
}

impl TxStats {
    /// Average microseconds per frame, 0 when nothing was sent.
    pub fn micros_per_frame(&self) -> u128 {
        if self.frames == 0 {
            0
        } else {
            self.elapsed.as_micros() / u128::from(self.frames)
        }
    }
}

/// Receive-side statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxStats {
    /// Frames received.
    pub frames: u64,
    /// Sequence mismatches.
    pub mismatches: u32,
}

/// Statistics of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Summary {
    /// From [`run_transmit`].
    Transmit(TxStats),
    /// From [`run_receive`].
    Receive(RxStats),
}

/// How a run ended and what it counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Counters to report.
    pub summary: Summary,
    /// Stop condition.
    pub reason: StopReason,
}

fn signalled(flag: &RunFlag) -> StopReason {
    StopReason::Signalled(flag.stop_signal().unwrap_or(0))
}

/// Send `cfg.loop_count` frames (or until `flag` is cleared), each carrying the current sequence
/// byte in payload position 0.
pub fn run_transmit<T, O, E>(
    tx: &mut T,
    cfg: &RunConfig,
    flag: &RunFlag,
    console: &mut Console<O, E>,
) -> Result<RunOutcome, EngineError>
where
    T: FrameTx + ?Sized,
    O: Write,
    E: Write,
{
    let policy = TxPolicy {
        poll: cfg.poll,
        poll_timeout: cfg.poll_timeout,
    };
    let mut state = SequenceState::starting_at(cfg.start_sequence);
    let mut budget = cfg.loop_count.budget();
    let mut frame = SeqFrame::sequence(cfg.id, cfg.len, state.expected());
    let started = Instant::now();
    let mut cancelled = false;

    while flag.is_running() && budget.take() {
        let seq = state.expected();
        if cfg.verbose > 1 {
            console.line(format_args!("sending frame. sequence number: {seq}"))?;
        }
        frame.set_sequence_byte(seq);

        if transport::transmit(tx, &frame, policy, flag)? == Delivery::Cancelled {
            cancelled = true;
            break;
        }

        let wrapped = state.advance();
        let sent = state.frames();
        if cfg.progress_interval != 0 && sent % cfg.progress_interval == 0 {
            console.line(format_args!("{sent} frames sent"))?;
        }
        if let Some(index) = wrapped {
            if cfg.verbose > 0 {
                console.line(format_args!("sequence wrap around ({index})"))?;
            }
        }
    }

    let stats = TxStats {
        frames: state.frames(),
        elapsed: started.elapsed(),
    };
    let reason = if cancelled || !flag.is_running() {
        signalled(flag)
    } else {
        StopReason::Completed
    };
    Ok(RunOutcome {
        summary: Summary::Transmit(stats),
        reason,
    })
}

/// Receive `cfg.loop_count` frames (or until `flag` is cleared) and verify that their sequence
/// bytes form an unbroken run.
///
/// Each break is reported on stderr and the log sink. When `cfg.drop_until_quit` is reached the
/// loop returns immediately with [`StopReason::DropThreshold`].
pub fn run_receive<R, O, E>(
    rx: &mut R,
    cfg: &RunConfig,
    flag: &RunFlag,
    console: &mut Console<O, E>,
) -> Result<RunOutcome, EngineError>
where
    R: FrameRx + ?Sized,
    O: Write,
    E: Write,
{
    let mut state = SequenceState::unsynchronized(cfg.drop_until_quit);
    let mut budget = cfg.loop_count.budget();

    let outcome = |state: &SequenceState, reason| RunOutcome {
        summary: Summary::Receive(RxStats {
            frames: state.frames(),
            mismatches: state.mismatches(),
        }),
        reason,
    };

    while flag.is_running() && budget.take() {
        let received = loop {
            match transport::receive(rx)? {
                Received::Frame(frame, meta) => break Some((frame, meta)),
                Received::Interrupted if flag.is_running() => continue,
                Received::Interrupted => break None,
            }
        };
        let Some((frame, meta)) = received else {
            break;
        };

        let got = frame.sequence_byte();
        if let Some(ts) = meta.timestamp {
            log::trace!("frame {got} received at {ts:?}");
        }
        console.sink_line(format_args!("received frame. sequence number: {got}"))?;
        if cfg.verbose > 1 {
            console.line(format_args!("received frame. sequence number: {got}"))?;
        }

        let observation = state.observe(got);
        if let Check::Mismatch {
            expected,
            got,
            drop,
        } = observation.check
        {
            let overflows = meta.overflows_or_zero();
            let report = format!(
                "[{drop}] received wrong sequence count. expected: {expected}, got: {got}, socket overflows: {overflows}"
            );
            console.error_line(format_args!("{report}"))?;
            console.sink_line(format_args!("{report}"))?;
            if observation.threshold_reached {
                return Ok(outcome(&state, StopReason::DropThreshold(drop)));
            }
        }

        if let Some(index) = observation.wrapped {
            console.sink_line(format_args!("sequence wrap around ({index})"))?;
            if cfg.verbose > 0 {
                console.line(format_args!("sequence wrap around ({index})"))?;
            }
        }
    }

    let reason = if flag.is_running() {
        StopReason::Completed
    } else {
        signalled(flag)
    };
    Ok(outcome(&state, reason))
}
