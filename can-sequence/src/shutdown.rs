//! Cooperative shutdown: the process run flag, termination-signal installation and the final
//! report.
//!
//! The signal handler only records the signal and clears the flag. Everything else (the stop
//! notice, statistics, closing the log sink) happens on the main flow in
//! [`Shutdown::finalize`], once the loop has observed the flag.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::engine::{RunOutcome, StopReason, Summary};
use crate::report::Console;

/// Shared "keep running" flag, safe to clear from a signal handler.
#[derive(Debug)]
pub struct RunFlag {
    running: AtomicBool,
    signal: AtomicI32,
}

impl RunFlag {
    /// A flag in the running state.
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            signal: AtomicI32::new(0),
        }
    }

    /// True until a stop is requested.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request a stop on behalf of signal `signo`.
    ///
    /// Only atomics are touched, so this may be called from a signal handler. Returns true for
    /// the request that performed the transition; the first signal number is the one kept.
    pub fn request_stop(&self, signo: i32) -> bool {
        let first = self
            .signal
            .compare_exchange(0, signo, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.running.store(false, Ordering::SeqCst);
        first
    }

    /// Signal that caused the stop, if any.
    pub fn stop_signal(&self) -> Option<i32> {
        match self.signal.load(Ordering::SeqCst) {
            0 => None,
            signo => Some(signo),
        }
    }

    /// Current coordinator state.
    pub fn state(&self) -> ShutdownState {
        if self.is_running() {
            ShutdownState::Running
        } else {
            ShutdownState::Stopping
        }
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordinator state. `Stopping` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Loops keep iterating.
    Running,
    /// A termination signal was received.
    Stopping,
}

/// Process exit status after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Normal end or signal-triggered shutdown.
    Success,
    /// Drop threshold reached.
    Failure,
}

impl Termination {
    /// Process exit code.
    pub fn exit_code(self) -> u8 {
        match self {
            Termination::Success => 0,
            Termination::Failure => 1,
        }
    }
}

static PROCESS_FLAG: RunFlag = RunFlag::new();

/// Signals that trigger a graceful stop.
#[cfg(unix)]
pub const TERMINATION_SIGNALS: [i32; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

#[cfg(unix)]
extern "C" fn on_termination_signal(signo: libc::c_int) {
    PROCESS_FLAG.request_stop(signo);
}

/// Install handlers for [`TERMINATION_SIGNALS`] and return the process-wide flag they clear.
///
/// Handlers are installed without `SA_RESTART`, so a receive blocked in the kernel returns
/// `EINTR` and the loop gets to observe the flag.
#[cfg(unix)]
pub fn install_signal_handlers() -> io::Result<&'static RunFlag> {
    for signo in TERMINATION_SIGNALS {
        // SAFETY: the handler only touches atomics; `action` is fully initialised before use.
        let rc = unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_termination_signal as extern "C" fn(libc::c_int) as usize;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(signo, &action, std::ptr::null_mut())
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(&PROCESS_FLAG)
}

/// Non-Unix targets get the flag without any handler.
#[cfg(not(unix))]
pub fn install_signal_handlers() -> io::Result<&'static RunFlag> {
    Ok(&PROCESS_FLAG)
}

/// Final-report half of the coordinator.
#[derive(Debug)]
pub struct Shutdown<'a> {
    flag: &'a RunFlag,
    reported: bool,
}

impl<'a> Shutdown<'a> {
    /// Coordinator over `flag`.
    pub fn new(flag: &'a RunFlag) -> Self {
        Self {
            flag,
            reported: false,
        }
    }

    /// Current coordinator state.
    pub fn state(&self) -> ShutdownState {
        self.flag.state()
    }

    /// Print the stop notice and run statistics, close the log sink and pick the exit status.
    ///
    /// Only the first call prints anything; repeated calls return the same status silently.
    pub fn finalize<O: Write, E: Write>(
        &mut self,
        console: &mut Console<O, E>,
        outcome: &RunOutcome,
    ) -> io::Result<Termination> {
        let termination = match outcome.reason {
            StopReason::DropThreshold(_) => Termination::Failure,
            StopReason::Completed | StopReason::Signalled(_) => Termination::Success,
        };
        if self.reported {
            return Ok(termination);
        }
        self.reported = true;

        if let StopReason::Signalled(signo) = outcome.reason {
            console.line(format_args!("received signal {signo}, will gracefully stop!"))?;
        }
        match &outcome.summary {
            Summary::Transmit(stats) => {
                console.line(format_args!(
                    "sent {} frames in {:.6}s ({} us per frame)",
                    stats.frames,
                    stats.elapsed.as_secs_f64(),
                    stats.micros_per_frame(),
                ))?;
            }
            Summary::Receive(stats) => {
                let line = format!(
                    "statistic: totally received frames: {}, sequence mismatches: {}",
                    stats.frames, stats.mismatches
                );
                console.line(format_args!("{line}"))?;
                console.sink_line(format_args!("{line}"))?;
            }
        }
        console.close()?;
        Ok(termination)
    }
}
