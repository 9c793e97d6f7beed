//! `can-sequence`: a reliability probe for CAN links.
//!
//! Two peers share a bus. The transmitter emits frames whose first payload byte is a rolling
//! one-byte sequence number; the receiver checks that every frame it sees continues that sequence
//! and reports each break as a dropped frame, together with the socket overflow counter the
//! kernel attaches to the received frame.
//!
//! This crate holds the platform-independent parts:
//! - [`frame`]: the classic CAN frame carried on the wire and identifier/filter helpers.
//! - [`config`]: the immutable [`RunConfig`] driving one invocation.
//! - [`transport`]: the [`FrameTx`] / [`FrameRx`] traits an endpoint implements, plus the
//!   transmit retry loop (backpressure handling) and the receive call.
//! - [`engine`]: the sequence state machine and the transmit/receive loops.
//! - [`shutdown`]: the process run flag, signal installation and final reporting.
//! - [`report`]: the console and optional log sink the loops write to.
//!
//! A concrete Linux endpoint lives in `can-sequence-socketcan`.
//!
//! # Cancellation
//! The loops are synchronous and single-threaded. A termination signal only flips the
//! [`RunFlag`]; the loops observe it once per iteration and the caller performs the final report
//! through [`Shutdown::finalize`].

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod errors;
pub mod frame;
pub mod report;
pub mod shutdown;
pub mod transport;

pub use config::{ConfigError, LoopCount, RunConfig};
pub use engine::{
    run_receive, run_transmit, Check, Observation, RunOutcome, RxStats, SequenceState, StopReason,
    Summary, TxStats,
};
pub use errors::{EngineError, RxError, TxError};
pub use frame::{CanId, IdFilter, SeqFrame, EFF_MASK, MAX_DLC, SFF_MASK};
pub use report::{Console, LogSink};
pub use shutdown::{RunFlag, Shutdown, ShutdownState, Termination};
pub use transport::{Delivery, FrameRx, FrameTx, Received, RxMeta, TxPolicy};
