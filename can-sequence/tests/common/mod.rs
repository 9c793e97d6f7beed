#![allow(dead_code)]

use can_sequence::{CanId, FrameRx, FrameTx, RunFlag, RxError, RxMeta, SeqFrame, TxError};
use core::time::Duration;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Scripted result of one `FrameTx::send` call.
#[derive(Debug)]
pub enum SendStep {
    Ok,
    QueueFull,
    Interrupted,
    Fail,
}

/// Scripted result of one `FrameTx::wait_writable` call.
#[derive(Debug)]
pub enum WaitStep {
    Ready,
    Timeout,
    Interrupted,
    Fail,
}

pub fn queue_full() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "No buffer space available")
}

/// Transmit mock: records accepted frames, replays scripted failures, then accepts everything.
#[derive(Debug, Default)]
pub struct MockTx {
    pub sent: Vec<SeqFrame>,
    pub send_script: VecDeque<SendStep>,
    pub wait_script: VecDeque<WaitStep>,
    pub send_calls: usize,
    pub wait_calls: usize,
    /// Keep answering queue-full after the script runs out.
    pub always_full: bool,
}

impl MockTx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence_bytes(&self) -> Vec<u8> {
        self.sent.iter().map(|f| f.sequence_byte()).collect()
    }
}

impl FrameTx for MockTx {
    fn send(&mut self, frame: &SeqFrame) -> Result<(), TxError> {
        self.send_calls += 1;
        let step = match self.send_script.pop_front() {
            Some(step) => step,
            None if self.always_full => SendStep::QueueFull,
            None => SendStep::Ok,
        };
        match step {
            SendStep::Ok => {
                self.sent.push(*frame);
                Ok(())
            }
            SendStep::QueueFull => Err(TxError::QueueFull(queue_full())),
            SendStep::Interrupted => Err(TxError::Interrupted),
            SendStep::Fail => Err(TxError::Link(io::Error::new(
                io::ErrorKind::Other,
                "Network is down",
            ))),
        }
    }

    fn wait_writable(&mut self, _timeout: Duration) -> Result<bool, TxError> {
        self.wait_calls += 1;
        match self.wait_script.pop_front().unwrap_or(WaitStep::Timeout) {
            WaitStep::Ready => Ok(true),
            WaitStep::Timeout => Ok(false),
            WaitStep::Interrupted => Err(TxError::Interrupted),
            WaitStep::Fail => Err(TxError::Link(io::Error::new(
                io::ErrorKind::Other,
                "Bad file descriptor",
            ))),
        }
    }
}

/// Scripted result of one `FrameRx::recv` call.
#[derive(Debug)]
pub enum RecvStep {
    Frame(u8, RxMeta),
    Interrupted,
    /// Clear the run flag with this signal, then report an interrupted receive.
    Signal(i32),
    Fail,
}

pub fn seq(byte: u8) -> RecvStep {
    RecvStep::Frame(byte, RxMeta::default())
}

pub fn seq_with_overflows(byte: u8, overflows: u32) -> RecvStep {
    RecvStep::Frame(
        byte,
        RxMeta {
            overflows: Some(overflows),
            timestamp: None,
        },
    )
}

/// Receive mock replaying a script; running out of script is a link failure.
pub struct MockRx<'a> {
    pub id: CanId,
    pub script: VecDeque<RecvStep>,
    pub recv_calls: usize,
    pub flag: Option<&'a RunFlag>,
}

impl<'a> MockRx<'a> {
    pub fn new(script: impl IntoIterator<Item = RecvStep>) -> Self {
        Self {
            id: CanId::standard(2),
            script: script.into_iter().collect(),
            recv_calls: 0,
            flag: None,
        }
    }

    pub fn from_bytes(bytes: impl IntoIterator<Item = u8>) -> Self {
        Self::new(bytes.into_iter().map(seq))
    }

    pub fn with_flag(mut self, flag: &'a RunFlag) -> Self {
        self.flag = Some(flag);
        self
    }
}

impl FrameRx for MockRx<'_> {
    fn recv(&mut self) -> Result<(SeqFrame, RxMeta), RxError> {
        self.recv_calls += 1;
        match self.script.pop_front() {
            Some(RecvStep::Frame(byte, meta)) => Ok((SeqFrame::sequence(self.id, 1, byte), meta)),
            Some(RecvStep::Interrupted) => Err(RxError::Interrupted),
            Some(RecvStep::Signal(signo)) => {
                if let Some(flag) = self.flag {
                    flag.request_stop(signo);
                }
                Err(RxError::Interrupted)
            }
            Some(RecvStep::Fail) | None => Err(RxError::Link(io::Error::new(
                io::ErrorKind::Other,
                "script exhausted",
            ))),
        }
    }
}

/// Clonable in-memory writer, for log sinks that must be inspected after being handed over.
#[derive(Clone, Default)]
pub struct SharedBuf(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn text(buf: &[u8]) -> String {
    String::from_utf8(buf.to_vec()).unwrap()
}

pub fn count_lines(haystack: &str, needle: &str) -> usize {
    haystack.lines().filter(|l| l.contains(needle)).count()
}
