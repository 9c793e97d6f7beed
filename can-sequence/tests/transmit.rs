mod common;

use can_sequence::{
    run_transmit, CanId, Console, EngineError, FrameTx, LoopCount, RunConfig, RunFlag, SeqFrame,
    Shutdown, StopReason, Summary, Termination, TxError,
};
use core::time::Duration;
use common::{count_lines, text, MockTx, SendStep, WaitStep};
use embedded_can::Frame as _;

fn cfg(frames: u64) -> RunConfig {
    RunConfig {
        loop_count: LoopCount::Finite(frames),
        ..RunConfig::default()
    }
}

#[test]
fn sends_five_frames_with_rising_sequence() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    let mut console = Console::new(Vec::new(), Vec::new());
    let config = RunConfig {
        id: CanId::standard(2),
        len: 1,
        ..cfg(5)
    };

    let outcome = run_transmit(&mut tx, &config, &flag, &mut console).unwrap();

    assert_eq!(tx.sequence_bytes(), vec![0, 1, 2, 3, 4]);
    for frame in &tx.sent {
        assert_eq!(frame.can_id(), CanId::standard(2));
        assert_eq!(frame.dlc(), 1);
    }
    assert_eq!(outcome.reason, StopReason::Completed);
    let Summary::Transmit(stats) = outcome.summary else {
        panic!("expected transmit summary");
    };
    assert_eq!(stats.frames, 5);

    let mut shutdown = Shutdown::new(&flag);
    let termination = shutdown.finalize(&mut console, &outcome).unwrap();
    assert_eq!(termination, Termination::Success);
    let out = text(console.out());
    let summary = out
        .lines()
        .find(|l| l.starts_with("sent 5 frames in "))
        .expect("summary line");
    assert!(summary.ends_with(" us per frame)"));
}

#[test]
fn wraps_once_when_starting_at_250() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    let mut console = Console::new(Vec::new(), Vec::new());
    let config = RunConfig {
        start_sequence: 250,
        verbose: 1,
        ..cfg(10)
    };

    run_transmit(&mut tx, &config, &flag, &mut console).unwrap();

    assert_eq!(
        tx.sequence_bytes(),
        vec![250, 251, 252, 253, 254, 255, 0, 1, 2, 3]
    );
    let out = text(console.out());
    assert_eq!(count_lines(&out, "sequence wrap around"), 1);
    assert!(out.contains("sequence wrap around (0)"));
}

#[test]
fn wrap_notice_requires_verbose() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    let mut console = Console::new(Vec::new(), Vec::new());
    let config = RunConfig {
        start_sequence: 250,
        ..cfg(10)
    };

    run_transmit(&mut tx, &config, &flag, &mut console).unwrap();
    assert_eq!(count_lines(&text(console.out()), "wrap around"), 0);
}

#[test]
fn very_verbose_logs_each_frame() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    let mut console = Console::new(Vec::new(), Vec::new());
    let config = RunConfig {
        verbose: 2,
        ..cfg(3)
    };

    run_transmit(&mut tx, &config, &flag, &mut console).unwrap();
    let out = text(console.out());
    assert!(out.contains("sending frame. sequence number: 0"));
    assert!(out.contains("sending frame. sequence number: 2"));
}

#[test]
fn progress_line_every_interval() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    let mut console = Console::new(Vec::new(), Vec::new());
    let config = RunConfig {
        progress_interval: 10_000,
        ..cfg(25_000)
    };

    run_transmit(&mut tx, &config, &flag, &mut console).unwrap();
    let out = text(console.out());
    assert_eq!(count_lines(&out, "frames sent"), 2);
    assert!(out.contains("10000 frames sent"));
    assert!(out.contains("20000 frames sent"));
}

#[test]
fn payload_length_is_respected() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    let mut console = Console::new(Vec::new(), Vec::new());
    let config = RunConfig {
        len: 8,
        id: CanId::extended(0x1ABC_DEF0),
        start_sequence: 7,
        ..cfg(1)
    };

    run_transmit(&mut tx, &config, &flag, &mut console).unwrap();
    let frame = tx.sent[0];
    assert!(frame.is_extended());
    assert_eq!(frame.data(), &[7, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn poll_mode_retries_through_persistent_queue_full() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    for _ in 0..1000 {
        tx.send_script.push_back(SendStep::QueueFull);
    }
    let mut console = Console::new(Vec::new(), Vec::new());
    let config = RunConfig {
        poll: true,
        ..cfg(2)
    };

    let outcome = run_transmit(&mut tx, &config, &flag, &mut console).unwrap();

    assert_eq!(outcome.reason, StopReason::Completed);
    assert_eq!(tx.sequence_bytes(), vec![0, 1]);
    assert_eq!(tx.wait_calls, 1000);
    assert_eq!(tx.send_calls, 1002);
}

#[test]
fn poll_mode_treats_interrupted_wait_like_timeout() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    tx.send_script
        .extend([SendStep::QueueFull, SendStep::QueueFull, SendStep::QueueFull]);
    tx.wait_script
        .extend([WaitStep::Interrupted, WaitStep::Timeout, WaitStep::Ready]);
    let mut console = Console::new(Vec::new(), Vec::new());
    let config = RunConfig {
        poll: true,
        ..cfg(1)
    };

    run_transmit(&mut tx, &config, &flag, &mut console).unwrap();
    assert_eq!(tx.sequence_bytes(), vec![0]);
    assert_eq!(tx.wait_calls, 3);
}

#[test]
fn queue_full_without_poll_is_fatal() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    tx.send_script.push_back(SendStep::Ok);
    tx.send_script.push_back(SendStep::QueueFull);
    let mut console = Console::new(Vec::new(), Vec::new());

    let err = run_transmit(&mut tx, &cfg(5), &flag, &mut console).unwrap_err();

    assert!(matches!(err, EngineError::QueueFull(_)));
    assert!(err.to_string().starts_with("write: "));
    assert_eq!(tx.sent.len(), 1);
    assert_eq!(tx.wait_calls, 0);
}

#[test]
fn interrupted_send_is_retried_without_counting() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    tx.send_script
        .extend([SendStep::Interrupted, SendStep::Interrupted, SendStep::Ok]);
    let mut console = Console::new(Vec::new(), Vec::new());

    let outcome = run_transmit(&mut tx, &cfg(2), &flag, &mut console).unwrap();
    assert_eq!(tx.sequence_bytes(), vec![0, 1]);
    assert_eq!(tx.send_calls, 4);
    let Summary::Transmit(stats) = outcome.summary else {
        panic!("expected transmit summary");
    };
    assert_eq!(stats.frames, 2);
}

#[test]
fn other_send_errors_are_fatal() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    tx.send_script.push_back(SendStep::Fail);
    let mut console = Console::new(Vec::new(), Vec::new());

    let err = run_transmit(&mut tx, &cfg(3), &flag, &mut console).unwrap_err();
    assert!(matches!(err, EngineError::Transmit(_)));
}

#[test]
fn failed_readiness_wait_is_fatal() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    tx.send_script.push_back(SendStep::QueueFull);
    tx.wait_script.push_back(WaitStep::Fail);
    let mut console = Console::new(Vec::new(), Vec::new());
    let config = RunConfig {
        poll: true,
        ..cfg(3)
    };

    let err = run_transmit(&mut tx, &config, &flag, &mut console).unwrap_err();
    assert!(matches!(err, EngineError::Poll(_)));
}

#[test]
fn cleared_flag_stops_before_first_frame() {
    let flag = RunFlag::new();
    flag.request_stop(15);
    let mut tx = MockTx::new();
    let mut console = Console::new(Vec::new(), Vec::new());

    let outcome = run_transmit(&mut tx, &RunConfig::default(), &flag, &mut console).unwrap();
    assert!(tx.sent.is_empty());
    assert_eq!(outcome.reason, StopReason::Signalled(15));

    let mut shutdown = Shutdown::new(&flag);
    shutdown.finalize(&mut console, &outcome).unwrap();
    let out = text(console.out());
    assert!(out.contains("sent 0 frames in "));
    assert!(out.contains("(0 us per frame)"));
}

#[test]
fn stop_during_backpressure_abandons_the_frame() {
    let flag = RunFlag::new();
    let mut tx = MockTx::new();
    tx.always_full = true;
    tx.send_script.push_back(SendStep::Ok);
    let mut console = Console::new(Vec::new(), Vec::new());
    let config = RunConfig {
        poll: true,
        ..RunConfig::default()
    };

    // The wait returns interrupted after the stop request, as a real signal would.
    tx.wait_script.push_back(WaitStep::Timeout);
    tx.wait_script.push_back(WaitStep::Interrupted);
    let flag_ref = &flag;
    let mut stopping_tx = StopAfterWaits {
        inner: tx,
        flag: flag_ref,
        stop_after: 2,
    };

    let outcome = run_transmit(&mut stopping_tx, &config, flag_ref, &mut console).unwrap();
    assert_eq!(outcome.reason, StopReason::Signalled(2));
    assert_eq!(stopping_tx.inner.sequence_bytes(), vec![0]);
}

struct StopAfterWaits<'a> {
    inner: MockTx,
    flag: &'a RunFlag,
    stop_after: usize,
}

impl FrameTx for StopAfterWaits<'_> {
    fn send(&mut self, frame: &SeqFrame) -> Result<(), TxError> {
        self.inner.send(frame)
    }

    fn wait_writable(&mut self, timeout: Duration) -> Result<bool, TxError> {
        if self.inner.wait_calls + 1 == self.stop_after {
            self.flag.request_stop(2);
        }
        self.inner.wait_writable(timeout)
    }
}
