//! Console and log-sink output shared by the run loops and the shutdown path.

use core::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Stderr, Stdout, Write};
use std::path::{Path, PathBuf};

/// Append-only text log mirroring the receive-side reports.
pub struct LogSink {
    path: Option<PathBuf>,
    inner: Box<dyn Write + Send>,
}

impl LogSink {
    /// Open `path` for appending, creating it if missing.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            inner: Box::new(BufWriter::new(file)),
        })
    }

    /// Wrap an arbitrary writer.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            path: None,
            inner: Box::new(writer),
        }
    }

    /// Path this sink was opened from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        writeln!(self.inner, "{args}")
    }

    fn close(mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").field("path", &self.path).finish()
    }
}

/// Where the run loops write: a stdout writer, a stderr writer and an optional [`LogSink`].
#[derive(Debug)]
pub struct Console<O, E> {
    out: O,
    err: E,
    sink: Option<LogSink>,
}

impl Console<Stdout, Stderr> {
    /// Console bound to the process's standard streams.
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> Console<O, E> {
    /// Console over arbitrary writers, without a log sink.
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            sink: None,
        }
    }

    /// Attach a log sink, replacing any previous one.
    pub fn attach_sink(&mut self, sink: LogSink) {
        self.sink = Some(sink);
    }

    /// Whether a log sink is open.
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Borrow the stdout writer.
    pub fn out(&self) -> &O {
        &self.out
    }

    /// Borrow the stderr writer.
    pub fn err(&self) -> &E {
        &self.err
    }

    /// One line to stdout.
    pub fn line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        writeln!(self.out, "{args}")
    }

    /// One line to stderr.
    pub fn error_line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        writeln!(self.err, "{args}")
    }

    /// One line to the log sink; no-op without one.
    pub fn sink_line(&mut self, args: fmt::Arguments<'_>) -> io::Result<()> {
        match &mut self.sink {
            Some(sink) => sink.line(args),
            None => Ok(()),
        }
    }

    /// Flush the console streams and close the log sink. Later sink writes are dropped.
    pub fn close(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.err.flush()?;
        match self.sink.take() {
            Some(sink) => sink.close(),
            None => Ok(()),
        }
    }
}
