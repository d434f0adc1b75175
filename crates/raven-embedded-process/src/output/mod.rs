//! Background line readers feeding a bounded queue, and the deadline-aware
//! consumer that watches them.

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::ops::ControlFlow;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::{PROCESS_TARGET, SERVER_OUTPUT_TARGET};


/// Number of lines buffered between the reader thread and its consumer.
pub(crate) const QUEUE_CAPACITY: usize = 50;

/// Longest single wait on the queue before the deadline is re-checked.
pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// An item delivered by an [`OutputReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// One line of output without its terminator.
    Line(String),
    /// The stream closed or failed; always the final item.
    EndOfStream,
}

/// A point in time after which watching gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            expires_at: now.checked_add(budget).unwrap_or(now + Duration::from_secs(86_400)),
        }
    }

    /// Time left, or `None` once the deadline has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .checked_duration_since(Instant::now())
            .filter(|left| !left.is_zero())
    }

    /// Returns whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }
}

/// How a watch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchStop<T> {
    /// The callback asked to stop with a value.
    Stopped(T),
    /// The stream ended and the callback did not stop.
    EndOfStream,
    /// The deadline passed first.
    DeadlineExceeded,
}

/// Result of [`OutputReader::watch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOutcome<T> {
    /// Every line consumed, each followed by `\n`.
    pub transcript: String,
    /// How the watch ended.
    pub stop: WatchStop<T>,
}

/// Reads a stream line by line on a dedicated thread.
///
/// Lines travel through a channel holding at most [`QUEUE_CAPACITY`] items;
/// the reader blocks while the channel is full. Read errors end the stream
/// early and surface to the consumer as [`OutputLine::EndOfStream`].
#[derive(Debug)]
pub struct OutputReader {
    stream: &'static str,
    receiver: Receiver<OutputLine>,
    poll_interval: Duration,
}

impl OutputReader {
    /// Starts a reader thread for `source`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised when the thread cannot be spawned.
    pub fn spawn<R>(stream: &'static str, source: R) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(QUEUE_CAPACITY);
        thread::Builder::new()
            .name(format!("raven-{stream}-reader"))
            .spawn(move || read_lines(stream, source, &sender))?;
        Ok(Self {
            stream,
            receiver,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Overrides the longest single wait on the queue.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Returns the name of the stream being read.
    #[must_use]
    pub const fn stream(&self) -> &'static str {
        self.stream
    }

    /// Consumes lines until `on_line` breaks, the stream ends, or `deadline`
    /// passes.
    ///
    /// Each line is appended to the transcript before `on_line` sees it
    /// together with the transcript so far. End of stream is passed as
    /// `None`. The deadline is checked before every item is handled, so an
    /// item dequeued after the deadline has passed is discarded.
    pub fn watch<T, F>(&self, deadline: &Deadline, mut on_line: F) -> WatchOutcome<T>
    where
        F: FnMut(Option<&str>, &str) -> ControlFlow<T>,
    {
        let mut transcript = String::new();
        loop {
            let Some(remaining) = deadline.remaining() else {
                return WatchOutcome {
                    transcript,
                    stop: WatchStop::DeadlineExceeded,
                };
            };

            let item = match self.receiver.recv_timeout(remaining.min(self.poll_interval)) {
                Ok(item) => item,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => OutputLine::EndOfStream,
            };

            if deadline.is_expired() {
                return WatchOutcome {
                    transcript,
                    stop: WatchStop::DeadlineExceeded,
                };
            }

            let line = match &item {
                OutputLine::Line(text) => {
                    transcript.push_str(text);
                    transcript.push('\n');
                    Some(text.as_str())
                }
                OutputLine::EndOfStream => None,
            };

            if let ControlFlow::Break(value) = on_line(line, &transcript) {
                return WatchOutcome {
                    transcript,
                    stop: WatchStop::Stopped(value),
                };
            }
            if line.is_none() {
                return WatchOutcome {
                    transcript,
                    stop: WatchStop::EndOfStream,
                };
            }
        }
    }

    /// Collects whatever the stream produces until it ends or `deadline`
    /// passes.
    #[must_use]
    pub fn drain(&self, deadline: &Deadline) -> String {
        self.watch(deadline, |_, _| ControlFlow::<()>::Continue(()))
            .transcript
    }

    /// Keeps consuming the stream in the background, logging each line at
    /// debug level so the child never blocks on a full pipe.
    pub fn forward_to_log(self) {
        let stream = self.stream;
        let receiver = self.receiver;
        let spawned = thread::Builder::new()
            .name(format!("raven-{stream}-log"))
            .spawn(move || {
                for item in receiver {
                    if let OutputLine::Line(line) = item {
                        debug!(target: SERVER_OUTPUT_TARGET, stream, "{line}");
                    }
                }
            });
        if let Err(error) = spawned {
            warn!(
                target: PROCESS_TARGET,
                stream,
                %error,
                "failed to start server output forwarder"
            );
        }
    }
}

fn read_lines<R: Read>(stream: &'static str, source: R, sender: &SyncSender<OutputLine>) {
    let mut reader = BufReader::new(source);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buffer);
                let line = text.trim_end_matches(['\n', '\r']).to_owned();
                if sender.send(OutputLine::Line(line)).is_err() {
                    return;
                }
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => {}
            Err(error) => {
                debug!(
                    target: PROCESS_TARGET,
                    stream,
                    %error,
                    "server output read failed, treating as end of stream"
                );
                break;
            }
        }
    }
    if sender.send(OutputLine::EndOfStream).is_err() {
        debug!(target: PROCESS_TARGET, stream, "output consumer went away before end of stream");
    }
}
