//! Live per-host progress display.
//!
//! The scheduler offers [`ProgressEvent`]s through a [`ProgressSender`];
//! a single [`ProgressReporter`] task consumes them and drives one
//! `indicatif` bar per host. Intermediate events are dropped whenever the
//! reporter falls behind. The final event of each host is always delivered.
//!
//! Log lines share stderr with the bars: route them through a
//! [`SuspendingWriter`] built on the same [`MultiProgress`] so a bar is
//! never drawn over half a log line.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::trace;
use tracing_subscriber::fmt::MakeWriter;

/// Default capacity of the progress channel.
pub const PROGRESS_BUFFER: usize = 64;

/// Progress of one host's sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub host: String,
    pub completed: usize,
    pub total: usize,
    /// Set on the last event for this host (finished or cancelled).
    pub done: bool,
}

/// Scheduler-side handle of the progress channel.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressSender {
    /// Create a bounded progress channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Offer an intermediate event; dropped if the reporter is behind.
    pub fn offer(&self, event: ProgressEvent) {
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                trace!(host = %event.host, completed = event.completed, "progress event dropped");
            }
        }
    }

    /// Deliver a final event, waiting for room in the channel.
    pub async fn deliver(&self, event: ProgressEvent) {
        // A closed channel means nobody is rendering; nothing to deliver to.
        let _ = self.tx.send(event).await;
    }
}

#[derive(Debug, Default)]
struct Counter {
    completed: usize,
    last_offered: usize,
}

/// Per-host completion counter that emits on a fixed stride.
///
/// Counting and offering happen under one lock so offered events are
/// strictly increasing even though attempts complete on many tasks.
#[derive(Debug)]
pub(crate) struct HostProgress {
    host: String,
    total: usize,
    stride: usize,
    counter: Mutex<Counter>,
    sink: Option<ProgressSender>,
}

impl HostProgress {
    pub(crate) fn new(
        host: impl Into<String>,
        total: usize,
        steps: usize,
        sink: Option<ProgressSender>,
    ) -> Self {
        Self {
            host: host.into(),
            total,
            stride: (total / steps.max(1)).max(1),
            counter: Mutex::new(Counter::default()),
            sink,
        }
    }

    /// Record one finished attempt.
    pub(crate) fn record(&self) {
        let mut counter = self.counter.lock().unwrap_or_else(PoisonError::into_inner);
        counter.completed += 1;

        let Some(sink) = &self.sink else { return };
        if counter.completed < self.total && counter.completed - counter.last_offered >= self.stride
        {
            counter.last_offered = counter.completed;
            sink.offer(self.event(counter.completed, false));
        }
    }

    /// Number of attempts recorded so far.
    pub(crate) fn completed(&self) -> usize {
        self.counter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .completed
    }

    /// Send the final event for this host.
    pub(crate) async fn finish(&self) {
        let completed = self.completed();
        if let Some(sink) = &self.sink {
            sink.deliver(self.event(completed, true)).await;
        }
    }

    fn event(&self, completed: usize, done: bool) -> ProgressEvent {
        ProgressEvent {
            host: self.host.clone(),
            completed,
            total: self.total,
            done,
        }
    }
}

/// The drawing surface shared by the progress bars and the log writer:
/// stderr, or nothing when `hidden`.
pub fn console(hidden: bool) -> MultiProgress {
    let target = if hidden {
        ProgressDrawTarget::hidden()
    } else {
        ProgressDrawTarget::stderr()
    };
    MultiProgress::with_draw_target(target)
}

/// A [`MakeWriter`] that clears the progress bars around every write and
/// redraws them afterwards.
#[derive(Debug, Clone)]
pub struct SuspendingWriter<M> {
    multi: MultiProgress,
    inner: M,
}

impl<M> SuspendingWriter<M> {
    /// Wrap `inner`, suspending `multi` while it writes.
    pub fn new(multi: MultiProgress, inner: M) -> Self {
        Self { multi, inner }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for SuspendingWriter<M> {
    type Writer = Suspended<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Suspended {
            multi: self.multi.clone(),
            inner: self.inner.make_writer(),
        }
    }
}

/// Writer handed out by [`SuspendingWriter`].
pub struct Suspended<W> {
    multi: MultiProgress,
    inner: W,
}

impl<W: Write> Write for Suspended<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Self { multi, inner } = self;
        multi.suspend(|| inner.write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let Self { multi, inner } = self;
        multi.suspend(|| inner.write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Renders progress events as one bar per host.
pub struct ProgressReporter {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: HashMap<String, ProgressBar>,
}

impl ProgressReporter {
    /// Create a reporter adding its bars to `multi` (see [`console`]).
    pub fn new(multi: MultiProgress) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.magenta.bold} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        Self {
            multi,
            style,
            bars: HashMap::new(),
        }
    }

    /// Consume events on a dedicated task until every sender is gone.
    pub fn spawn(mut self, mut rx: mpsc::Receiver<ProgressEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.render(&event);
            }
            self.clear();
        })
    }

    /// Apply one event to its host's bar.
    pub fn render(&mut self, event: &ProgressEvent) {
        let bar = self.bar(&event.host, event.total);
        if event.completed as u64 > bar.position() {
            bar.set_position(event.completed as u64);
        }
        if event.done {
            if event.completed < event.total {
                bar.abandon_with_message("interrupted");
            } else {
                bar.finish_with_message("done");
            }
        }
    }

    /// Last rendered position for `host`.
    pub fn position(&self, host: &str) -> Option<u64> {
        self.bars.get(host).map(ProgressBar::position)
    }

    /// Whether `host` has received its final event.
    pub fn is_finished(&self, host: &str) -> bool {
        self.bars.get(host).is_some_and(ProgressBar::is_finished)
    }

    fn bar(&mut self, host: &str, total: usize) -> &ProgressBar {
        self.bars.entry(host.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(total as u64));
            bar.set_style(self.style.clone());
            bar.set_prefix(host.to_string());
            bar
        })
    }

    fn clear(&self) {
        // Clearing a hidden target cannot fail in a way worth reporting.
        let _ = self.multi.clear();
    }
}
