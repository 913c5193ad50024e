//! Background thread that keeps draining the outbox.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use super::relay::{DrainResult, OutboxRelay};
use crate::bus::Publisher;
use crate::store::OutboxStore;

enum Signal {
    Wake,
    Stop,
}

/// Handle that wakes a [`RelayThread`] before its next poll is due.
#[derive(Clone)]
pub struct Notifier {
    control: Sender<Signal>,
}

impl Notifier {
    pub fn notify(&self) {
        // a stopped relay has nothing left to wake
        let _ = self.control.send(Signal::Wake);
    }
}

/// Counters shared between the relay thread and its observers.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    polls: AtomicU64,
    published: AtomicU64,
    released: AtomicU64,
    failed: AtomicU64,
    lost: AtomicU64,
    purged: AtomicU64,
    store_errors: AtomicU64,
}

/// Point-in-time copy of [`RelayMetrics`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub polls: u64,
    pub published: u64,
    pub released: u64,
    pub failed: u64,
    pub lost: u64,
    pub purged: u64,
    pub store_errors: u64,
}

impl RelayMetrics {
    pub fn record(&self, result: &DrainResult) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.published.fetch_add(result.completed as u64, Ordering::Relaxed);
        self.released.fetch_add(result.released as u64, Ordering::Relaxed);
        self.failed.fetch_add(result.failed as u64, Ordering::Relaxed);
        self.lost.fetch_add(result.lost as u64, Ordering::Relaxed);
    }

    pub fn record_purge(&self, purged: usize) {
        self.purged.fetch_add(purged as u64, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            polls: self.polls.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

/// A background thread that drains the outbox into a publisher.
///
/// Each cycle drains one batch. A full batch is followed straight away by
/// another; otherwise the thread sleeps for `poll_interval` or until a
/// [`Notifier`] wakes it.
///
/// ```ignore
/// let relay = OutboxRelay::new(queue.clone()).with_worker_id("relay-1");
/// let thread = RelayThread::spawn(store.clone(), relay, Duration::from_millis(250))?;
/// let writer = TransactionalWriter::new(store).with_notifier(thread.notifier());
///
/// // ... commit work through the writer ...
///
/// let stats = thread.stop();
/// ```
pub struct RelayThread {
    control: Sender<Signal>,
    handle: Option<JoinHandle<()>>,
    metrics: Arc<RelayMetrics>,
    worker_id: String,
}

impl RelayThread {
    pub fn spawn<S, P>(
        store: Arc<S>,
        relay: OutboxRelay<P>,
        poll_interval: Duration,
    ) -> io::Result<Self>
    where
        S: OutboxStore + ?Sized + 'static,
        P: Publisher + 'static,
    {
        let (control, signals) = channel();
        let metrics = Arc::new(RelayMetrics::default());
        let worker_id = relay.worker_id().to_string();

        let handle = {
            let metrics = Arc::clone(&metrics);
            thread::Builder::new()
                .name(format!("outbox-{}", worker_id))
                .spawn(move || run(&*store, &relay, &signals, &metrics, poll_interval))?
        };

        Ok(Self {
            control,
            handle: Some(handle),
            metrics,
            worker_id,
        })
    }

    pub fn notifier(&self) -> Notifier {
        Notifier {
            control: self.control.clone(),
        }
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Signal the thread to stop, wait for it, and return final stats.
    pub fn stop(mut self) -> RelayStats {
        let _ = self.control.send(Signal::Stop);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(worker_id = %self.worker_id, "outbox relay thread panicked");
            }
        }
        self.metrics.snapshot()
    }

    /// Signal the thread to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.control.send(Signal::Stop);
    }
}

impl Drop for RelayThread {
    fn drop(&mut self) {
        let _ = self.control.send(Signal::Stop);
    }
}

fn run<S, P>(
    store: &S,
    relay: &OutboxRelay<P>,
    signals: &Receiver<Signal>,
    metrics: &RelayMetrics,
    poll_interval: Duration,
) where
    S: OutboxStore + ?Sized,
    P: Publisher,
{
    info!(worker_id = relay.worker_id(), batch_size = relay.batch_size(), ?poll_interval, "outbox relay started");

    loop {
        let full_batch = match relay.drain(store) {
            Ok(result) => {
                metrics.record(&result);
                result.claimed >= relay.batch_size()
            }
            Err(err) => {
                metrics.record_store_error();
                error!(worker_id = relay.worker_id(), error = %err, "outbox drain failed");
                false
            }
        };

        let keep_running = if full_batch {
            still_running(signals)
        } else {
            purge(store, relay, metrics);
            wait(signals, poll_interval)
        };
        if !keep_running {
            break;
        }
    }

    info!(worker_id = relay.worker_id(), "outbox relay stopped");
}

fn purge<S, P>(store: &S, relay: &OutboxRelay<P>, metrics: &RelayMetrics)
where
    S: OutboxStore + ?Sized,
{
    let Some(retention) = relay.retention() else {
        return;
    };
    match store.purge_published(retention) {
        Ok(0) => {}
        Ok(purged) => {
            metrics.record_purge(purged);
            info!(worker_id = relay.worker_id(), purged, "purged published outbox messages");
        }
        Err(err) => {
            error!(worker_id = relay.worker_id(), error = %err, "outbox purge failed");
        }
    }
}

/// Block until woken, timed out, or stopped. Returns false once stopped.
fn wait(signals: &Receiver<Signal>, poll_interval: Duration) -> bool {
    match signals.recv_timeout(poll_interval) {
        Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => false,
        Ok(Signal::Wake) | Err(RecvTimeoutError::Timeout) => still_running(signals),
    }
}

/// Drain queued wake-ups without blocking. Returns false if a stop is pending.
fn still_running(signals: &Receiver<Signal>) -> bool {
    loop {
        match signals.try_recv() {
            Ok(Signal::Wake) => continue,
            Ok(Signal::Stop) | Err(TryRecvError::Disconnected) => return false,
            Err(TryRecvError::Empty) => return true,
        }
    }
}
