//! FIFO queue of block batches with a single consumer.
//!
//! Producers push whole batches; the consumer takes one job at a time via
//! [`ProcessQueue::next`] and reports completion via [`ProcessQueue::finish`],
//! which says whether the queue has drained. Clearing bumps a generation
//! counter so jobs already in the channel are skipped rather than processed.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{mpsc, watch, Mutex};

use ark_types::Block;

struct Job {
    generation: u64,
    blocks: Vec<Block>,
}

pub struct ProcessQueue {
    tx: mpsc::UnboundedSender<Job>,
    rx: Mutex<mpsc::UnboundedReceiver<Job>>,
    generation: AtomicU64,
    /// Jobs of the current generation not yet taken by the consumer.
    pending: AtomicUsize,
    running: AtomicBool,
    paused: watch::Sender<bool>,
    killed: watch::Sender<bool>,
}

impl ProcessQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            generation: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            paused: watch::Sender::new(false),
            killed: watch::Sender::new(false),
        }
    }

    /// Append a job. Returns `false` once the queue has been killed.
    pub fn push(&self, blocks: Vec<Block>) -> bool {
        if self.is_killed() || blocks.is_empty() {
            return false;
        }
        let job = Job { generation: self.generation.load(Ordering::SeqCst), blocks };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.take_pending();
            return false;
        }
        true
    }

    /// Number of jobs waiting to be processed.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// No job is waiting and none is being processed.
    pub fn idle(&self) -> bool {
        self.is_empty() && !self.running.load(Ordering::SeqCst)
    }

    /// Drop every waiting job. A job already taken by the consumer is not
    /// affected.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.pending.store(0, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Stop for good: waiting jobs are dropped and `next` returns `None`.
    pub fn kill(&self) {
        self.clear();
        self.killed.send_replace(true);
    }

    pub fn is_killed(&self) -> bool {
        *self.killed.borrow()
    }

    /// Wait for the next job of the current generation. Blocks while the
    /// queue is paused; returns `None` once it is killed.
    pub async fn next(&self) -> Option<Vec<Block>> {
        let mut killed = self.killed.subscribe();
        let mut paused = self.paused.subscribe();
        let mut rx = self.rx.lock().await;

        loop {
            tokio::select! {
                biased;
                _ = wait_until(&mut killed, true) => return None,
                _ = wait_until(&mut paused, false) => {}
            }

            let job = tokio::select! {
                biased;
                _ = wait_until(&mut killed, true) => return None,
                job = rx.recv() => job?,
            };

            if job.generation != self.generation.load(Ordering::SeqCst) {
                tracing::trace!(blocks = job.blocks.len(), "skipping cleared queue job");
                continue;
            }
            // Paused while the job was in flight: keep it for after resume.
            if self.is_paused() && !self.is_killed() {
                wait_until(&mut paused, false).await;
                if job.generation != self.generation.load(Ordering::SeqCst) {
                    continue;
                }
            }
            self.running.store(true, Ordering::SeqCst);
            self.take_pending();
            return Some(job.blocks);
        }
    }

    /// Mark the current job done. Returns `true` when nothing is left to
    /// process.
    pub fn finish(&self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        self.is_empty()
    }

    fn take_pending(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }
}

impl Default for ProcessQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_until(rx: &mut watch::Receiver<bool>, want: bool) {
    while *rx.borrow_and_update() != want {
        if rx.changed().await.is_err() {
            // Sender gone: the flag can no longer change.
            std::future::pending::<()>().await;
        }
    }
}
