//! Bounded file-upload pipeline
//!
//! Multiplexers enqueue fully-received payloads; a fixed pool of workers
//! drains the queue and streams each file to its recipient's notify channel.
//! The queue capacity is the relay's backpressure point: a producer facing a
//! full queue suspends until a worker frees a slot.
//!
//! Recipients are resolved at dequeue time, not enqueue time, so the queue
//! never holds a reference to a session that may already be gone; a transfer
//! whose recipient left is dropped and logged.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ServerContext;
use crate::protocol::reply;
use crate::{SCRATCH_BUF, UPLOAD_QUEUE_CAPACITY};

/// A fully-received file transfer awaiting delivery. The item owns its
/// payload; ownership moves through the queue to exactly one worker.
#[derive(Debug)]
pub struct UploadItem {
    /// Basename of the file as announced by the sender.
    pub filename: String,
    /// The payload, 1 byte ..= 3 MiB.
    pub data: Bytes,
    /// Display name of the sending session.
    pub sender: String,
    /// Display name of the intended recipient.
    pub target: String,
}

/// Queue entries: real transfers, or the terminator that stops one worker.
#[derive(Debug)]
pub enum UploadJob {
    Transfer(UploadItem),
    Shutdown,
}

/// Fixed-capacity FIFO with blocking producer and consumer endpoints.
///
/// Two waitsets with signal-one semantics, the same shape as a classic
/// mutex-plus-two-condvars bounded buffer: `not_full` wakes one producer per
/// removal, `not_empty` wakes one consumer per admission.
pub struct UploadQueue {
    capacity: usize,
    items: Mutex<VecDeque<UploadJob>>,
    not_full: Notify,
    not_empty: Notify,
}

impl UploadQueue {
    /// Create a queue bounded to `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            not_full: Notify::new(),
            not_empty: Notify::new(),
        }
    }

    /// Create a queue with the default capacity.
    pub fn with_defaults() -> Self {
        Self::new(UPLOAD_QUEUE_CAPACITY)
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of queued jobs.
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Whether the queue is empty right now.
    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    /// Whether the queue is full right now. Informational only: the answer
    /// may change before the caller's next action.
    pub async fn is_full(&self) -> bool {
        self.items.lock().await.len() >= self.capacity
    }

    /// Install `job` at the tail, suspending while the queue is full.
    pub async fn enqueue(&self, job: UploadJob) {
        loop {
            let slot_freed = self.not_full.notified();
            {
                let mut items = self.items.lock().await;
                if items.len() < self.capacity {
                    items.push_back(job);
                    drop(items);
                    self.not_empty.notify_one();
                    return;
                }
            }
            slot_freed.await;
        }
    }

    /// Install `job` at the tail, or give it back if the queue is full.
    pub async fn try_enqueue(&self, job: UploadJob) -> Result<(), UploadJob> {
        let mut items = self.items.lock().await;
        if items.len() < self.capacity {
            items.push_back(job);
            drop(items);
            self.not_empty.notify_one();
            Ok(())
        } else {
            Err(job)
        }
    }

    /// Remove and return the head job, suspending while the queue is empty.
    /// Ownership of the payload transfers to the caller.
    pub async fn dequeue(&self) -> UploadJob {
        loop {
            let item_added = self.not_empty.notified();
            {
                let mut items = self.items.lock().await;
                if let Some(job) = items.pop_front() {
                    drop(items);
                    self.not_full.notify_one();
                    return job;
                }
            }
            item_added.await;
        }
    }
}

/// Spawn the worker pool. Each worker loops on `dequeue` until it sees a
/// terminator; the supervisor enqueues one terminator per worker at
/// shutdown and joins the returned handles.
pub fn spawn_upload_workers(count: usize, ctx: Arc<ServerContext>) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { upload_worker(worker, ctx).await })
        })
        .collect()
}

async fn upload_worker(worker: usize, ctx: Arc<ServerContext>) {
    debug!(worker, "upload worker started");
    loop {
        match ctx.uploads.dequeue().await {
            UploadJob::Shutdown => {
                debug!(worker, "upload worker stopping");
                break;
            }
            UploadJob::Transfer(item) => deliver(&ctx, item).await,
        }
    }
}

/// Deliver one transfer: resolve the recipient now, then stream the header
/// and payload through its notify channel. Exactly one attempt; the payload
/// buffer is released on every path.
async fn deliver(ctx: &ServerContext, item: UploadItem) {
    // The directory lock covers only this lookup; the stream below runs on
    // a sender clone after the lock is released.
    let Some(notify) = ctx.directory.resolve(&item.target).await else {
        warn!(
            file = %item.filename,
            sender = %item.sender,
            target = %item.target,
            "recipient dropped"
        );
        ctx.log.write(&format!(
            "[FILE-QUEUE] Recipient '{}' not found for file '{}' from '{}'. Dropping.",
            item.target, item.filename, item.sender
        ));
        return;
    };

    let header = reply::file_header(&item.filename, item.data.len(), &item.sender);
    let mut parts = Vec::with_capacity(1 + item.data.len().div_ceil(SCRATCH_BUF));
    parts.push(Bytes::from(header));
    let mut offset = 0;
    while offset < item.data.len() {
        let end = usize::min(offset + SCRATCH_BUF, item.data.len());
        parts.push(item.data.slice(offset..end));
        offset = end;
    }

    match notify.send_all(parts) {
        Ok(()) => {
            info!(
                file = %item.filename,
                sender = %item.sender,
                target = %item.target,
                size = item.data.len(),
                "file delivered"
            );
            ctx.log.write(&format!(
                "[SEND FILE] '{}' sent from {} to {} (success).",
                item.filename, item.sender, item.target
            ));
        }
        Err(_) => {
            warn!(
                file = %item.filename,
                target = %item.target,
                "file delivery aborted"
            );
            ctx.log.write(&format!(
                "[FILE-ERROR] Failed sending '{}' to '{}'.",
                item.filename, item.target
            ));
        }
    }
}
