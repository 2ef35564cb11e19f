//! Per-session notify channel
//!
//! A multi-producer, single-consumer byte pipe. Producers hold cloneable
//! [`NotifyWriter`]s; the owning multiplexer holds the sole [`NotifyReader`]
//! and copies received bytes verbatim to the client transport. Dropping the
//! reader closes the channel, and every subsequent send fails with
//! [`NotifyClosed`]; the sender must treat the recipient as gone.

use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

/// Create a connected writer/reader pair.
pub fn notify_channel() -> (NotifyWriter, NotifyReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = NotifyWriter {
        tx,
        seq: Arc::new(Mutex::new(())),
    };
    (writer, NotifyReader { rx })
}

/// The recipient's channel is closed; the delivery was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyClosed;

impl fmt::Display for NotifyClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notify channel closed")
    }
}

impl std::error::Error for NotifyClosed {}

/// Shared producer endpoint of a session's notify channel.
#[derive(Clone)]
pub struct NotifyWriter {
    tx: mpsc::UnboundedSender<Bytes>,
    /// Serializes multi-part sequences across clones so two concurrent
    /// producers can never interleave within each other's sequences.
    seq: Arc<Mutex<()>>,
}

impl NotifyWriter {
    /// Send one message. Messages arrive at the reader in send order.
    pub fn send(&self, payload: Bytes) -> Result<(), NotifyClosed> {
        let _guard = self.seq.lock().map_err(|_| NotifyClosed)?;
        self.tx.send(payload).map_err(|_| NotifyClosed)
    }

    /// Send a text line as one message.
    pub fn send_line(&self, line: &str) -> Result<(), NotifyClosed> {
        self.send(Bytes::copy_from_slice(line.as_bytes()))
    }

    /// Send a multi-part sequence atomically with respect to other writers
    /// on the same channel. Stops at the first failed part.
    pub fn send_all<I>(&self, parts: I) -> Result<(), NotifyClosed>
    where
        I: IntoIterator<Item = Bytes>,
    {
        let _guard = self.seq.lock().map_err(|_| NotifyClosed)?;
        for part in parts {
            self.tx.send(part).map_err(|_| NotifyClosed)?;
        }
        Ok(())
    }

    /// Whether the owning reader has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for NotifyWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyWriter")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Exclusive consumer endpoint, owned by the session multiplexer.
#[derive(Debug)]
pub struct NotifyReader {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl NotifyReader {
    /// Receive the next message, or `None` once all writers are dropped.
    ///
    /// Cancel safe: a message is only removed from the channel when it is
    /// actually returned.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Close the channel so pending and future sends fail.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
