//! In-process transport plumbing
//!
//! The notify channel is the internal pipe by which other tasks (peers'
//! multiplexers, upload workers) deliver asynchronous output to a session's
//! owning multiplexer, which alone writes to the client socket.

pub mod notify;

pub use notify::{notify_channel, NotifyClosed, NotifyReader, NotifyWriter};
