//! Server-side state and tasks
//!
//! The supervisor accepts connections and owns shutdown; each session runs
//! its own multiplexer task; upload workers drain the shared queue. All
//! shared state lives in one [`ServerContext`] passed explicitly to every
//! task; there are no ambient globals.

pub mod directory;
pub mod rooms;
pub mod session;
pub mod supervisor;
pub mod upload;

pub use directory::SessionDirectory;
pub use rooms::RoomRegistry;
pub use session::Session;
pub use supervisor::Supervisor;
pub use upload::UploadQueue;

use crate::logging::LogSink;
use supervisor::ServerConfig;

/// Process-wide shared state: the session directory, the room registry, the
/// upload queue, and the log sink.
pub struct ServerContext {
    /// Live sessions keyed by display name.
    pub directory: SessionDirectory,
    /// Live rooms keyed by room name.
    pub rooms: RoomRegistry,
    /// Bounded queue of pending file transfers.
    pub uploads: UploadQueue,
    /// Append-only event log.
    pub log: LogSink,
}

impl ServerContext {
    /// Build the shared state from a server configuration.
    pub fn new(config: &ServerConfig, log: LogSink) -> Self {
        Self {
            directory: SessionDirectory::new(config.max_sessions),
            rooms: RoomRegistry::new(config.max_rooms),
            uploads: UploadQueue::new(config.upload_queue_capacity),
            log,
        }
    }

    /// Default capacities with file logging disabled. Used by tests.
    pub fn with_defaults() -> Self {
        Self::new(&ServerConfig::default(), LogSink::disabled())
    }
}
