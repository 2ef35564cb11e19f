//! Parlor - Multi-Tenant TCP Chat Relay
//!
//! This library provides a chat relay server that accepts TCP client
//! sessions, authenticates each by a unique display name, and mediates
//! room broadcasts, directed whispers, and bounded file transfers among
//! connected peers.
//!
//! ## Architecture
//!
//! One task per concern, wired together through channels and shared state:
//!
//! - **Supervisor**: accepts connections, runs the name handshake, spawns
//!   session tasks, and orchestrates graceful shutdown.
//! - **Session multiplexer** (one per client): interleaves inbound commands
//!   with asynchronous deliveries bound for that client.
//! - **Room registry**: named rooms with bounded membership and serialized
//!   broadcast fan-out.
//! - **Session directory**: the bounded table of live sessions keyed by name.
//! - **Upload worker pool**: a fixed set of tasks draining the bounded
//!   file-upload queue and streaming bytes to recipients.
//!
//! ## Example
//!
//! ```rust,ignore
//! use parlor::{ServerConfig, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> parlor::Result<()> {
//!     let supervisor = Supervisor::bind(ServerConfig::default()).await?;
//!     supervisor.run().await
//! }
//! ```

// Core modules
pub mod error;
pub mod logging;
pub mod protocol;
pub mod transport;

// Server modules
pub mod server;

// Re-export error types
pub use error::{RelayError, Result};

// Re-export the log sink
pub use logging::LogSink;

// Re-export protocol types
pub use protocol::{
    command::{Command, CommandError},
    is_valid_room_name, is_valid_username,
};

// Re-export transport types
pub use transport::{notify_channel, NotifyClosed, NotifyReader, NotifyWriter};

// Re-export server types
pub use server::{
    directory::{RegisterError, SessionDirectory, SessionEntry},
    rooms::{JoinError, Room, RoomMember, RoomRegistry},
    supervisor::{ServerConfig, ShutdownHandle, Supervisor},
    upload::{UploadItem, UploadJob, UploadQueue},
    ServerContext,
};

/// Maximum number of simultaneous client sessions
pub const MAX_SESSIONS: usize = 256;

/// Maximum number of distinct chat rooms
pub const MAX_ROOMS: usize = 256;

/// Maximum number of members in any single room
pub const ROOM_CAPACITY: usize = 15;

/// Capacity of the bounded file-upload queue
pub const UPLOAD_QUEUE_CAPACITY: usize = 5;

/// Number of worker tasks draining the upload queue
pub const UPLOAD_WORKERS: usize = 5;

/// Maximum file transfer size in bytes (3 MiB)
pub const MAX_FILE_SIZE: usize = 3 * 1024 * 1024;

/// Maximum display-name length in bytes
pub const USERNAME_MAX: usize = 16;

/// Maximum room-name length in bytes
pub const ROOM_NAME_MAX: usize = 32;

/// Maximum upload filename length in bytes
pub const FILENAME_MAX: usize = 255;

/// Listen backlog for the accepting socket
pub const LISTEN_BACKLOG: u32 = 10;

/// Directory where timestamped log files are written
pub const LOG_DIRECTORY: &str = "logs";

/// Scratch buffer / payload chunk size in bytes
pub const SCRATCH_BUF: usize = 4096;
