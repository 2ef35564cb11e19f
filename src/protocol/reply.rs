//! Server reply and notice lines
//!
//! All client-visible text lives here so the exact wire strings stay in one
//! place. Lines the server sends are newline-terminated; `[OK]`, `[INFO]`,
//! `[WARN]`, `[ERROR]` and `[SERVER]` tags mark status, `[<from>]` marks a
//! delivered message, `[FILE ...]` marks a file header.

/// Handshake: name accepted.
pub const USERNAME_ACCEPTED: &str = "[OK] Username accepted.\n";

/// Handshake: name malformed.
pub const USERNAME_INVALID: &str = "[ERROR] Username must be 1–16 alphanumeric characters.\n";

/// Handshake: name already registered.
pub const USERNAME_TAKEN: &str = "[ERROR] Username already taken. Choose another.\n";

/// Handshake: session directory is full.
pub const SERVER_FULL: &str = "[ERROR] Server is full. Try again later.\n";

/// Reply to `/exit`.
pub const EXIT_GOODBYE: &str = "[INFO] Server is shutting down your connection.\n";

/// Sent to every live session during graceful shutdown.
pub const SHUTDOWN_GOODBYE: &str = "[SERVER] shutting down. Goodbye.\n";

/// `/join` argument failed validation.
pub const ROOM_NAME_INVALID: &str = "[ERROR] Room name must be 1–32 alphanumeric characters.\n";

/// `/join` target room is at member capacity.
pub const ROOM_FULL: &str = "[WARN] Room is full\n";

/// `/join` could not create a room: registry is full.
pub const ROOM_SLOTS_FULL: &str = "[WARN] Room slots are full. Room is not created. Try again later.\n";

/// `/broadcast` without a current room.
pub const JOIN_ROOM_FIRST: &str = "[ERROR] Join a room first\n";

/// `/whisper` addressed to the sender itself.
pub const WHISPER_SELF: &str = "[ERROR] Cannot whisper to yourself.\n";

/// `/sendfile` size outside 1 byte ..= 3 MiB.
pub const FILE_SIZE_INVALID: &str = "[ERROR] File size must be between 1 byte and 3MB.\n";

/// Payload buffer allocation failed.
pub const OUT_OF_MEMORY: &str = "[ERROR] Server out of memory. Try later.\n";

/// Payload ended before the declared size arrived.
pub const FILE_TRUNCATED: &str = "[ERROR] Failed to receive full file data.\n";

/// Command token not recognized.
pub const UNKNOWN_COMMAND: &str = "[ERROR] Unknown command.\n";

pub const USAGE_JOIN: &str = "[ERROR] Usage: /join <room>\n";
pub const USAGE_BROADCAST: &str = "[ERROR] Usage: /broadcast <msg>\n";
pub const USAGE_WHISPER: &str = "[ERROR] Usage: /whisper <user> <message>\n";
pub const USAGE_SENDFILE: &str = "[ERROR] Usage: /sendfile <filename> <user> <size>\n";

/// `/join` succeeded.
pub fn joined_room(user: &str, room: &str) -> String {
    format!("[OK] User \"{}\" joined the room: {}\n", user, room)
}

/// `/leave` succeeded.
pub fn left_room(user: &str, room: &str) -> String {
    format!("[INFO] User \"{}\" left the room: {}\n", user, room)
}

/// `/leave` with no current room.
pub fn not_in_any_room(user: &str) -> String {
    format!("[INFO] User \"{}\" is not in any room\n", user)
}

/// `/whisper` target is not registered.
pub fn not_online(user: &str) -> String {
    format!("[ERROR] User '{}' not online.\n", user)
}

/// `/sendfile` saw a full queue before enqueueing.
pub fn upload_queue_full(filename: &str) -> String {
    format!(
        "[INFO] Upload queue is full. Your file '{}' will be queued.\n",
        filename
    )
}

/// `/sendfile` payload accepted and enqueued.
pub fn upload_accepted(filename: &str, target: &str, size: usize) -> String {
    format!(
        "[OK] File '{}' queued for sending to {}. Size: {} bytes.\n",
        filename, target, size
    )
}

/// Frame for broadcast and whisper delivery.
pub fn message_frame(from: &str, text: &str) -> String {
    format!("[{}] {}\n", from, text)
}

/// Header line preceding raw file payload bytes.
pub fn file_header(filename: &str, size: usize, sender: &str) -> String {
    format!("[FILE {} {} {}]\n", filename, size, sender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lines_are_newline_terminated() {
        for line in [
            USERNAME_ACCEPTED,
            USERNAME_INVALID,
            USERNAME_TAKEN,
            SERVER_FULL,
            EXIT_GOODBYE,
            SHUTDOWN_GOODBYE,
            ROOM_NAME_INVALID,
            ROOM_FULL,
            ROOM_SLOTS_FULL,
            JOIN_ROOM_FIRST,
            WHISPER_SELF,
            FILE_SIZE_INVALID,
            OUT_OF_MEMORY,
            FILE_TRUNCATED,
            UNKNOWN_COMMAND,
            USAGE_JOIN,
            USAGE_BROADCAST,
            USAGE_WHISPER,
            USAGE_SENDFILE,
        ] {
            assert!(line.ends_with('\n'), "missing newline: {:?}", line);
            assert!(line.starts_with('['), "missing tag: {:?}", line);
        }
    }

    #[test]
    fn test_join_and_leave_lines() {
        assert_eq!(
            joined_room("alice", "lobby"),
            "[OK] User \"alice\" joined the room: lobby\n"
        );
        assert_eq!(
            left_room("alice", "lobby"),
            "[INFO] User \"alice\" left the room: lobby\n"
        );
        assert_eq!(
            not_in_any_room("alice"),
            "[INFO] User \"alice\" is not in any room\n"
        );
    }

    #[test]
    fn test_message_frame() {
        assert_eq!(message_frame("a", "hi"), "[a] hi\n");
        assert_eq!(message_frame("bob", "two words"), "[bob] two words\n");
    }

    #[test]
    fn test_file_header() {
        assert_eq!(
            file_header("notes.txt", 1024, "alice"),
            "[FILE notes.txt 1024 alice]\n"
        );
    }

    #[test]
    fn test_upload_lines() {
        assert_eq!(
            upload_accepted("a.pdf", "bob", 42),
            "[OK] File 'a.pdf' queued for sending to bob. Size: 42 bytes.\n"
        );
        assert_eq!(
            upload_queue_full("a.pdf"),
            "[INFO] Upload queue is full. Your file 'a.pdf' will be queued.\n"
        );
        assert_eq!(not_online("carol"), "[ERROR] User 'carol' not online.\n");
    }
}
