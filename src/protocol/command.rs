//! Client command parsing
//!
//! One inbound line becomes one [`Command`]. Tokens are separated by runs of
//! whitespace; for `/broadcast` and `/whisper` the message argument extends
//! to the end of the line.

use super::reply;

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/exit`: end the session.
    Exit,
    /// `/join <room>`: enter a room, leaving any current one.
    Join { room: String },
    /// `/leave`: withdraw from the current room.
    Leave,
    /// `/broadcast <text>`: message every member of the current room.
    Broadcast { text: String },
    /// `/whisper <user> <text>`: message one named session.
    Whisper { target: String, text: String },
    /// `/sendfile <filename> <user> <size>`: announce a payload of exactly
    /// `size` bytes that follows this line.
    SendFile {
        filename: String,
        target: String,
        size: u64,
    },
    /// Anything else, including an empty line.
    Unknown(String),
}

/// A structurally invalid command line, carrying the exact reply to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Wrong argument shape for a known command.
    Usage(&'static str),
    /// `/sendfile` size token did not parse as an integer.
    FileSize,
}

impl CommandError {
    /// The wire line answering this error.
    pub fn reply(&self) -> &'static str {
        match self {
            CommandError::Usage(usage) => usage,
            CommandError::FileSize => reply::FILE_SIZE_INVALID,
        }
    }
}

impl Command {
    /// Parse one line into a command.
    ///
    /// Trailing CR/LF is stripped. Unrecognized first tokens come back as
    /// [`Command::Unknown`] so the caller can answer and log them; malformed
    /// arguments to known commands come back as [`CommandError`].
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim_start();

        let (head, rest) = match trimmed.find(char::is_whitespace) {
            Some(i) => (&trimmed[..i], trimmed[i..].trim_start()),
            None => (trimmed, ""),
        };

        match head {
            "/exit" => Ok(Command::Exit),
            "/leave" => Ok(Command::Leave),
            "/join" => {
                let mut args = rest.split_whitespace();
                let room = args.next().ok_or(CommandError::Usage(reply::USAGE_JOIN))?;
                if args.next().is_some() {
                    return Err(CommandError::Usage(reply::USAGE_JOIN));
                }
                Ok(Command::Join {
                    room: room.to_string(),
                })
            }
            "/broadcast" => {
                if rest.is_empty() {
                    return Err(CommandError::Usage(reply::USAGE_BROADCAST));
                }
                Ok(Command::Broadcast {
                    text: rest.to_string(),
                })
            }
            "/whisper" => {
                let (target, text) = match rest.find(char::is_whitespace) {
                    Some(i) => (&rest[..i], rest[i..].trim_start()),
                    None => (rest, ""),
                };
                if target.is_empty() || text.is_empty() {
                    return Err(CommandError::Usage(reply::USAGE_WHISPER));
                }
                Ok(Command::Whisper {
                    target: target.to_string(),
                    text: text.to_string(),
                })
            }
            "/sendfile" => {
                let mut args = rest.split_whitespace();
                let (filename, target, size_str) = match (args.next(), args.next(), args.next()) {
                    (Some(f), Some(t), Some(s)) => (f, t, s),
                    _ => return Err(CommandError::Usage(reply::USAGE_SENDFILE)),
                };
                let size = size_str.parse::<u64>().map_err(|_| CommandError::FileSize)?;
                Ok(Command::SendFile {
                    filename: filename.to_string(),
                    target: target.to_string(),
                    size,
                })
            }
            other => Ok(Command::Unknown(other.to_string())),
        }
    }

    /// The command token, for logging.
    pub fn name(&self) -> &str {
        match self {
            Command::Exit => "/exit",
            Command::Join { .. } => "/join",
            Command::Leave => "/leave",
            Command::Broadcast { .. } => "/broadcast",
            Command::Whisper { .. } => "/whisper",
            Command::SendFile { .. } => "/sendfile",
            Command::Unknown(token) => token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exit_and_leave() {
        assert_eq!(Command::parse("/exit\n").unwrap(), Command::Exit);
        assert_eq!(Command::parse("/leave\r\n").unwrap(), Command::Leave);
        // Extra tokens after argument-free commands are ignored.
        assert_eq!(Command::parse("/exit now").unwrap(), Command::Exit);
    }

    #[test]
    fn test_parse_join() {
        assert_eq!(
            Command::parse("/join lobby\n").unwrap(),
            Command::Join {
                room: "lobby".to_string()
            }
        );
        assert_eq!(
            Command::parse("/join").unwrap_err(),
            CommandError::Usage(reply::USAGE_JOIN)
        );
        assert_eq!(
            Command::parse("/join lobby extra").unwrap_err(),
            CommandError::Usage(reply::USAGE_JOIN)
        );
    }

    #[test]
    fn test_parse_broadcast_keeps_full_text() {
        assert_eq!(
            Command::parse("/broadcast hello there world\n").unwrap(),
            Command::Broadcast {
                text: "hello there world".to_string()
            }
        );
        assert_eq!(
            Command::parse("/broadcast").unwrap_err(),
            CommandError::Usage(reply::USAGE_BROADCAST)
        );
    }

    #[test]
    fn test_parse_whisper() {
        assert_eq!(
            Command::parse("/whisper bob see you at 5\n").unwrap(),
            Command::Whisper {
                target: "bob".to_string(),
                text: "see you at 5".to_string()
            }
        );
        assert_eq!(
            Command::parse("/whisper bob").unwrap_err(),
            CommandError::Usage(reply::USAGE_WHISPER)
        );
        assert_eq!(
            Command::parse("/whisper").unwrap_err(),
            CommandError::Usage(reply::USAGE_WHISPER)
        );
    }

    #[test]
    fn test_parse_sendfile() {
        assert_eq!(
            Command::parse("/sendfile notes.txt bob 2048\n").unwrap(),
            Command::SendFile {
                filename: "notes.txt".to_string(),
                target: "bob".to_string(),
                size: 2048
            }
        );
        assert_eq!(
            Command::parse("/sendfile notes.txt bob").unwrap_err(),
            CommandError::Usage(reply::USAGE_SENDFILE)
        );
        assert_eq!(
            Command::parse("/sendfile notes.txt bob lots").unwrap_err(),
            CommandError::FileSize
        );
    }

    #[test]
    fn test_parse_unknown_and_empty() {
        assert_eq!(
            Command::parse("/dance\n").unwrap(),
            Command::Unknown("/dance".to_string())
        );
        assert_eq!(
            Command::parse("hello\n").unwrap(),
            Command::Unknown("hello".to_string())
        );
        assert_eq!(Command::parse("\n").unwrap(), Command::Unknown(String::new()));
    }

    #[test]
    fn test_error_reply_lines() {
        assert_eq!(
            CommandError::Usage(reply::USAGE_JOIN).reply(),
            reply::USAGE_JOIN
        );
        assert_eq!(CommandError::FileSize.reply(), reply::FILE_SIZE_INVALID);
    }
}
