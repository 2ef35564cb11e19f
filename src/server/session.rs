//! Per-session multiplexer
//!
//! One task per authenticated client. The loop waits on three sources: the
//! client transport (commands), the session's notify channel (asynchronous
//! deliveries, copied verbatim to the transport), and the server-wide
//! shutdown signal. `tokio::select!` polls its branches in random order, so
//! neither source can starve the other.
//!
//! Only this task ever writes to the client transport; peers and upload
//! workers write to the notify channel and let the multiplexer forward.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::rooms::{JoinError, LeaveOutcome, RoomMember};
use super::upload::{UploadItem, UploadJob};
use super::ServerContext;
use crate::protocol::command::Command;
use crate::protocol::{is_valid_filename, is_valid_room_name, reply};
use crate::transport::{NotifyReader, NotifyWriter};
use crate::MAX_FILE_SIZE;

/// What the loop should do after handling one command.
enum Flow {
    Continue,
    /// Client asked to leave or the transport is done.
    Exit,
    /// The server-wide shutdown fired mid-command.
    Shutdown,
}

/// A client session after successful registration.
pub struct Session<R, W> {
    name: String,
    session_id: Uuid,
    lines: Lines<R>,
    writer: W,
    notify: NotifyReader,
    notify_tx: NotifyWriter,
    current_room: Option<String>,
    shutdown: watch::Receiver<bool>,
    ctx: Arc<ServerContext>,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Build a session over an established, registered transport.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        session_id: Uuid,
        reader: R,
        writer: W,
        notify: NotifyReader,
        notify_tx: NotifyWriter,
        shutdown: watch::Receiver<bool>,
        ctx: Arc<ServerContext>,
    ) -> Self {
        Self {
            name,
            session_id,
            lines: reader.lines(),
            writer,
            notify,
            notify_tx,
            current_room: None,
            shutdown,
            ctx,
        }
    }

    /// Run the multiplexer until the session ends, then tear down.
    ///
    /// `started` is the supervisor's start barrier: it learns the session's
    /// identity before accepting the next client, for log correlation.
    pub async fn run(mut self, started: oneshot::Sender<Uuid>) {
        let _ = started.send(self.session_id);
        info!(session = %self.session_id, user = %self.name, "session started");
        self.ctx.log.write(&format!(
            "[session {}] Messaging task started for '{}'",
            self.session_id, self.name
        ));

        loop {
            tokio::select! {
                line = self.lines.next_line() => match line {
                    Ok(Some(line)) => match self.handle_line(&line).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Exit) => break,
                        Ok(Flow::Shutdown) => {
                            let _ = self.writer.write_all(reply::SHUTDOWN_GOODBYE.as_bytes()).await;
                            break;
                        }
                        Err(e) => {
                            warn!(session = %self.session_id, user = %self.name, error = %e, "send failed");
                            self.ctx.log.write(&format!(
                                "[session {}] Connection of user '{}' is over (send error).",
                                self.session_id, self.name
                            ));
                            break;
                        }
                    },
                    Ok(None) => {
                        self.ctx.log.write(&format!(
                            "[session {}] User '{}' closed the connection.",
                            self.session_id, self.name
                        ));
                        break;
                    }
                    Err(e) => {
                        warn!(session = %self.session_id, user = %self.name, error = %e, "recv failed");
                        self.ctx.log.write(&format!(
                            "[session {}] Connection of user '{}' is over (recv error).",
                            self.session_id, self.name
                        ));
                        break;
                    }
                },
                notice = self.notify.recv() => match notice {
                    Some(bytes) => {
                        if let Err(e) = self.writer.write_all(&bytes).await {
                            warn!(session = %self.session_id, user = %self.name, error = %e, "forward failed");
                            break;
                        }
                    }
                    None => break,
                },
                _ = async { let _ = self.shutdown.wait_for(|stop| *stop).await; } => {
                    let _ = self.writer.write_all(reply::SHUTDOWN_GOODBYE.as_bytes()).await;
                    break;
                }
            }
        }

        self.teardown().await;
    }

    /// Parse and dispatch one command line. `Err` means the transport write
    /// failed and the session must end.
    async fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(err) => {
                self.writer.write_all(err.reply().as_bytes()).await?;
                return Ok(Flow::Continue);
            }
        };

        info!(session = %self.session_id, user = %self.name, command = %command.name(), "command");
        self.ctx.log.write(&format!(
            "[session {}] User '{}' sent {} command",
            self.session_id,
            self.name,
            command.name()
        ));

        match command {
            Command::Exit => {
                self.writer.write_all(reply::EXIT_GOODBYE.as_bytes()).await?;
                Ok(Flow::Exit)
            }
            Command::Join { room } => self.handle_join(room).await,
            Command::Leave => self.handle_leave().await,
            Command::Broadcast { text } => self.handle_broadcast(text).await,
            Command::Whisper { target, text } => self.handle_whisper(target, text).await,
            Command::SendFile {
                filename,
                target,
                size,
            } => self.handle_sendfile(filename, target, size).await,
            Command::Unknown(_) => {
                self.writer.write_all(reply::UNKNOWN_COMMAND.as_bytes()).await?;
                self.ctx.log.write(&format!(
                    "[session {}] User '{}' sent unknown command.",
                    self.session_id, self.name
                ));
                Ok(Flow::Continue)
            }
        }
    }

    async fn handle_join(&mut self, room: String) -> io::Result<Flow> {
        if !is_valid_room_name(&room) {
            self.writer.write_all(reply::ROOM_NAME_INVALID.as_bytes()).await?;
            self.ctx.log.write(&format!(
                "[session {}] User '{}' sent invalid room name {}",
                self.session_id, self.name, room
            ));
            return Ok(Flow::Continue);
        }

        let member = RoomMember {
            name: self.name.clone(),
            notify: self.notify_tx.clone(),
        };
        match self.ctx.rooms.join(&room, member).await {
            Ok(outcome) => {
                self.current_room = Some(room.clone());
                if let Some(previous) = &outcome.previous {
                    self.log_withdrawal(previous);
                }
                if outcome.created {
                    self.ctx.log.write(&format!(
                        "[session {}] New room {} is created",
                        self.session_id, room
                    ));
                }
                self.writer
                    .write_all(reply::joined_room(&self.name, &room).as_bytes())
                    .await?;
                self.ctx.log.write(&format!(
                    "[session {}] User '{}' joined the room {}.",
                    self.session_id, self.name, room
                ));
            }
            Err(JoinError::RoomFull) => {
                // The prior membership, if any, was already withdrawn.
                self.current_room = None;
                self.writer.write_all(reply::ROOM_FULL.as_bytes()).await?;
                self.ctx.log.write(&format!(
                    "[session {}] User '{}' could not join room {}. Room is full.",
                    self.session_id, self.name, room
                ));
            }
            Err(JoinError::RegistryFull) => {
                self.current_room = None;
                self.writer.write_all(reply::ROOM_SLOTS_FULL.as_bytes()).await?;
                self.ctx.log.write(&format!(
                    "[session {}] Room {} is not created. Room slots are full",
                    self.session_id, room
                ));
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_leave(&mut self) -> io::Result<Flow> {
        if self.current_room.take().is_some() {
            if let Some(outcome) = self.ctx.rooms.leave(&self.name).await {
                self.writer
                    .write_all(reply::left_room(&self.name, &outcome.room).as_bytes())
                    .await?;
                self.ctx.log.write(&format!(
                    "[session {}] User '{}' left the room {}.",
                    self.session_id, self.name, outcome.room
                ));
                if outcome.reaped {
                    self.log_reaped(&outcome.room);
                }
            }
        } else {
            self.writer
                .write_all(reply::not_in_any_room(&self.name).as_bytes())
                .await?;
            self.ctx.log.write(&format!(
                "[session {}] User '{}' tried to leave a room but was not in any room.",
                self.session_id, self.name
            ));
        }
        Ok(Flow::Continue)
    }

    async fn handle_broadcast(&mut self, text: String) -> io::Result<Flow> {
        let Some(room_name) = self.current_room.clone() else {
            self.writer.write_all(reply::JOIN_ROOM_FIRST.as_bytes()).await?;
            self.ctx.log.write(&format!(
                "[session {}] User '{}' tried to broadcast but was not in any room.",
                self.session_id, self.name
            ));
            return Ok(Flow::Continue);
        };

        if let Some(room) = self.ctx.rooms.find(&room_name).await {
            let delivered = room.broadcast(&self.name, &text).await;
            debug!(
                session = %self.session_id,
                room = %room_name,
                delivered,
                "broadcast"
            );
        }
        Ok(Flow::Continue)
    }

    async fn handle_whisper(&mut self, target: String, text: String) -> io::Result<Flow> {
        if target == self.name {
            self.writer.write_all(reply::WHISPER_SELF.as_bytes()).await?;
            return Ok(Flow::Continue);
        }

        match self.ctx.directory.resolve(&target).await {
            None => {
                self.writer
                    .write_all(reply::not_online(&target).as_bytes())
                    .await?;
                self.ctx.log.write(&format!(
                    "[session {}] User '{}' tried to whisper to offline user '{}'",
                    self.session_id, self.name, target
                ));
            }
            Some(notify) => {
                // Delivered to the recipient only; whispers are not echoed.
                match notify.send_line(&reply::message_frame(&self.name, &text)) {
                    Ok(()) => {
                        self.ctx.log.write(&format!(
                            "[session {}] User '{}' sent whisper to {}",
                            self.session_id, self.name, target
                        ));
                    }
                    Err(_) => {
                        // Broken pipe: the recipient is gone.
                        self.writer
                            .write_all(reply::not_online(&target).as_bytes())
                            .await?;
                        self.ctx.log.write(&format!(
                            "[session {}] Whisper target '{}' is gone; delivery dropped",
                            self.session_id, target
                        ));
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    async fn handle_sendfile(
        &mut self,
        filename: String,
        target: String,
        size: u64,
    ) -> io::Result<Flow> {
        if size == 0 || size > MAX_FILE_SIZE as u64 {
            self.writer.write_all(reply::FILE_SIZE_INVALID.as_bytes()).await?;
            return Ok(Flow::Continue);
        }
        let size = size as usize;

        if !is_valid_filename(&filename) {
            self.writer.write_all(reply::USAGE_SENDFILE.as_bytes()).await?;
            self.ctx.log.write(&format!(
                "[session {}] User '{}' sent invalid filename for upload",
                self.session_id, self.name
            ));
            return Ok(Flow::Continue);
        }

        let mut data = Vec::new();
        if data.try_reserve_exact(size).is_err() {
            // Drain the announced payload so the stream stays framed.
            self.drain_payload(size as u64).await?;
            self.writer.write_all(reply::OUT_OF_MEMORY.as_bytes()).await?;
            self.ctx.log.write(&format!(
                "[session {}] Payload buffer allocation failed for user '{}' ({} bytes)",
                self.session_id, self.name, size
            ));
            return Ok(Flow::Continue);
        }
        data.resize(size, 0);

        let received = tokio::select! {
            read = self.lines.get_mut().read_exact(&mut data) => read.map(|_| true),
            _ = async { let _ = self.shutdown.wait_for(|stop| *stop).await; } => Ok(false),
        };
        match received {
            Ok(true) => {}
            Ok(false) => return Ok(Flow::Shutdown),
            Err(_) => {
                self.writer.write_all(reply::FILE_TRUNCATED.as_bytes()).await?;
                self.ctx.log.write(&format!(
                    "[session {}] Incomplete payload for '{}' from user '{}'",
                    self.session_id, filename, self.name
                ));
                return Ok(Flow::Continue);
            }
        }

        let item = UploadItem {
            filename,
            data: Bytes::from(data),
            sender: self.name.clone(),
            target,
        };
        let accepted = reply::upload_accepted(&item.filename, &item.target, item.data.len());
        let enqueued = format!(
            "[FILE-QUEUE] Upload '{}' from {} enqueued for {}.",
            item.filename, item.sender, item.target
        );

        if self.ctx.uploads.is_full().await {
            self.writer
                .write_all(reply::upload_queue_full(&item.filename).as_bytes())
                .await?;
        }

        // The backpressure point: suspends the whole session while the
        // queue is full.
        self.ctx.uploads.enqueue(UploadJob::Transfer(item)).await;

        self.writer.write_all(accepted.as_bytes()).await?;
        self.ctx.log.write(&enqueued);
        Ok(Flow::Continue)
    }

    /// Read and discard `size` payload bytes.
    async fn drain_payload(&mut self, size: u64) -> io::Result<()> {
        let reader = self.lines.get_mut();
        let mut bounded = (&mut *reader).take(size);
        let mut sink = tokio::io::sink();
        tokio::io::copy(&mut bounded, &mut sink).await.map(|_| ())
    }

    fn log_withdrawal(&self, outcome: &LeaveOutcome) {
        self.ctx.log.write(&format!(
            "[session {}] username {} removed from room {}",
            self.session_id, self.name, outcome.room
        ));
        if outcome.reaped {
            self.log_reaped(&outcome.room);
        }
    }

    fn log_reaped(&self, room: &str) {
        self.ctx.log.write(&format!(
            "[session {}] The room {} was deleted because there was no one left in the room",
            self.session_id, room
        ));
    }

    /// Release every session resource exactly once: room membership, the
    /// notify channel, the transport write half, the directory slot.
    async fn teardown(mut self) {
        if self.current_room.take().is_some() {
            if let Some(outcome) = self.ctx.rooms.leave(&self.name).await {
                self.log_withdrawal(&outcome);
            }
        }

        // Producers holding a writer clone now observe a broken pipe.
        self.notify.close();
        let _ = self.writer.shutdown().await;

        self.ctx.log.write(&format!(
            "[session {}] User \"{}\" has been disconnected and removed.",
            self.session_id, self.name
        ));
        if self.ctx.directory.deregister(&self.name).await {
            self.ctx.log.write(&format!(
                "[session {}] Connection of {} is deleted",
                self.session_id, self.name
            ));
        } else {
            self.ctx.log.write(&format!(
                "[session {}] Connection of {} could not be deleted",
                self.session_id, self.name
            ));
        }
        info!(session = %self.session_id, user = %self.name, "session ended");
    }
}
