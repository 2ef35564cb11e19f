//! Room registry and broadcast fan-out
//!
//! Rooms are created lazily on first join and destroyed the moment the last
//! member leaves. A session is in at most one room at any instant; the
//! registry keeps a member-to-room index so a join can first withdraw any
//! prior membership.
//!
//! Locking: the registry lock (hierarchy level 2) guards the room table and
//! the member index; each room's member list has its own lock (level 3),
//! only ever taken while holding the registry lock or alone. Broadcast takes
//! only the room lock, so broadcasts on the same room are totally ordered
//! and broadcasts on different rooms do not contend. Notify sends never
//! suspend, so no lock is held across an await point that waits on a peer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::transport::NotifyWriter;
use crate::{protocol::reply, MAX_ROOMS, ROOM_CAPACITY};

/// A room member: the session's name and a handle to its notify channel.
/// Non-owning; the directory owns the session.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub name: String,
    pub notify: NotifyWriter,
}

/// A chat room with a bounded member list.
#[derive(Debug)]
pub struct Room {
    /// Room name, unique among live rooms.
    pub name: String,
    members: Mutex<Vec<RoomMember>>,
}

impl Room {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Mutex::new(Vec::with_capacity(ROOM_CAPACITY)),
        }
    }

    /// Current number of members.
    pub async fn member_count(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Names of current members, in join order.
    pub async fn member_names(&self) -> Vec<String> {
        self.members
            .lock()
            .await
            .iter()
            .map(|m| m.name.clone())
            .collect()
    }

    /// Write `[from] text` to every member's notify channel, sender
    /// included. Holds the room lock for the duration, so broadcasts on one
    /// room never overlap. A member whose write fails is left in place;
    /// its own multiplexer is responsible for cleanup.
    ///
    /// Returns the number of members reached.
    pub async fn broadcast(&self, from: &str, text: &str) -> usize {
        let frame = reply::message_frame(from, text);
        let members = self.members.lock().await;
        let mut delivered = 0;
        for member in members.iter() {
            if member.notify.send_line(&frame).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Why a join was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// The room already has `ROOM_CAPACITY` members.
    RoomFull,
    /// No room by that name exists and the registry has no free slot.
    RegistryFull,
}

/// What a successful join did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The room was created by this join.
    pub created: bool,
    /// Membership withdrawn from a previous room first, if any.
    pub previous: Option<LeaveOutcome>,
}

/// What a withdrawal did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// The room that was left.
    pub room: String,
    /// The room became empty and was destroyed.
    pub reaped: bool,
}

struct RegistryInner {
    rooms: HashMap<String, Arc<Room>>,
    /// Which room each member is currently in. One entry per member.
    member_rooms: HashMap<String, String>,
}

/// Bounded table of live rooms keyed by name.
pub struct RoomRegistry {
    max_rooms: usize,
    inner: RwLock<RegistryInner>,
}

impl RoomRegistry {
    /// Create a registry bounded to `max_rooms` rooms.
    pub fn new(max_rooms: usize) -> Self {
        Self {
            max_rooms,
            inner: RwLock::new(RegistryInner {
                rooms: HashMap::new(),
                member_rooms: HashMap::new(),
            }),
        }
    }

    /// Create a registry with the default room cap.
    pub fn with_defaults() -> Self {
        Self::new(MAX_ROOMS)
    }

    /// Handle to a live room, or `None`.
    pub async fn find(&self, name: &str) -> Option<Arc<Room>> {
        let inner = self.inner.read().await;
        inner.rooms.get(name).cloned()
    }

    /// The room `member` is currently in, if any.
    pub async fn current_room(&self, member: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner.member_rooms.get(member).cloned()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    /// Join `member` to the room named `room_name`, creating it if absent.
    ///
    /// Any prior membership is withdrawn first, even when the join then
    /// fails, leaving the session roomless. The whole operation runs under
    /// the registry write lock, so it is atomic with respect to concurrent
    /// joins and leaves of the same name.
    pub async fn join(
        &self,
        room_name: &str,
        member: RoomMember,
    ) -> Result<JoinOutcome, JoinError> {
        let mut inner = self.inner.write().await;

        let previous = match inner.member_rooms.remove(&member.name) {
            Some(old_room) => {
                let reaped = Self::withdraw_locked(&mut inner, &old_room, &member.name).await;
                Some(LeaveOutcome {
                    room: old_room,
                    reaped,
                })
            }
            None => None,
        };

        if let Some(room) = inner.rooms.get(room_name).cloned() {
            let mut members = room.members.lock().await;
            if members.len() >= ROOM_CAPACITY {
                return Err(JoinError::RoomFull);
            }
            let member_name = member.name.clone();
            members.push(member);
            drop(members);
            inner.member_rooms.insert(member_name, room_name.to_string());
            Ok(JoinOutcome {
                created: false,
                previous,
            })
        } else {
            if inner.rooms.len() >= self.max_rooms {
                return Err(JoinError::RegistryFull);
            }
            let room = Arc::new(Room::new(room_name));
            let member_name = member.name.clone();
            room.members.lock().await.push(member);
            inner.rooms.insert(room_name.to_string(), Arc::clone(&room));
            inner.member_rooms.insert(member_name, room_name.to_string());
            Ok(JoinOutcome {
                created: true,
                previous,
            })
        }
    }

    /// Withdraw `member` from its current room, if any. An emptied room is
    /// destroyed in the same critical region that observed the zero count.
    pub async fn leave(&self, member: &str) -> Option<LeaveOutcome> {
        let mut inner = self.inner.write().await;
        let room_name = inner.member_rooms.remove(member)?;
        let reaped = Self::withdraw_locked(&mut inner, &room_name, member).await;
        Some(LeaveOutcome {
            room: room_name,
            reaped,
        })
    }

    /// Remove `member` from `room_name`'s member list and reap the room if
    /// it emptied. Caller holds the registry write lock; the member index
    /// entry has already been removed.
    async fn withdraw_locked(inner: &mut RegistryInner, room_name: &str, member: &str) -> bool {
        let Some(room) = inner.rooms.get(room_name).cloned() else {
            return false;
        };
        let mut members = room.members.lock().await;
        members.retain(|m| m.name != member);
        let empty = members.is_empty();
        drop(members);
        if empty {
            inner.rooms.remove(room_name);
        }
        empty
    }
}
