//! A two-seat game room.
//!
//! All seat and status mutation happens under one async mutex per room.
//! Outbound frames go through each participant's
//! [`ParticipantChannel`], so holding the lock never waits on a socket.
//! Closing connections and leaving the directory happen after the lock is
//! released, collected in a [`Teardown`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use pairplay_protocol::{
    ClientMessage, Codec, Command, GameData, GameStatus, JsonCodec,
    PlayerToken, RoomId, ServerMessage,
};
use pairplay_session::{ParticipantChannel, SessionConfig};
use pairplay_transport::{Connection, ConnectionId};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::slots::{Participant, SlotPair};
use crate::{Directory, RoomError, RoomStatus, Seat};

/// A snapshot of one seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatInfo {
    pub seat: Seat,
    pub token: PlayerToken,
    /// Whether the seat currently has a live connection.
    pub connected: bool,
    pub ready: bool,
    /// Status from the participant's last update, if any.
    pub game_status: Option<GameStatus>,
    pub score: Option<i64>,
    /// Time since the participant's last update, or since joining.
    pub since_update: Duration,
}

/// A snapshot of room metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub status: RoomStatus,
    /// Indexed by [`Seat::index`]; `None` for an empty seat.
    pub seats: [Option<SeatInfo>; 2],
}

impl RoomInfo {
    /// Number of occupied seats.
    pub fn occupied(&self) -> usize {
        self.seats.iter().flatten().count()
    }
}

struct RoomInner<C: Connection> {
    status: RoomStatus,
    slots: SlotPair<C>,
    last_activity: Instant,
}

impl<C: Connection> RoomInner<C> {
    /// Moves status forward to `to`. Returns `false`, leaving status alone,
    /// if that would not be a forward move.
    fn transition(&mut self, to: RoomStatus) -> bool {
        if !self.status.can_transition_to(to) {
            return false;
        }
        self.status = to;
        true
    }
}

/// Work left over after a critical section: I/O that must not run under
/// the room lock.
struct Teardown<C: Connection> {
    close: Vec<ParticipantChannel<C>>,
    destroyed: bool,
}

impl<C: Connection> Default for Teardown<C> {
    fn default() -> Self {
        Self {
            close: Vec::new(),
            destroyed: false,
        }
    }
}

/// One two-party session.
///
/// Rooms are created by a [`Directory`] and handed out as `Arc<Room>`.
/// Each accepted connection calls [`join`](Self::join), which keeps
/// reading from the connection until it closes.
pub struct Room<C: Connection, K: Codec = JsonCodec> {
    id: RoomId,
    codec: K,
    session: SessionConfig,
    directory: Weak<Directory<C, K>>,
    inner: Mutex<RoomInner<C>>,
}

impl<C: Connection, K: Codec> Room<C, K> {
    pub(crate) fn new(
        id: RoomId,
        codec: K,
        session: SessionConfig,
        directory: Weak<Directory<C, K>>,
    ) -> Self {
        Self {
            id,
            codec,
            session,
            directory,
            inner: Mutex::new(RoomInner {
                status: RoomStatus::Waiting,
                slots: SlotPair::new(),
                last_activity: Instant::now(),
            }),
        }
    }

    /// Returns the room's id.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Returns the current status.
    pub async fn status(&self) -> RoomStatus {
        self.inner.lock().await.status
    }

    /// Returns a snapshot of the room and both seats.
    pub async fn info(&self) -> RoomInfo {
        let inner = self.inner.lock().await;
        let seats = Seat::ALL.map(|seat| {
            inner.slots.get(seat).map(|p| SeatInfo {
                seat,
                token: p.token.clone(),
                connected: p.is_live(),
                ready: p.ready,
                game_status: p.data.as_ref().map(|d| d.status),
                score: p.data.as_ref().map(|d| d.score),
                since_update: p.last_update.elapsed(),
            })
        });
        RoomInfo {
            room_id: self.id.clone(),
            status: inner.status,
            seats,
        }
    }

    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    /// Seats `conn` for `token` and serves it until the connection closes.
    ///
    /// A token already seated here gets its seat back with the new
    /// connection, and the old connection is closed. Otherwise the lowest
    /// empty seat is taken.
    ///
    /// Returns the seat once the connection has closed and the disconnect
    /// procedure has run.
    ///
    /// # Errors
    /// Rejected immediately, without touching `conn`, if the room is not
    /// [`Waiting`](RoomStatus::Waiting) or both seats hold other tokens.
    pub async fn join(
        &self,
        token: PlayerToken,
        conn: Arc<C>,
    ) -> Result<Seat, RoomError> {
        let (seat, superseded) = self.attach(token, &conn).await?;
        if let Some(old) = superseded {
            old.close().await;
        }
        self.listen(seat, &conn).await;
        Ok(seat)
    }

    async fn attach(
        &self,
        token: PlayerToken,
        conn: &Arc<C>,
    ) -> Result<(Seat, Option<ParticipantChannel<C>>), RoomError> {
        let mut inner = self.inner.lock().await;
        match inner.status {
            RoomStatus::Waiting => {}
            RoomStatus::Destroyed => {
                return Err(RoomError::Destroyed(self.id.clone()));
            }
            status => {
                return Err(RoomError::NotJoinable(self.id.clone(), status));
            }
        }

        let conn_id = conn.id();
        if let Some(seat) = inner.slots.find_token(&token) {
            let channel =
                ParticipantChannel::open(Arc::clone(conn), &self.session);
            let superseded = inner
                .slots
                .get_mut(seat)
                .and_then(|p| p.channel.replace(channel));
            inner.last_activity = Instant::now();
            tracing::info!(
                room_id = %self.id,
                %seat,
                %conn_id,
                %token,
                "participant reconnected"
            );
            return Ok((seat, superseded));
        }

        let Some(seat) = inner.slots.first_empty() else {
            tracing::debug!(room_id = %self.id, %token, "room full");
            return Err(RoomError::Full(self.id.clone()));
        };
        let channel = ParticipantChannel::open(Arc::clone(conn), &self.session);
        tracing::info!(
            room_id = %self.id,
            %seat,
            %conn_id,
            %token,
            "participant joined"
        );
        inner.slots.put(seat, Participant::new(token, Some(channel)));
        inner.last_activity = Instant::now();
        Ok((seat, None))
    }

    /// Feeds inbound frames to the dispatcher until the connection closes,
    /// then runs the disconnect procedure for it.
    async fn listen(&self, seat: Seat, conn: &Arc<C>) {
        let conn_id = conn.id();
        loop {
            match conn.recv().await {
                Ok(Some(frame)) => self.dispatch(&frame, conn_id).await,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        room_id = %self.id,
                        %conn_id,
                        error = %e,
                        "receive failed"
                    );
                    break;
                }
            }
        }
        self.disconnect(seat, conn_id).await;
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Decodes one inbound frame from connection `sender` and applies it.
    ///
    /// Undecodable frames are logged and dropped. Frames from a connection
    /// that no longer holds a seat are ignored.
    pub async fn dispatch(&self, raw: &[u8], sender: ConnectionId) {
        let msg: ClientMessage = match self.codec.decode(raw) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(
                    room_id = %self.id,
                    conn_id = %sender,
                    error = %e,
                    "dropping undecodable frame"
                );
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.status.is_destroyed() {
            return;
        }
        let Some(seat) = inner.slots.find_connection(sender) else {
            tracing::debug!(
                room_id = %self.id,
                conn_id = %sender,
                command = %msg.code,
                "ignoring frame from unseated connection"
            );
            return;
        };
        inner.last_activity = Instant::now();

        match msg.code {
            Command::Update => self.handle_update(&mut inner, seat, msg.data),
            Command::Start => self.handle_start(&mut inner, seat),
            Command::Leave => {
                tracing::debug!(room_id = %self.id, %seat, "leave requested");
                let teardown = self.disconnect_locked(&mut inner, seat, sender);
                drop(inner);
                self.finish(teardown).await;
            }
            other => {
                tracing::debug!(
                    room_id = %self.id,
                    %seat,
                    command = %other,
                    "ignoring command"
                );
            }
        }
    }

    fn handle_update(
        &self,
        inner: &mut RoomInner<C>,
        seat: Seat,
        data: Option<GameData>,
    ) {
        let Some(data) = data else {
            tracing::debug!(room_id = %self.id, %seat, "update without data");
            return;
        };
        let Some(participant) = inner.slots.get_mut(seat) else {
            return;
        };
        participant.data = Some(data.clone());
        participant.last_update = Instant::now();

        let over = data.status.is_over();
        let updated = ServerMessage::updated(data);
        self.notify_locked(inner, seat.opponent(), &updated);

        if over
            && inner.status == RoomStatus::Running
            && inner.transition(RoomStatus::Ended)
        {
            tracing::info!(room_id = %self.id, %seat, "game ended");
        }
    }

    fn handle_start(&self, inner: &mut RoomInner<C>, seat: Seat) {
        if !inner.status.is_joinable() {
            tracing::debug!(
                room_id = %self.id,
                %seat,
                status = %inner.status,
                "start ignored outside waiting"
            );
            return;
        }
        let Some(participant) = inner.slots.get_mut(seat) else {
            return;
        };
        participant.ready = true;

        let opponent_ready = inner
            .slots
            .get(seat.opponent())
            .is_some_and(|p| p.ready);
        if !opponent_ready {
            tracing::debug!(room_id = %self.id, %seat, "participant ready");
            return;
        }

        if !inner.transition(RoomStatus::Running) {
            return;
        }
        tracing::info!(room_id = %self.id, "game started");
        let started = ServerMessage::started();
        for seat in Seat::ALL {
            self.notify_locked(inner, seat, &started);
        }
    }

    // -----------------------------------------------------------------------
    // Notify
    // -----------------------------------------------------------------------

    /// Sends `msg` to whoever holds `seat`.
    ///
    /// Does nothing for an empty seat or one without a live connection.
    /// Encoding and delivery failures are logged.
    pub async fn notify(&self, seat: Seat, msg: &ServerMessage) {
        let inner = self.inner.lock().await;
        self.notify_locked(&inner, seat, msg);
    }

    fn notify_locked(
        &self,
        inner: &RoomInner<C>,
        seat: Seat,
        msg: &ServerMessage,
    ) {
        let Some(channel) =
            inner.slots.get(seat).and_then(|p| p.channel.as_ref())
        else {
            return;
        };
        let frame = match self.codec.encode(msg) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(room_id = %self.id, error = %e, "encode failed");
                return;
            }
        };
        if let Err(e) = channel.deliver(frame) {
            tracing::warn!(
                room_id = %self.id,
                %seat,
                error = %e,
                "delivery failed"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Disconnect / destroy
    // -----------------------------------------------------------------------

    /// Runs the disconnect procedure for connection `conn` on `seat`.
    ///
    /// A no-op if the seat's current connection is a different one, which
    /// is the case after a reconnect or an earlier Leave.
    async fn disconnect(&self, seat: Seat, conn: ConnectionId) {
        let teardown = {
            let mut inner = self.inner.lock().await;
            self.disconnect_locked(&mut inner, seat, conn)
        };
        self.finish(teardown).await;
    }

    fn disconnect_locked(
        &self,
        inner: &mut RoomInner<C>,
        seat: Seat,
        conn: ConnectionId,
    ) -> Teardown<C> {
        let mut teardown = Teardown::default();
        if inner.status.is_destroyed() {
            return teardown;
        }
        let waiting = inner.status.is_joinable();
        let Some(participant) = inner.slots.get_mut(seat) else {
            return teardown;
        };
        if participant.connection_id() != Some(conn) {
            return teardown;
        }

        teardown.close.extend(participant.channel.take());
        if waiting {
            inner.slots.clear(seat);
            tracing::info!(
                room_id = %self.id,
                %seat,
                conn_id = %conn,
                "seat freed"
            );
        } else {
            participant
                .data
                .get_or_insert_with(GameData::default)
                .status = GameStatus::End;
            if inner.status == RoomStatus::Running {
                inner.transition(RoomStatus::Ended);
            }
            tracing::info!(
                room_id = %self.id,
                %seat,
                conn_id = %conn,
                "participant disconnected, game ended"
            );
        }

        let opponent_live = inner
            .slots
            .get(seat.opponent())
            .is_some_and(|p| p.is_live());
        if !opponent_live {
            self.destroy_locked(inner, &mut teardown, "no live opponent");
        }
        teardown
    }

    /// Tears the room down: closes every connection and leaves the
    /// directory. Idempotent.
    pub async fn destroy(&self) {
        let teardown = {
            let mut inner = self.inner.lock().await;
            let mut teardown = Teardown::default();
            self.destroy_locked(&mut inner, &mut teardown, "requested");
            teardown
        };
        self.finish(teardown).await;
    }

    /// Destroys the room if nothing happened in it for `timeout`.
    pub(crate) async fn expire_if_idle(&self, timeout: Duration) -> bool {
        let teardown = {
            let mut inner = self.inner.lock().await;
            if inner.status.is_destroyed()
                || inner.last_activity.elapsed() < timeout
            {
                return false;
            }
            let mut teardown = Teardown::default();
            self.destroy_locked(&mut inner, &mut teardown, "idle");
            teardown
        };
        self.finish(teardown).await;
        true
    }

    fn destroy_locked(
        &self,
        inner: &mut RoomInner<C>,
        teardown: &mut Teardown<C>,
        reason: &'static str,
    ) {
        if !inner.transition(RoomStatus::Destroyed) {
            return;
        }
        teardown.close.extend(inner.slots.take_channels());
        teardown.destroyed = true;
        tracing::info!(room_id = %self.id, reason, "room destroyed");
    }

    /// Leaves the directory first: closing can take up to
    /// `close_timeout` per channel, and the id must be free for a new room
    /// meanwhile.
    async fn finish(&self, teardown: Teardown<C>) {
        if teardown.destroyed {
            if let Some(directory) = self.directory.upgrade() {
                directory.unregister(self);
            }
        }
        for channel in teardown.close {
            channel.close().await;
        }
    }
}
