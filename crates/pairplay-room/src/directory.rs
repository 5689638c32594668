//! The room directory: room id → room, shared by every connection task.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use pairplay_protocol::{Codec, JsonCodec, RoomId};
use pairplay_session::SessionConfig;
use pairplay_transport::Connection;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{Room, RoomConfig, RoomError};

/// Registry of live rooms.
///
/// Rooms are created on first reference to an id and leave the directory
/// when they are destroyed. Lookups and creation are safe from any number
/// of tasks at once; creation of a given id happens at most once.
pub struct Directory<C: Connection, K: Codec = JsonCodec> {
    rooms: DashMap<RoomId, Arc<Room<C, K>>>,
    codec: K,
    config: RoomConfig,
    session: SessionConfig,
}

impl<C: Connection> Directory<C, JsonCodec> {
    /// Creates an empty directory whose rooms speak JSON.
    pub fn new(config: RoomConfig, session: SessionConfig) -> Arc<Self> {
        Self::with_codec(JsonCodec, config, session)
    }
}

impl<C: Connection, K: Codec + Clone> Directory<C, K> {
    /// Creates an empty directory whose rooms use `codec`.
    pub fn with_codec(
        codec: K,
        config: RoomConfig,
        session: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            codec,
            config,
            session,
        })
    }

    /// Returns the room for `id`, creating and registering it if needed.
    ///
    /// # Errors
    /// Returns [`RoomError::InvalidRoomId`] if `id` is not a valid room id.
    pub fn get_or_create(
        self: &Arc<Self>,
        id: &str,
    ) -> Result<Arc<Room<C, K>>, RoomError> {
        let id = RoomId::parse(id)?;
        let entry = self.rooms.entry(id.clone()).or_insert_with(|| {
            tracing::info!(room_id = %id, "room created");
            Arc::new(Room::new(
                id.clone(),
                self.codec.clone(),
                self.session.clone(),
                Arc::downgrade(self),
            ))
        });
        Ok(Arc::clone(entry.value()))
    }
}

impl<C: Connection, K: Codec> Directory<C, K> {
    /// Returns the room registered under `id`.
    pub fn lookup(&self, id: &RoomId) -> Option<Arc<Room<C, K>>> {
        self.rooms.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes the entry for `id`. Returns `false` if there was none.
    ///
    /// This only unregisters; use [`Room::destroy`] to also close the
    /// room's connections.
    pub fn remove(&self, id: &RoomId) -> bool {
        self.rooms.remove(id).is_some()
    }

    /// Removes `room`'s entry if it still points at `room`, so a destroyed
    /// room never unregisters a successor with the same id.
    pub(crate) fn unregister(&self, room: &Room<C, K>) {
        self.rooms
            .remove_if(room.id(), |_, r| std::ptr::eq(Arc::as_ptr(r), room));
    }

    /// Number of registered rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Ids of every registered room, in no particular order.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Idle reaper
    // -----------------------------------------------------------------------

    /// Destroys every room idle for at least `idle_timeout`. Returns how
    /// many were destroyed; always 0 when no idle timeout is configured.
    pub async fn sweep_idle(&self) -> usize {
        let Some(timeout) = self.config.idle_timeout else {
            return 0;
        };
        // Snapshot first: no map shard lock may be held across an await.
        let rooms: Vec<_> =
            self.rooms.iter().map(|e| Arc::clone(e.value())).collect();

        let mut expired = 0;
        for room in rooms {
            if room.expire_if_idle(timeout).await {
                expired += 1;
            }
        }
        if expired > 0 {
            tracing::info!(
                expired,
                remaining = self.len(),
                "idle rooms swept"
            );
        }
        expired
    }

    /// Starts a task that calls [`sweep_idle`](Self::sweep_idle) every
    /// `sweep_interval`.
    ///
    /// Returns `None` when no idle timeout is configured. The task stops on
    /// its own once the directory is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let timeout = self.config.idle_timeout?;
        // `interval` rejects a zero period.
        let period = self.config.sweep_interval.max(Duration::from_millis(1));
        let directory = Arc::downgrade(self);

        tracing::info!(
            idle_timeout_secs = timeout.as_secs(),
            sweep_interval_secs = period.as_secs(),
            "idle reaper started"
        );
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(directory) = directory.upgrade() else {
                    break;
                };
                directory.sweep_idle().await;
            }
        }))
    }
}
