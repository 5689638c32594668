//! The two seats of a room and who sits in them.

use std::fmt;

use pairplay_protocol::{GameData, PlayerToken};
use pairplay_session::ParticipantChannel;
use pairplay_transport::{Connection, ConnectionId};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Seat
// ---------------------------------------------------------------------------

/// One of the two fixed positions in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    /// Both seats, in assignment order.
    pub const ALL: [Seat; 2] = [Seat::First, Seat::Second];

    /// The other seat.
    pub fn opponent(self) -> Seat {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }

    /// `0` for the first seat, `1` for the second.
    pub fn index(self) -> usize {
        match self {
            Seat::First => 0,
            Seat::Second => 1,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// Whoever holds a seat.
pub(crate) struct Participant<C: Connection> {
    pub(crate) token: PlayerToken,
    /// `None` after a disconnect in a started room; the seat stays taken.
    pub(crate) channel: Option<ParticipantChannel<C>>,
    /// Last snapshot received, replaced wholesale by each update.
    pub(crate) data: Option<GameData>,
    pub(crate) ready: bool,
    pub(crate) last_update: Instant,
}

impl<C: Connection> Participant<C> {
    pub(crate) fn new(
        token: PlayerToken,
        channel: Option<ParticipantChannel<C>>,
    ) -> Self {
        Self {
            token,
            channel,
            data: None,
            ready: false,
            last_update: Instant::now(),
        }
    }

    /// `true` while the participant has a connection with a running writer.
    pub(crate) fn is_live(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    pub(crate) fn connection_id(&self) -> Option<ConnectionId> {
        self.channel.as_ref().map(|c| c.id())
    }
}

// ---------------------------------------------------------------------------
// SlotPair
// ---------------------------------------------------------------------------

/// Exactly two seats, each empty or holding one participant.
///
/// Tokens are unique among occupied seats: [`Room`](crate::Room) always
/// looks a token up with [`find_token`](Self::find_token) before seating
/// it anywhere.
pub(crate) struct SlotPair<C: Connection> {
    seats: [Option<Participant<C>>; 2],
}

impl<C: Connection> SlotPair<C> {
    pub(crate) fn new() -> Self {
        Self {
            seats: [None, None],
        }
    }

    pub(crate) fn get(&self, seat: Seat) -> Option<&Participant<C>> {
        self.seats[seat.index()].as_ref()
    }

    pub(crate) fn get_mut(
        &mut self,
        seat: Seat,
    ) -> Option<&mut Participant<C>> {
        self.seats[seat.index()].as_mut()
    }

    /// Seats `participant`, returning whoever sat there before.
    pub(crate) fn put(
        &mut self,
        seat: Seat,
        participant: Participant<C>,
    ) -> Option<Participant<C>> {
        self.seats[seat.index()].replace(participant)
    }

    /// Empties a seat.
    pub(crate) fn clear(&mut self, seat: Seat) -> Option<Participant<C>> {
        self.seats[seat.index()].take()
    }

    /// The seat held by `token`, if any.
    pub(crate) fn find_token(&self, token: &PlayerToken) -> Option<Seat> {
        Seat::ALL
            .into_iter()
            .find(|&s| self.get(s).is_some_and(|p| &p.token == token))
    }

    /// The seat whose current connection is `conn`.
    pub(crate) fn find_connection(&self, conn: ConnectionId) -> Option<Seat> {
        Seat::ALL.into_iter().find(|&s| {
            self.get(s)
                .is_some_and(|p| p.connection_id() == Some(conn))
        })
    }

    /// The lowest empty seat.
    pub(crate) fn first_empty(&self) -> Option<Seat> {
        Seat::ALL.into_iter().find(|&s| self.get(s).is_none())
    }

    /// Takes every open channel out of the pair.
    pub(crate) fn take_channels(&mut self) -> Vec<ParticipantChannel<C>> {
        self.seats
            .iter_mut()
            .flatten()
            .filter_map(|p| p.channel.take())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pairplay_transport::MemoryConnection;

    use super::*;

    type Pair = SlotPair<MemoryConnection>;

    fn offline(token: &str) -> Participant<MemoryConnection> {
        Participant::new(PlayerToken::new(token), None)
    }

    #[test]
    fn test_seat_opponent_is_an_involution() {
        for seat in Seat::ALL {
            assert_ne!(seat.opponent(), seat);
            assert_eq!(seat.opponent().opponent(), seat);
        }
        assert_eq!(Seat::First.to_string(), "0");
        assert_eq!(Seat::Second.to_string(), "1");
    }

    #[test]
    fn test_first_empty_fills_in_order() {
        let mut pair = Pair::new();
        assert_eq!(pair.first_empty(), Some(Seat::First));

        pair.put(Seat::First, offline("a"));
        assert_eq!(pair.first_empty(), Some(Seat::Second));

        pair.put(Seat::Second, offline("b"));
        assert_eq!(pair.first_empty(), None);

        pair.clear(Seat::First);
        assert_eq!(pair.first_empty(), Some(Seat::First));
    }

    #[test]
    fn test_find_token() {
        let mut pair = Pair::new();
        pair.put(Seat::Second, offline("b"));

        assert_eq!(pair.find_token(&PlayerToken::new("b")), Some(Seat::Second));
        assert_eq!(pair.find_token(&PlayerToken::new("a")), None);
    }

    #[test]
    fn test_offline_participant_is_not_live() {
        let mut pair = Pair::new();
        pair.put(Seat::First, offline("a"));

        let p = pair.get(Seat::First).unwrap();
        assert!(!p.is_live());
        assert_eq!(p.connection_id(), None);
        assert!(pair.take_channels().is_empty());
    }
}
