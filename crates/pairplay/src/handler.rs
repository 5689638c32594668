//! Per-connection handler: upgrade, path → room, cookie → token, then join.

use std::sync::Arc;

use pairplay_protocol::{Codec, CloseReason, PlayerToken};
use pairplay_transport::{Connection, PendingUpgrade, WebSocketConnection};

use crate::server::ServerState;
use crate::PairplayError;

/// Handles a single connection from upgrade to close.
///
/// Runs on its own task, so a client that stalls the upgrade only holds up
/// itself.
///
/// A path that doesn't name a valid room closes the socket with
/// [`CloseReason::INVALID_PATH`]; a room that refuses the join closes it
/// with [`CloseReason::ROOM_UNAVAILABLE`]. Otherwise this returns when the
/// participant's connection ends.
pub(crate) async fn handle_connection<K: Codec + Clone>(
    pending: PendingUpgrade,
    state: Arc<ServerState<K>>,
) -> Result<(), PairplayError> {
    let conn = pending.upgrade().await?;
    let conn_id = conn.id();
    let handshake = conn.handshake().clone();
    tracing::debug!(%conn_id, path = %handshake.path, "handling connection");

    let room_id = room_id_from_path(&handshake.path, &state.path_prefix);
    let room = match state.directory.get_or_create(room_id) {
        Ok(room) => room,
        Err(e) => {
            reject(&conn, CloseReason::INVALID_PATH).await;
            return Err(e.into());
        }
    };

    let conn = Arc::new(conn);
    let token = PlayerToken::new(handshake.token);
    match room.join(token, Arc::clone(&conn)).await {
        Ok(seat) => {
            tracing::debug!(
                %conn_id,
                room_id = %room.id(),
                %seat,
                "connection finished"
            );
            Ok(())
        }
        Err(e) => {
            reject(&conn, CloseReason::ROOM_UNAVAILABLE).await;
            Err(PairplayError::Room(e))
        }
    }
}

/// The room id part of `path`, or `""` when the prefix doesn't match
/// (which then fails room id validation).
fn room_id_from_path<'a>(path: &'a str, prefix: &str) -> &'a str {
    path.strip_prefix(prefix)
        .map(|rest| rest.trim_end_matches('/'))
        .unwrap_or("")
}

async fn reject(conn: &WebSocketConnection, reason: CloseReason) {
    tracing::debug!(
        conn_id = %conn.id(),
        code = reason.code,
        reason = reason.reason,
        "rejecting connection"
    );
    if let Err(e) = conn.close_with(reason.code, reason.reason).await {
        tracing::debug!(conn_id = %conn.id(), error = %e, "close failed");
    }
}
