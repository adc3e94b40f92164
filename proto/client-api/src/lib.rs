//! Client API protocol implementation for Stentor signalling server.
//!
//! Every frame on the wire is a UTF-8 JSON object carrying a `type` tag and
//! an envelope `timestamp` (milliseconds since Unix epoch). Inbound frames
//! are represented by [`ClientMsg`], outbound ones by [`ServerMsg`]; the
//! `timestamp` is stamped on encoding and ignored on decoding.

use std::time::{SystemTime, UNIX_EPOCH};

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// ID of a user (an authenticated client). Opaque non-empty string.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, Ord, PartialEq,
    PartialOrd, Serialize,
)]
pub struct UserId(pub String);

/// ID of a room (a named channel sharing one PTT floor). Opaque non-empty
/// string.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, Ord, PartialEq,
    PartialOrd, Serialize,
)]
pub struct RoomId(pub String);

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Member record as it appears on the wire.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: UserId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Milliseconds since Unix epoch of the moment this member joined.
    pub joined_at: u64,
}

/// State of an occupied PTT floor as it appears on the wire. Absence of this
/// record means the floor is free.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorState {
    pub speaker_id: UserId,
    pub speaker_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_photo_url: Option<String>,
    /// Milliseconds since Unix epoch of the moment the floor was granted.
    pub started_at: u64,
    /// Milliseconds since Unix epoch of the moment the hold expires.
    pub expires_at: u64,
}

/// Representation of [RTCIceCandidateInit][1] object.
///
/// [1]: https://www.w3.org/TR/webrtc/#dom-rtcicecandidateinit
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

/// Machine-readable code of a [`ServerMsg::Error`] frame.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Room roster has reached its configured capacity.
    RoomFull,

    /// Inbound frame could not be decoded. The session is closed after this
    /// code is emitted.
    MalformedFrame,

    /// Inbound frame decoded to a kind unknown to this server.
    UnknownType,

    /// Action attempted before authentication completed.
    Unauthorized,

    /// Server-side failure not attributable to the client.
    InternalError,
}

/// Denial reason reported when the requester is not in the room's roster.
pub const DENIED_NOT_MEMBER: &str = "You are not a member of this room";

/// Denial reason reported while another member holds the floor.
pub const DENIED_FLOOR_HELD: &str = "Floor is currently held by another user";

/// WebSocket message from a client to Stentor.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Authentication request. Must be the first frame of a session.
    #[serde(rename_all = "camelCase")]
    Auth {
        token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },

    /// Heartbeat probe. Answered with [`ServerMsg::Pong`].
    Ping,

    /// Heartbeat answer to a server-side [`ServerMsg::Ping`].
    Pong,

    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: RoomId },

    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: RoomId },

    /// Request to occupy the room's PTT floor.
    #[serde(rename_all = "camelCase")]
    RequestFloor { room_id: RoomId },

    /// Voluntary release of a held PTT floor.
    #[serde(rename_all = "camelCase")]
    ReleaseFloor { room_id: RoomId },

    /// SDP offer relayed to `target_user_id`, or to the whole roster when
    /// absent.
    #[serde(rename_all = "camelCase")]
    WebrtcOffer {
        room_id: RoomId,
        sdp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<UserId>,
    },

    /// SDP answer relayed to `target_user_id`, or to the whole roster when
    /// absent.
    #[serde(rename_all = "camelCase")]
    WebrtcAnswer {
        room_id: RoomId,
        sdp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<UserId>,
    },

    /// Single ICE candidate relay.
    #[serde(rename_all = "camelCase")]
    WebrtcIce {
        room_id: RoomId,
        #[serde(flatten)]
        candidate: IceCandidate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<UserId>,
    },

    /// Batched ICE candidate relay. Delivered as a single frame; intra-batch
    /// order is preserved.
    #[serde(rename_all = "camelCase")]
    WebrtcIceBatch {
        room_id: RoomId,
        candidates: Vec<IceCandidate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<UserId>,
    },
}

/// WebSocket message from Stentor to a client.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    #[serde(rename_all = "camelCase")]
    AuthSuccess {
        user_id: UserId,
        display_name: String,
    },

    /// Authentication failure. The session is closed right after this frame.
    #[serde(rename_all = "camelCase")]
    AuthFailed { reason: String },

    /// Heartbeat probe. Answered with [`ClientMsg::Pong`].
    Ping,

    /// Heartbeat answer to a client-side [`ClientMsg::Ping`].
    Pong,

    /// Acknowledgement of [`ClientMsg::JoinRoom`] carrying the roster and
    /// floor snapshot taken atomically at join time.
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_id: RoomId,
        members: Vec<Member>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        floor_state: Option<FloorState>,
    },

    /// Full roster snapshot, broadcast after every roster mutation.
    #[serde(rename_all = "camelCase")]
    RoomMembers {
        room_id: RoomId,
        members: Vec<Member>,
    },

    #[serde(rename_all = "camelCase")]
    MemberJoined { room_id: RoomId, member: Member },

    #[serde(rename_all = "camelCase")]
    MemberLeft { room_id: RoomId, user_id: UserId },

    /// The requester now holds the floor until `expires_at`.
    #[serde(rename_all = "camelCase")]
    FloorGranted { room_id: RoomId, expires_at: u64 },

    #[serde(rename_all = "camelCase")]
    FloorDenied {
        room_id: RoomId,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_speaker: Option<Member>,
    },

    /// Another member occupied the floor.
    #[serde(rename_all = "camelCase")]
    FloorTaken {
        room_id: RoomId,
        speaker: Member,
        expires_at: u64,
    },

    #[serde(rename_all = "camelCase")]
    FloorReleased { room_id: RoomId },

    /// Sent to the ex-speaker only, when the hold expired on its own.
    #[serde(rename_all = "camelCase")]
    FloorTimeout { room_id: RoomId },

    #[serde(rename_all = "camelCase")]
    WebrtcOffer {
        room_id: RoomId,
        sdp: String,
        from_user_id: UserId,
    },

    #[serde(rename_all = "camelCase")]
    WebrtcAnswer {
        room_id: RoomId,
        sdp: String,
        from_user_id: UserId,
    },

    #[serde(rename_all = "camelCase")]
    WebrtcIce {
        room_id: RoomId,
        #[serde(flatten)]
        candidate: IceCandidate,
        from_user_id: UserId,
    },

    #[serde(rename_all = "camelCase")]
    WebrtcIceBatch {
        room_id: RoomId,
        candidates: Vec<IceCandidate>,
        from_user_id: UserId,
    },

    #[serde(rename_all = "camelCase")]
    Error { code: ErrorCode, message: String },
}

impl ClientMsg {
    /// Decodes an inbound text frame. The envelope `timestamp` and any other
    /// unknown fields are ignored.
    ///
    /// # Errors
    ///
    /// Errors if the frame is not a JSON object with a known `type` tag.
    pub fn from_frame(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    /// Indicates whether the given `type` tag denotes a message kind known
    /// to this protocol.
    #[must_use]
    pub fn is_known_type(tag: &str) -> bool {
        matches!(
            tag,
            "auth"
                | "ping"
                | "pong"
                | "join_room"
                | "leave_room"
                | "request_floor"
                | "release_floor"
                | "webrtc_offer"
                | "webrtc_answer"
                | "webrtc_ice"
                | "webrtc_ice_batch"
        )
    }
}

impl ServerMsg {
    /// Encodes this message into an outbound text frame, stamping the
    /// envelope `timestamp`.
    ///
    /// # Errors
    ///
    /// Errors if JSON serialization fails.
    pub fn into_frame(self) -> Result<String, serde_json::Error> {
        let mut val = serde_json::to_value(&self)?;
        if let serde_json::Value::Object(ref mut map) = val {
            map.insert(
                "timestamp".to_owned(),
                serde_json::Value::from(now_ms()),
            );
        }
        serde_json::to_string(&val)
    }
}

/// Milliseconds elapsed since Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
