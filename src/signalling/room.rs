//! Room definitions and implementations.
//!
//! A [`Room`] actor owns the authoritative roster of one channel together
//! with its PTT floor state machine. All mutations of one room are serialized
//! by the actor's mailbox, so floor transitions and roster changes observe a
//! total order while different rooms progress independently. Outbound frames
//! are queued to member sessions and written outside of this actor.

use std::{collections::HashMap, sync::Arc, time::Duration};

use actix::{
    Actor, ActorContext, AsyncContext, Context, Handler, Message, Recipient,
    SpawnHandle,
};
use chrono::{DateTime, Utc};
use failure::Fail;
use stentor_client_api_proto as proto;
use stentor_client_api_proto::{IceCandidate, RoomId, UserId};

use crate::{
    log::prelude::*,
    push::{PushDispatcher, PushKind},
    signalling::room_repo::RoomRepository,
};

/// Upper bound of one push fan-out, Directory lookups included.
const PUSH_DEADLINE: Duration = Duration::from_secs(30);

/// Outbound frame queued to a member's session for delivery.
#[derive(Clone, Debug, Message, PartialEq)]
#[rtype(result = "()")]
pub struct OutboundFrame(pub proto::ServerMsg);

/// Profile of an authenticated client.
#[derive(Clone, Debug)]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: String,
    pub photo_url: Option<String>,
}

/// Member of a [`Room`].
struct Member {
    profile: Profile,
    joined_at: DateTime<Utc>,

    /// Session to queue this member's outbound frames to. Non-owning: the
    /// session guarantees a [`Leave`] on its own termination.
    peer: Recipient<OutboundFrame>,
}

impl Member {
    fn to_proto(&self) -> proto::Member {
        proto::Member {
            user_id: self.profile.user_id.clone(),
            display_name: self.profile.display_name.clone(),
            photo_url: self.profile.photo_url.clone(),
            joined_at: self.joined_at.timestamp_millis() as u64,
        }
    }
}

/// State of an occupied floor. Absence means the floor is free.
#[derive(Debug)]
struct FloorState {
    speaker_id: UserId,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Error of joining a [`Room`].
#[derive(Clone, Copy, Debug, Eq, Fail, PartialEq)]
pub enum RoomError {
    /// Roster is at the configured capacity.
    #[fail(display = "Room is at capacity")]
    RoomFull,
}

/// Request of a session to join the room.
#[derive(Message)]
#[rtype(result = "Result<Joined, RoomError>")]
pub struct Join {
    pub profile: Profile,
    pub peer: Recipient<OutboundFrame>,
}

/// Roster and floor snapshot taken atomically at join time.
#[derive(Debug)]
pub struct Joined {
    pub members: Vec<proto::Member>,
    pub floor_state: Option<proto::FloorState>,
}

/// Notification that a member left the room, voluntarily or because its
/// session terminated.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Leave {
    pub user_id: UserId,
}

/// Request of a member to occupy the floor.
#[derive(Message)]
#[rtype(result = "()")]
pub struct RequestFloor {
    pub user_id: UserId,
}

/// Voluntary release of a held floor.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ReleaseFloor {
    pub user_id: UserId,
}

/// Body of a signalling frame relayed between members.
#[derive(Clone, Debug)]
pub enum RelayPayload {
    Offer { sdp: String },
    Answer { sdp: String },
    Ice { candidate: IceCandidate },
    IceBatch { candidates: Vec<IceCandidate> },
}

/// Relay of a signalling frame to one member, or to the whole roster except
/// the sender when `target` is absent.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Relay {
    pub from: UserId,
    pub target: Option<UserId>,
    pub payload: RelayPayload,
}

/// Signalling room: authoritative roster plus the PTT floor state machine
/// arbitrating at most one speaker at a time.
pub struct Room {
    id: RoomId,

    members: HashMap<UserId, Member>,

    floor: Option<FloorState>,

    /// Handle of the pending floor expiry task. Replaced or cancelled on
    /// every floor transition.
    floor_timer: Option<SpawnHandle>,

    /// Capacity cap of the roster.
    max_members: usize,

    /// Upper bound of one continuous floor hold.
    floor_duration: Duration,

    push: Arc<PushDispatcher>,

    repo: RoomRepository,
}

impl Room {
    #[must_use]
    pub fn new(
        id: RoomId,
        max_members: usize,
        floor_duration: Duration,
        push: Arc<PushDispatcher>,
        repo: RoomRepository,
    ) -> Self {
        Self {
            id,
            members: HashMap::new(),
            floor: None,
            floor_timer: None,
            max_members,
            floor_duration,
            push,
            repo,
        }
    }

    /// Queues the given message to the single specified member, if present.
    fn send_to(&self, user_id: &UserId, msg: proto::ServerMsg) {
        if let Some(member) = self.members.get(user_id) {
            member.peer.do_send(OutboundFrame(msg));
        }
    }

    /// Queues the given message to every member except `except`.
    fn broadcast_except(&self, except: &UserId, msg: proto::ServerMsg) {
        for (id, member) in &self.members {
            if id != except {
                member.peer.do_send(OutboundFrame(msg.clone()));
            }
        }
    }

    /// Queues the given message to the whole roster.
    fn broadcast(&self, msg: proto::ServerMsg) {
        for member in self.members.values() {
            member.peer.do_send(OutboundFrame(msg.clone()));
        }
    }

    /// Roster snapshot in join order.
    fn roster(&self) -> Vec<proto::Member> {
        let mut members: Vec<_> =
            self.members.values().map(Member::to_proto).collect();
        members.sort_by(|a, b| {
            (a.joined_at, &a.user_id).cmp(&(b.joined_at, &b.user_id))
        });
        members
    }

    /// Wire projection of the current floor state.
    fn floor_to_proto(&self) -> Option<proto::FloorState> {
        self.floor.as_ref().map(|floor| {
            let speaker = self.members.get(&floor.speaker_id);
            proto::FloorState {
                speaker_id: floor.speaker_id.clone(),
                speaker_name: speaker
                    .map(|m| m.profile.display_name.clone())
                    .unwrap_or_default(),
                speaker_photo_url: speaker
                    .and_then(|m| m.profile.photo_url.clone()),
                started_at: floor.started_at.timestamp_millis() as u64,
                expires_at: floor.expires_at.timestamp_millis() as u64,
            }
        })
    }

    /// Hold duration as a [`chrono::Duration`].
    fn hold_duration(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.floor_duration)
            .unwrap_or_else(|_| chrono::Duration::max_value())
    }

    /// Cancels the pending floor expiry task, if any.
    fn cancel_floor_timer(&mut self, ctx: &mut Context<Self>) {
        if let Some(handle) = self.floor_timer.take() {
            ctx.cancel_future(handle);
        }
    }

    /// Schedules the expiry task of the current hold, replacing any pending
    /// one. The task re-checks the speaker identity when firing: the hold may
    /// have changed hands since.
    fn schedule_floor_timer(
        &mut self,
        ctx: &mut Context<Self>,
        speaker_id: UserId,
    ) {
        self.cancel_floor_timer(ctx);
        let handle = ctx.run_later(self.floor_duration, move |room, _| {
            room.floor_timer = None;
            let holds = room
                .floor
                .as_ref()
                .map_or(false, |f| f.speaker_id == speaker_id);
            if holds {
                room.expire(&speaker_id);
            }
        });
        self.floor_timer = Some(handle);
    }

    /// HELD → FREE transition on deadline expiry.
    fn expire(&mut self, speaker_id: &UserId) {
        self.floor = None;
        info!(
            "Floor hold of [{}] in room [{}] timed out",
            speaker_id, self.id
        );
        self.send_to(
            speaker_id,
            proto::ServerMsg::FloorTimeout {
                room_id: self.id.clone(),
            },
        );
        self.broadcast(proto::ServerMsg::FloorReleased {
            room_id: self.id.clone(),
        });
    }

    /// Applies the expiry transition early, when a hold is observed past its
    /// deadline before the timer fired.
    fn reap_expired(&mut self, ctx: &mut Context<Self>) {
        let expired_speaker = self.floor.as_ref().and_then(|floor| {
            if Utc::now() >= floor.expires_at {
                Some(floor.speaker_id.clone())
            } else {
                None
            }
        });
        if let Some(speaker_id) = expired_speaker {
            self.cancel_floor_timer(ctx);
            self.expire(&speaker_id);
        }
    }

    /// Drops an expired hold without emitting events. Callers immediately
    /// grant the floor to a new speaker, which supersedes the stale hold for
    /// every observer.
    fn reap_expired_silently(&mut self, ctx: &mut Context<Self>) {
        let expired = self
            .floor
            .as_ref()
            .map_or(false, |f| Utc::now() >= f.expires_at);
        if expired {
            self.cancel_floor_timer(ctx);
            self.floor = None;
        }
    }

    /// FREE → HELD transition.
    fn grant(&mut self, user_id: UserId, ctx: &mut Context<Self>) {
        let now = Utc::now();
        let expires = now + self.hold_duration();
        self.floor = Some(FloorState {
            speaker_id: user_id.clone(),
            started_at: now,
            expires_at: expires,
        });
        let expires_at = expires.timestamp_millis() as u64;
        info!("Floor of room [{}] granted to [{}]", self.id, user_id);
        self.send_to(
            &user_id,
            proto::ServerMsg::FloorGranted {
                room_id: self.id.clone(),
                expires_at,
            },
        );
        if let Some(speaker) = self.members.get(&user_id).map(Member::to_proto)
        {
            let speaker_name = speaker.display_name.clone();
            self.broadcast_except(
                &user_id,
                proto::ServerMsg::FloorTaken {
                    room_id: self.id.clone(),
                    speaker,
                    expires_at,
                },
            );
            self.notify_push(
                PushKind::BroadcastStarted,
                user_id.clone(),
                speaker_name,
            );
        }
        self.schedule_floor_timer(ctx, user_id);
    }

    /// Lease extension: HELD(u) → HELD(u, now + D).
    fn extend(&mut self, user_id: UserId, ctx: &mut Context<Self>) {
        let expires = Utc::now() + self.hold_duration();
        if let Some(floor) = self.floor.as_mut() {
            floor.expires_at = expires;
        }
        let expires_at = expires.timestamp_millis() as u64;
        debug!(
            "Floor hold of [{}] in room [{}] extended",
            user_id, self.id
        );
        self.send_to(
            &user_id,
            proto::ServerMsg::FloorGranted {
                room_id: self.id.clone(),
                expires_at,
            },
        );
        self.schedule_floor_timer(ctx, user_id);
    }

    /// Denial of a request while another member holds the floor.
    fn deny(&mut self, user_id: UserId, holder_id: &UserId) {
        let current_speaker =
            self.members.get(holder_id).map(Member::to_proto);
        self.send_to(
            &user_id,
            proto::ServerMsg::FloorDenied {
                room_id: self.id.clone(),
                reason: proto::DENIED_FLOOR_HELD.to_owned(),
                current_speaker,
            },
        );
    }

    /// Fires a wake-up push on a separate task, off the floor-grant path.
    fn notify_push(
        &self,
        kind: PushKind,
        speaker_id: UserId,
        speaker_name: String,
    ) {
        let push = Arc::clone(&self.push);
        let room_id = self.id.clone();
        actix::spawn(async move {
            let notify = push.notify(kind, room_id, speaker_id, speaker_name);
            if tokio::time::timeout(PUSH_DEADLINE, notify).await.is_err() {
                warn!("Push fan-out timed out");
            }
        });
    }

    /// Builds the outbound relay frame, stamping the sender's authenticated
    /// identity.
    fn stamp(&self, payload: RelayPayload, from: UserId) -> proto::ServerMsg {
        let room_id = self.id.clone();
        match payload {
            RelayPayload::Offer { sdp } => proto::ServerMsg::WebrtcOffer {
                room_id,
                sdp,
                from_user_id: from,
            },
            RelayPayload::Answer { sdp } => proto::ServerMsg::WebrtcAnswer {
                room_id,
                sdp,
                from_user_id: from,
            },
            RelayPayload::Ice { candidate } => proto::ServerMsg::WebrtcIce {
                room_id,
                candidate,
                from_user_id: from,
            },
            RelayPayload::IceBatch { candidates } => {
                proto::ServerMsg::WebrtcIceBatch {
                    room_id,
                    candidates,
                    from_user_id: from,
                }
            }
        }
    }

    /// Stops this [`Room`] once the roster is empty and no hold or expiry
    /// task is pending.
    fn try_close(&mut self, ctx: &mut Context<Self>) {
        if self.members.is_empty()
            && self.floor.is_none()
            && self.floor_timer.is_none()
        {
            debug!("Room [{}] is empty, closing", self.id);
            ctx.stop();
        }
    }
}

impl Actor for Room {
    type Context = Context<Self>;

    fn started(&mut self, _: &mut Context<Self>) {
        debug!("Room [{}] started", self.id);
    }

    fn stopped(&mut self, ctx: &mut Context<Self>) {
        self.repo.remove(&self.id, &ctx.address());
        debug!("Room [{}] stopped", self.id);
    }
}

impl Handler<Join> for Room {
    type Result = Result<Joined, RoomError>;

    fn handle(&mut self, msg: Join, ctx: &mut Context<Self>) -> Self::Result {
        let Join { profile, peer } = msg;
        let user_id = profile.user_id.clone();

        if let Some(existing) = self.members.get_mut(&user_id) {
            // Duplicate-connection takeover: the entry is refreshed in place
            // and no delta is broadcast.
            existing.profile = profile;
            existing.peer = peer;
            debug!("Member [{}] re-joined room [{}]", user_id, self.id);
        } else {
            if self.members.len() >= self.max_members {
                info!(
                    "Rejected join of [{}]: room [{}] is full",
                    user_id, self.id
                );
                return Err(RoomError::RoomFull);
            }
            let member = Member {
                profile,
                joined_at: Utc::now(),
                peer,
            };
            let member_proto = member.to_proto();
            self.members.insert(user_id.clone(), member);
            info!("Member [{}] joined room [{}]", user_id, self.id);
            self.broadcast_except(
                &user_id,
                proto::ServerMsg::MemberJoined {
                    room_id: self.id.clone(),
                    member: member_proto,
                },
            );
            let members = self.roster();
            self.broadcast_except(
                &user_id,
                proto::ServerMsg::RoomMembers {
                    room_id: self.id.clone(),
                    members,
                },
            );
        }

        // A stale hold must never be reported as granted.
        self.reap_expired(ctx);

        Ok(Joined {
            members: self.roster(),
            floor_state: self.floor_to_proto(),
        })
    }
}

impl Handler<Leave> for Room {
    type Result = ();

    fn handle(&mut self, msg: Leave, ctx: &mut Context<Self>) {
        let Leave { user_id } = msg;
        if self.members.remove(&user_id).is_none() {
            return;
        }
        info!("Member [{}] left room [{}]", user_id, self.id);

        let held = self
            .floor
            .as_ref()
            .map_or(false, |f| f.speaker_id == user_id);
        if held {
            self.cancel_floor_timer(ctx);
            self.floor = None;
            self.broadcast(proto::ServerMsg::FloorReleased {
                room_id: self.id.clone(),
            });
        }

        self.broadcast(proto::ServerMsg::MemberLeft {
            room_id: self.id.clone(),
            user_id,
        });
        let members = self.roster();
        self.broadcast(proto::ServerMsg::RoomMembers {
            room_id: self.id.clone(),
            members,
        });

        self.try_close(ctx);
    }
}

impl Handler<RequestFloor> for Room {
    type Result = ();

    fn handle(&mut self, msg: RequestFloor, ctx: &mut Context<Self>) {
        let RequestFloor { user_id } = msg;
        if !self.members.contains_key(&user_id) {
            // Sessions deny non-member requests themselves, so this only
            // fires on a race with a concurrent leave.
            debug!(
                "Ignored floor request of non-member [{}] in room [{}]",
                user_id, self.id
            );
            return;
        }

        let holder = self.floor.as_ref().map(|f| f.speaker_id.clone());
        match holder {
            Some(ref holder_id) if *holder_id == user_id => {
                self.extend(user_id, ctx);
            }
            Some(holder_id) => {
                let stale = self
                    .floor
                    .as_ref()
                    .map_or(false, |f| Utc::now() >= f.expires_at);
                if stale {
                    self.reap_expired_silently(ctx);
                    self.grant(user_id, ctx);
                } else {
                    self.deny(user_id, &holder_id);
                }
            }
            None => self.grant(user_id, ctx),
        }
    }
}

impl Handler<ReleaseFloor> for Room {
    type Result = ();

    fn handle(&mut self, msg: ReleaseFloor, ctx: &mut Context<Self>) {
        let ReleaseFloor { user_id } = msg;
        let held = self
            .floor
            .as_ref()
            .map_or(false, |f| f.speaker_id == user_id);
        if !held {
            // Release by anyone but the holder is a no-op.
            return;
        }

        self.cancel_floor_timer(ctx);
        self.floor = None;
        info!("Floor of room [{}] released by [{}]", self.id, user_id);
        self.broadcast(proto::ServerMsg::FloorReleased {
            room_id: self.id.clone(),
        });
        let speaker_name = self
            .members
            .get(&user_id)
            .map(|m| m.profile.display_name.clone())
            .unwrap_or_default();
        self.notify_push(PushKind::BroadcastEnded, user_id, speaker_name);
    }
}

impl Handler<Relay> for Room {
    type Result = ();

    fn handle(&mut self, msg: Relay, _: &mut Context<Self>) {
        let Relay {
            from,
            target,
            payload,
        } = msg;
        if !self.members.contains_key(&from) {
            debug!(
                "Dropped relay of non-member [{}] into room [{}]",
                from, self.id
            );
            return;
        }

        let msg = self.stamp(payload, from.clone());
        match target {
            // The target may have left; the frame (or the whole batch) is
            // dropped silently then.
            Some(target) => self.send_to(&target, msg),
            None => self.broadcast_except(&from, msg),
        }
    }
}
