//! WebSocket session definitions and implementations.

use std::{
    cmp,
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use actix::{
    fut, Actor, ActorContext, ActorFutureExt, Addr, AsyncContext,
    ContextFutureSpawner as _, Handler, SpawnHandle, StreamHandler,
    WrapFuture,
};
use actix_web_actors::ws;
use stentor_client_api_proto::{
    ClientMsg, ErrorCode, RoomId, ServerMsg, UserId, DENIED_NOT_MEMBER,
};

use crate::{
    api::client::server::AppContext,
    log::prelude::*,
    signalling::room::{
        Join, Leave, OutboundFrame, Profile, Relay, RelayPayload,
        ReleaseFloor, RequestFloor, Room,
    },
};

/// Established WebSocket session of one client.
///
/// A session decodes inbound frames, enforces authentication, dispatches
/// actions to [`Room`]s, and owns the single outbound write queue of its
/// connection: all frames produced for this client pass through this actor's
/// mailbox, so the client observes them in production order.
pub struct WsSession {
    app: Arc<AppContext>,

    /// Profile adopted at authentication time, [`None`] until then.
    profile: Option<Profile>,

    /// Rooms this session is currently joined to.
    joined_rooms: HashMap<RoomId, Addr<Room>>,

    /// Moment of the last inbound frame, transport control frames included.
    last_activity: Instant,

    /// Handle of the pending authentication deadline task.
    auth_deadline: Option<SpawnHandle>,
}

impl WsSession {
    #[must_use]
    pub fn new(app: Arc<AppContext>) -> Self {
        Self {
            app,
            profile: None,
            joined_rooms: HashMap::new(),
            last_activity: Instant::now(),
            auth_deadline: None,
        }
    }

    /// Serializes and writes the given message to the peer.
    fn send_msg(
        &self,
        ctx: &mut ws::WebsocketContext<Self>,
        msg: ServerMsg,
    ) {
        match msg.into_frame() {
            Ok(frame) => ctx.text(frame),
            Err(e) => error!("Failed to serialize outbound frame: {}", e),
        }
    }

    /// Dispatches one decoded inbound frame.
    fn dispatch(
        &mut self,
        msg: ClientMsg,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let msg = match msg {
            ClientMsg::Ping => {
                self.send_msg(ctx, ServerMsg::Pong);
                return;
            }
            ClientMsg::Pong => return,
            ClientMsg::Auth {
                token,
                display_name,
            } => {
                self.handle_auth(&token, display_name, ctx);
                return;
            }
            msg => msg,
        };

        let user_id = match &self.profile {
            Some(profile) => profile.user_id.clone(),
            None => {
                self.send_msg(
                    ctx,
                    ServerMsg::Error {
                        code: ErrorCode::Unauthorized,
                        message: "Authentication required".to_owned(),
                    },
                );
                return;
            }
        };

        match msg {
            ClientMsg::JoinRoom { room_id } => self.handle_join(room_id, ctx),
            ClientMsg::LeaveRoom { room_id } => {
                self.handle_leave(&room_id, user_id);
            }
            ClientMsg::RequestFloor { room_id } => {
                self.handle_request_floor(room_id, user_id, ctx);
            }
            ClientMsg::ReleaseFloor { room_id } => {
                self.handle_release_floor(&room_id, user_id);
            }
            ClientMsg::WebrtcOffer {
                room_id,
                sdp,
                target_user_id,
            } => self.relay(
                &room_id,
                user_id,
                target_user_id,
                RelayPayload::Offer { sdp },
            ),
            ClientMsg::WebrtcAnswer {
                room_id,
                sdp,
                target_user_id,
            } => self.relay(
                &room_id,
                user_id,
                target_user_id,
                RelayPayload::Answer { sdp },
            ),
            ClientMsg::WebrtcIce {
                room_id,
                candidate,
                target_user_id,
            } => self.relay(
                &room_id,
                user_id,
                target_user_id,
                RelayPayload::Ice { candidate },
            ),
            ClientMsg::WebrtcIceBatch {
                room_id,
                candidates,
                target_user_id,
            } => self.relay(
                &room_id,
                user_id,
                target_user_id,
                RelayPayload::IceBatch { candidates },
            ),
            ClientMsg::Auth { .. } | ClientMsg::Ping | ClientMsg::Pong => {}
        }
    }

    /// Verifies the presented credential and completes authentication.
    ///
    /// The client-supplied display name wins when non-empty, then the
    /// verifier's one, then `"User"`.
    fn handle_auth(
        &mut self,
        token: &str,
        display_name: Option<String>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        if self.profile.is_some() {
            self.send_msg(
                ctx,
                ServerMsg::Error {
                    code: ErrorCode::Unauthorized,
                    message: "Session is already authenticated".to_owned(),
                },
            );
            return;
        }

        match self.app.verifier.verify(token) {
            Ok(identity) => {
                if let Some(handle) = self.auth_deadline.take() {
                    ctx.cancel_future(handle);
                }
                let display_name = display_name
                    .filter(|name| !name.is_empty())
                    .or_else(|| {
                        identity
                            .display_name
                            .clone()
                            .filter(|name| !name.is_empty())
                    })
                    .unwrap_or_else(|| "User".to_owned());
                info!("Session authenticated as [{}]", identity.user_id);
                self.profile = Some(Profile {
                    user_id: identity.user_id.clone(),
                    display_name: display_name.clone(),
                    photo_url: identity.photo_url,
                });
                self.send_msg(
                    ctx,
                    ServerMsg::AuthSuccess {
                        user_id: identity.user_id,
                        display_name,
                    },
                );
            }
            Err(e) => {
                info!("Authentication failed: {}", e);
                self.send_msg(
                    ctx,
                    ServerMsg::AuthFailed {
                        reason: e.to_string(),
                    },
                );
                ctx.stop();
            }
        }
    }

    /// Joins the room, answering with the roster snapshot or a capacity
    /// error.
    ///
    /// Waits for the room's answer before processing further inbound frames,
    /// keeping this session's actions ordered.
    fn handle_join(
        &mut self,
        room_id: RoomId,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let profile = match &self.profile {
            Some(profile) => profile.clone(),
            None => return,
        };
        let room = self.app.room(&room_id);
        let peer = ctx.address().recipient();

        room.send(Join { profile, peer })
            .into_actor(self)
            .then(move |res, session, ctx| {
                match res {
                    Ok(Ok(joined)) => {
                        session.joined_rooms.insert(room_id.clone(), room);
                        session.send_msg(
                            ctx,
                            ServerMsg::RoomJoined {
                                room_id,
                                members: joined.members,
                                floor_state: joined.floor_state,
                            },
                        );
                    }
                    Ok(Err(e)) => {
                        session.send_msg(
                            ctx,
                            ServerMsg::Error {
                                code: ErrorCode::RoomFull,
                                message: e.to_string(),
                            },
                        );
                    }
                    Err(e) => {
                        error!(
                            "Room [{}] did not answer join: {}",
                            room_id, e
                        );
                        session.send_msg(
                            ctx,
                            ServerMsg::Error {
                                code: ErrorCode::InternalError,
                                message: "Internal server error".to_owned(),
                            },
                        );
                    }
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn handle_leave(&mut self, room_id: &RoomId, user_id: UserId) {
        if let Some(room) = self.joined_rooms.remove(room_id) {
            room.do_send(Leave { user_id });
        }
    }

    fn handle_request_floor(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        match self.joined_rooms.get(&room_id) {
            Some(room) => room.do_send(RequestFloor { user_id }),
            None => self.send_msg(
                ctx,
                ServerMsg::FloorDenied {
                    room_id,
                    reason: DENIED_NOT_MEMBER.to_owned(),
                    current_speaker: None,
                },
            ),
        }
    }

    fn handle_release_floor(&mut self, room_id: &RoomId, user_id: UserId) {
        if let Some(room) = self.joined_rooms.get(room_id) {
            room.do_send(ReleaseFloor { user_id });
        }
    }

    /// Hands a relay frame to the room for identity stamping and fanout.
    fn relay(
        &mut self,
        room_id: &RoomId,
        user_id: UserId,
        target: Option<UserId>,
        payload: RelayPayload,
    ) {
        match self.joined_rooms.get(room_id) {
            Some(room) => room.do_send(Relay {
                from: user_id,
                target,
                payload,
            }),
            None => debug!(
                "Dropped relay into room [{}] from a non-member",
                room_id,
            ),
        }
    }

    /// Answers an undecodable inbound frame: an unknown `type` keeps the
    /// session alive, anything else closes it.
    fn handle_bad_frame(
        &mut self,
        text: &str,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let tag = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|val| {
                val.get("type")
                    .and_then(|tag| tag.as_str().map(ToOwned::to_owned))
            });
        match tag {
            Some(ref tag) if !ClientMsg::is_known_type(tag) => {
                self.send_msg(
                    ctx,
                    ServerMsg::Error {
                        code: ErrorCode::UnknownType,
                        message: format!("Unknown frame type [{}]", tag),
                    },
                );
            }
            _ => {
                self.send_msg(
                    ctx,
                    ServerMsg::Error {
                        code: ErrorCode::MalformedFrame,
                        message: "Frame could not be decoded".to_owned(),
                    },
                );
                ctx.stop();
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!("New client connection established");

        self.auth_deadline = Some(ctx.run_later(
            self.app.conf.rpc.auth_timeout,
            |session, ctx| {
                if session.profile.is_none() {
                    info!("Authentication timed out, closing session");
                    session.send_msg(
                        ctx,
                        ServerMsg::AuthFailed {
                            reason: "Authentication timed out".to_owned(),
                        },
                    );
                    ctx.stop();
                }
            },
        ));

        // Liveness is judged by inbound idle time: some transports do not
        // report half-open peers promptly.
        let idle_timeout = self.app.conf.rpc.idle_timeout;
        let check_interval =
            cmp::max(idle_timeout / 3, Duration::from_millis(100));
        ctx.run_interval(check_interval, move |session, ctx| {
            if session.last_activity.elapsed() > idle_timeout {
                info!("Closing idle session");
                ctx.stop();
            }
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        match &self.profile {
            Some(profile) => {
                for room in self.joined_rooms.values() {
                    room.do_send(Leave {
                        user_id: profile.user_id.clone(),
                    });
                }
                debug!("Session of [{}] closed", profile.user_id);
            }
            None => debug!("Unauthenticated session closed"),
        }
    }
}

impl Handler<OutboundFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        self.send_msg(ctx, msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(
        &mut self,
        msg: Result<ws::Message, ws::ProtocolError>,
        ctx: &mut Self::Context,
    ) {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("WebSocket protocol error: {}", e);
                ctx.stop();
                return;
            }
        };
        self.last_activity = Instant::now();

        match msg {
            ws::Message::Text(text) => {
                match ClientMsg::from_frame(&text) {
                    Ok(msg) => self.dispatch(msg, ctx),
                    Err(e) => {
                        debug!("Failed to decode inbound frame: {}", e);
                        self.handle_bad_frame(&text, ctx);
                    }
                }
            }
            ws::Message::Ping(data) => ctx.pong(&data),
            ws::Message::Pong(_) => {}
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Binary(_) => {
                self.send_msg(
                    ctx,
                    ServerMsg::Error {
                        code: ErrorCode::MalformedFrame,
                        message: "Binary frames are not supported".to_owned(),
                    },
                );
                ctx.stop();
            }
            _ => {}
        }
    }
}
