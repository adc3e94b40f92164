//! Push Dispatcher emitting wake-up notifications via the external Push
//! Gateway.
//!
//! Dispatch is best-effort and runs entirely off the signalling hot path:
//! callers fire [`PushDispatcher::notify`] on a separate task and never await
//! its outcome. Completion and errors are logged only.

use std::{sync::Arc, time::Duration};

use futures::future;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use stentor_client_api_proto::{now_ms, RoomId, UserId};
use url::Url;

use crate::{conf, directory::DirectoryAdapter, log::prelude::*};

/// Kind of a wake-up push emitted on floor transitions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PushKind {
    /// A member started transmitting in a room.
    BroadcastStarted,

    /// The transmission in a room ended.
    BroadcastEnded,
}

impl PushKind {
    /// Wire value of the payload `type` field.
    fn as_type(self) -> &'static str {
        match self {
            Self::BroadcastStarted => "live_broadcast_started",
            Self::BroadcastEnded => "live_broadcast_ended",
        }
    }

    /// Delivery priority requested from the gateway. Started notifications
    /// must wake devices up in time to receive the stream.
    fn priority(self) -> &'static str {
        match self {
            Self::BroadcastStarted => "high",
            Self::BroadcastEnded => "normal",
        }
    }

    /// TTL of the notification, seconds. A stale wake-up is useless once the
    /// broadcast is over.
    fn time_to_live(self) -> Option<u32> {
        match self {
            Self::BroadcastStarted => Some(30),
            Self::BroadcastEnded => None,
        }
    }
}

/// Multicast submission to the Push Gateway.
#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    registration_ids: &'a [String],
    priority: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_to_live: Option<u32>,
    data: PushData<'a>,
}

/// Data-only wake-up payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushData<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    channel_id: &'a str,
    channel_name: &'a str,
    speaker_id: &'a str,
    speaker_name: &'a str,
    timestamp: u64,
}

/// Per-token delivery result reported by the Push Gateway.
#[derive(Debug, Deserialize)]
struct GatewayResult {
    #[serde(default)]
    error: Option<String>,
}

/// Multicast delivery report of the Push Gateway.
#[derive(Debug, Default, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    results: Vec<GatewayResult>,
}

/// Gateway endpoint with its submission credentials.
struct Gateway {
    client: reqwest::Client,
    url: Url,
    server_key: Option<String>,
    request_timeout: Duration,
}

/// Best-effort dispatcher of wake-up pushes to room members.
pub struct PushDispatcher {
    directory: Arc<dyn DirectoryAdapter>,
    gateway: Option<Gateway>,
}

impl PushDispatcher {
    /// Builds a new [`PushDispatcher`]. Without a configured
    /// `push.gateway_url` every [`notify`](PushDispatcher::notify) is a
    /// no-op.
    #[must_use]
    pub fn new(
        conf: &conf::Push,
        directory: Arc<dyn DirectoryAdapter>,
    ) -> Self {
        let gateway = match &conf.gateway_url {
            Some(url) => Some(Gateway {
                client: reqwest::Client::new(),
                url: url.clone(),
                server_key: conf.server_key.clone(),
                request_timeout: conf.request_timeout,
            }),
            None => {
                info!(
                    "No 'push.gateway_url' configured, wake-up pushes are \
                     disabled"
                );
                None
            }
        };
        Self { directory, gateway }
    }

    /// Notifies every member of the given room except the speaker itself.
    ///
    /// Resolves the roster and push tokens through the Directory Adapter,
    /// submits one multicast to the gateway, and asks the Directory to drop
    /// tokens the gateway reported permanently dead. Transient failures are
    /// never retried.
    pub async fn notify(
        &self,
        kind: PushKind,
        room_id: RoomId,
        speaker_id: UserId,
        speaker_name: String,
    ) {
        let gateway = match &self.gateway {
            Some(gateway) => gateway,
            None => return,
        };

        let member_ids =
            match self.directory.room_member_ids(room_id.clone()).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(
                        "Directory member lookup failed for room [{}]: {}",
                        room_id, e
                    );
                    return;
                }
            };
        let targets: Vec<UserId> = member_ids
            .into_iter()
            .filter(|id| *id != speaker_id)
            .collect();
        if targets.is_empty() {
            return;
        }

        let tokens_by_user = match self.directory.push_tokens(targets).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(
                    "Directory token lookup failed for room [{}]: {}",
                    room_id, e
                );
                return;
            }
        };
        let (users, tokens): (Vec<UserId>, Vec<String>) = tokens_by_user
            .into_iter()
            .filter(|(_, token)| !token.is_empty())
            .unzip();
        if tokens.is_empty() {
            debug!("No push targets in room [{}]", room_id);
            return;
        }

        let request = GatewayRequest {
            registration_ids: &tokens,
            priority: kind.priority(),
            time_to_live: kind.time_to_live(),
            data: PushData {
                kind: kind.as_type(),
                channel_id: &room_id.0,
                channel_name: &room_id.0,
                speaker_id: &speaker_id.0,
                speaker_name: &speaker_name,
                timestamp: now_ms(),
            },
        };
        let mut builder = gateway
            .client
            .post(gateway.url.clone())
            .timeout(gateway.request_timeout)
            .json(&request);
        if let Some(key) = &gateway.server_key {
            builder = builder.header(AUTHORIZATION, format!("key={}", key));
        }

        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Push gateway unreachable: {}", e);
                return;
            }
        };
        let resp = match resp.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Push gateway rejected submission: {}", e);
                return;
            }
        };
        let report: GatewayResponse = match resp.json().await {
            Ok(report) => report,
            Err(e) => {
                debug!("Unparsable push gateway response: {}", e);
                return;
            }
        };

        debug!(
            "Dispatched [{}] push for room [{}] to {} device(s)",
            kind.as_type(),
            room_id,
            tokens.len()
        );
        self.prune_dead_tokens(&report, &users, &tokens).await;
    }

    /// Asks the Directory to remove tokens reported permanently dead by the
    /// gateway.
    async fn prune_dead_tokens(
        &self,
        report: &GatewayResponse,
        users: &[UserId],
        tokens: &[String],
    ) {
        let per_user = users.iter().zip(tokens.iter());
        let removals: Vec<_> = report
            .results
            .iter()
            .zip(per_user)
            .filter_map(|(result, (user, token))| {
                match result.error.as_deref() {
                    Some("NotRegistered") | Some("InvalidRegistration") => {
                        debug!("Pruning dead push token of user [{}]", user);
                        Some(self.directory.remove_push_token(
                            user.clone(),
                            token.clone(),
                        ))
                    }
                    Some(other) => {
                        debug!("Push to user [{}] failed: {}", user, other);
                        None
                    }
                    None => None,
                }
            })
            .collect();
        for res in future::join_all(removals).await {
            if let Err(e) = res {
                warn!("Failed to prune a push token: {}", e);
            }
        }
    }
}
