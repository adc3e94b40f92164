//! Signalling API integration tests.
//!
//! Every test starts a real server on an OS-assigned localhost port and
//! drives it over actual WebSocket connections with dev credentials.

mod floor;
mod membership;
mod relay;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use actix_codec::Framed;
use awc::{
    ws::{Codec, Frame, Message},
    BoxedSocket,
};
use futures::{SinkExt as _, StreamExt as _};
use stentor::{api::client::server, Conf};
use stentor_client_api_proto::{
    ClientMsg, FloorState, Member, RoomId, ServerMsg,
};

/// Maximum wait for one expected frame.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Window in which no frame must arrive for "receives nothing" assertions.
pub const SILENCE: Duration = Duration::from_millis(300);

/// Configuration of a test server: dev credentials on, everything else
/// default.
pub fn test_conf() -> Conf {
    let mut conf = Conf::default();
    conf.auth.allow_dev = true;
    conf
}

/// Starts a server with the given configuration on an OS-assigned localhost
/// port.
pub fn start_server(mut conf: Conf) -> SocketAddr {
    conf.server.bind_ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
    conf.server.bind_port = 0;
    let (server, addrs) = server::run(conf).unwrap();
    actix_rt::spawn(async move {
        let _ = server.await;
    });
    addrs[0]
}

/// WebSocket client of a test server.
pub struct TestClient {
    conn: Framed<BoxedSocket, Codec>,
}

impl TestClient {
    /// Opens a WebSocket connection to the given server.
    pub async fn connect(addr: SocketAddr) -> Self {
        let (_, conn) = awc::Client::new()
            .ws(format!("ws://{}/ws", addr))
            .connect()
            .await
            .unwrap();
        Self { conn }
    }

    /// Connects and authenticates with a `dev_<user>_<name>` credential.
    pub async fn auth(addr: SocketAddr, user: &str, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client
            .send(ClientMsg::Auth {
                token: format!("dev_{}_{}", user, name),
                display_name: None,
            })
            .await;
        match client.recv().await {
            ServerMsg::AuthSuccess { .. } => {}
            other => panic!("unexpected frame: {:?}", other),
        }
        client
    }

    /// Joins the given room, returning the roster and floor snapshot of the
    /// acknowledgement.
    pub async fn join(
        &mut self,
        room: &str,
    ) -> (Vec<Member>, Option<FloorState>) {
        self.send(ClientMsg::JoinRoom {
            room_id: room.into(),
        })
        .await;
        match self.recv().await {
            ServerMsg::RoomJoined {
                room_id,
                members,
                floor_state,
            } => {
                assert_eq!(room_id, RoomId::from(room));
                (members, floor_state)
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    /// Sends one signalling frame.
    pub async fn send(&mut self, msg: ClientMsg) {
        let frame = serde_json::to_string(&msg).unwrap();
        self.send_raw(&frame).await;
    }

    /// Sends a raw text frame verbatim.
    pub async fn send_raw(&mut self, frame: &str) {
        self.conn
            .send(Message::Text(frame.to_owned().into()))
            .await
            .unwrap();
    }

    /// Receives the next signalling frame, skipping transport control
    /// frames.
    pub async fn recv(&mut self) -> ServerMsg {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.conn.next())
                .await
                .expect("timed out awaiting a frame")
                .expect("connection closed")
                .unwrap();
            match frame {
                Frame::Text(text) => {
                    return serde_json::from_slice(&text).unwrap();
                }
                Frame::Ping(_) | Frame::Pong(_) => {}
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    /// Asserts that no signalling frame arrives within [`SILENCE`].
    pub async fn expect_silence(&mut self) {
        match tokio::time::timeout(SILENCE, self.conn.next()).await {
            Err(_) => {}
            Ok(Some(Ok(Frame::Text(text)))) => panic!(
                "unexpected frame: {}",
                String::from_utf8_lossy(&text),
            ),
            Ok(other) => panic!("unexpected frame: {:?}", other),
        }
    }

    /// Asserts that the server closes this connection.
    pub async fn expect_close(&mut self) {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.conn.next())
                .await
                .expect("timed out awaiting close");
            match frame {
                None | Some(Err(_)) | Some(Ok(Frame::Close(_))) => return,
                Some(Ok(Frame::Text(text))) => panic!(
                    "unexpected frame: {}",
                    String::from_utf8_lossy(&text),
                ),
                Some(Ok(_)) => {}
            }
        }
    }

    /// Closes the connection from the client side.
    pub async fn close(mut self) {
        let _ = self.conn.send(Message::Close(None)).await;
    }
}
