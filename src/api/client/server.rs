//! HTTP server accepting client WebSocket connections.

use std::{io, net::SocketAddr, sync::Arc};

use actix::Addr;
use actix_web::{
    dev,
    middleware,
    web::{self, Data, Payload},
    App, Error, HttpRequest, HttpResponse, HttpServer,
};
use actix_web_actors::ws;
use stentor_client_api_proto::RoomId;

use crate::{
    api::client::session::WsSession,
    auth::{self, CredentialVerifier},
    conf::Conf,
    directory,
    log::prelude::*,
    push::PushDispatcher,
    signalling::{Room, RoomRepository},
};

/// Context of the running application shared by all client sessions.
pub struct AppContext {
    pub conf: Conf,
    pub rooms: RoomRepository,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub push: Arc<PushDispatcher>,
}

impl AppContext {
    /// Builds a new [`AppContext`], wiring the collaborators up from the
    /// given configuration.
    #[must_use]
    pub fn new(conf: Conf) -> Self {
        let verifier = auth::new_verifier(&conf.auth);
        let directory = directory::new_directory(&conf.directory);
        let push = Arc::new(PushDispatcher::new(&conf.push, directory));
        Self {
            conf,
            rooms: RoomRepository::new(),
            verifier,
            push,
        }
    }

    /// Returns the live [`Room`] with the given id, starting one if absent.
    pub fn room(&self, id: &RoomId) -> Addr<Room> {
        self.rooms.get_or_create(id, || {
            Room::new(
                id.clone(),
                self.conf.rooms.max_connections,
                self.conf.floor.max_duration,
                Arc::clone(&self.push),
                self.rooms.clone(),
            )
        })
    }
}

/// Handles an HTTP upgrade request, performing the handshake and
/// establishing a WebSocket connection backed by a fresh [`WsSession`].
///
/// # Errors
///
/// Errors if the handshake fails for any underlying reason.
#[allow(clippy::unused_async)]
async fn create_ws(
    request: HttpRequest,
    state: Data<AppContext>,
    payload: Payload,
) -> Result<HttpResponse, Error> {
    ws::start(WsSession::new(state.into_inner()), &request, payload)
}

/// Starts the server accepting client WebSocket connections on the
/// configured address.
///
/// Returns the server handle together with the actually bound addresses
/// (useful with an OS-assigned port).
///
/// # Errors
///
/// Errors if binding the listen address fails.
pub fn run(conf: Conf) -> io::Result<(dev::Server, Vec<SocketAddr>)> {
    let bind_addr = conf.server.bind_addr();
    let ctx = Arc::new(AppContext::new(conf));

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::from(Arc::clone(&ctx)))
            .wrap(middleware::Logger::default())
            .service(web::resource("/ws").route(web::get().to(create_ws)))
    })
    .bind(bind_addr)?;

    let addrs = server.addrs();
    info!(
        "Signalling server is listening on {}",
        addrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    );
    Ok((server.run(), addrs))
}
