//! Repository that stores [`Room`]s addresses.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use actix::{Actor, Addr};
use stentor_client_api_proto::RoomId;

use crate::signalling::room::Room;

/// Repository of all currently live [`Room`]s.
///
/// Rooms are created lazily on the first join and unregister themselves once
/// their roster empties.
#[derive(Clone, Default)]
pub struct RoomRepository {
    rooms: Arc<Mutex<HashMap<RoomId, Addr<Room>>>>,
}

impl RoomRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live [`Room`] with the given id, starting a fresh one if
    /// it is absent or its previous incarnation already stopped.
    pub fn get_or_create<F>(&self, id: &RoomId, make: F) -> Addr<Room>
    where
        F: FnOnce() -> Room,
    {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get(id) {
            Some(addr) if addr.connected() => addr.clone(),
            _ => {
                let addr = make().start();
                rooms.insert(id.clone(), addr.clone());
                addr
            }
        }
    }

    /// Returns the live [`Room`] with the given id, if any.
    #[must_use]
    pub fn get(&self, id: &RoomId) -> Option<Addr<Room>> {
        let rooms = self.rooms.lock().unwrap();
        rooms.get(id).filter(|addr| addr.connected()).cloned()
    }

    /// Removes the given incarnation of the [`Room`] with the given id.
    ///
    /// Removal is skipped when the stored address is a newer incarnation
    /// than `addr`.
    pub fn remove(&self, id: &RoomId, addr: &Addr<Room>) {
        let mut rooms = self.rooms.lock().unwrap();
        if rooms.get(id).map_or(false, |stored| stored == addr) {
            rooms.remove(id);
        }
    }
}
