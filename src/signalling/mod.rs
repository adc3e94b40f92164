//! Signalling implementation: rooms, rosters and the PTT floor state
//! machine.

pub mod room;
pub mod room_repo;

pub use self::{room::Room, room_repo::RoomRepository};
