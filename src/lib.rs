//! Stentor push-to-talk signalling server.
//!
//! Stentor is the rendezvous, authorization and arbitration layer of a PTT
//! voice system: it authenticates duplex client sessions, keeps the
//! authoritative roster of every room, arbitrates the exclusive PTT floor
//! with bounded holds, relays WebRTC SDP/ICE between peers, and wakes
//! offline listeners up through an external push gateway. Media never
//! transits this server.

#![allow(clippy::module_name_repetitions)]
#![forbid(non_ascii_idents, unsafe_code)]

pub mod api;
pub mod auth;
pub mod conf;
pub mod directory;
pub mod log;
pub mod push;
pub mod signalling;

pub use crate::conf::Conf;
