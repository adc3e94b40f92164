//! Client session (RPC connection) settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// [`Rpc`] configuration section.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Rpc {
    /// Duration after which a connection which did not complete
    /// authentication is dropped.
    ///
    /// Defaults to `10s`.
    #[default(Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub auth_timeout: Duration,

    /// Duration without any inbound frame after which a client is considered
    /// idle and its session is closed. Clients are expected to send `ping`
    /// frames well within this window.
    ///
    /// Defaults to `45s`.
    #[default(Duration::from_secs(45))]
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}
